//! Sync coordinators and the staged-change pipeline.
//!
//! Every operation takes a Postgres pool plus the client it needs and returns
//! a [`BatchReport`]. Runs that write are recorded in `sync_batches`.

mod batch;
pub mod collections;
pub mod error;
pub mod inventory;
pub mod products;
pub mod reconcile;
pub mod report;
pub mod staging;

pub use collections::sync_collections;
pub use error::PipelineError;
pub use inventory::{check_skus, run_inventory_check};
pub use products::{fetch_product_snapshots, sync_products};
pub use reconcile::{reconcile, ReconcileCounts, ReconcileStore};
pub use report::{BatchReport, ItemOutcome, Outcome};
pub use staging::{
    apply_approved_changes, apply_change, approve_change, plan_change, pull_product_changes,
    push_product_changes, reject_change, rollback_change, AppliedChange, PullOptions,
    AUTO_APPROVER,
};
