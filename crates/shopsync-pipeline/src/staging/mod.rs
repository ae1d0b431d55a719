//! The staged-change pipeline.
//!
//! `pull` stages differences between Shopify and `products` as `pending`
//! changes without touching `products`. Reviewers (or the approval rules)
//! move them to `approved` or `rejected`. `apply` writes approved changes to
//! `products`, keeping a version snapshot of what was overwritten, and
//! `rollback` restores that snapshot. `push` goes the other way, sending local
//! edits to Shopify.
//!
//! Every status change runs in a transaction together with its audit entry.

mod apply;
mod plan;
mod pull;
mod push;
mod review;

pub use apply::{apply_approved_changes, apply_change, rollback_change, AppliedChange};
pub use plan::plan_change;
pub use pull::{pull_product_changes, PullOptions};
pub use push::push_product_changes;
pub use review::{approve_change, reject_change};

/// Reviewer recorded on changes approved by the rule engine.
pub const AUTO_APPROVER: &str = "auto-approval";

const PULL_ACTOR: &str = "pull";
