//! Generic create/update/skip loop shared by the sync coordinators.

use serde::Serialize;

use crate::report::BatchReport;
use crate::PipelineError;

/// Local persistence for one kind of synced record.
#[allow(async_fn_in_trait)]
pub trait ReconcileStore {
    /// Record fetched from Shopify.
    type Item;
    /// Record as stored locally.
    type Local;

    /// Natural key used to match a fetched record to a local one.
    fn key(item: &Self::Item) -> String;

    /// Whether `local` already matches `item`.
    fn is_current(local: &Self::Local, item: &Self::Item) -> bool;

    async fn find(&mut self, item: &Self::Item) -> Result<Option<Self::Local>, PipelineError>;

    async fn create(&mut self, item: &Self::Item) -> Result<(), PipelineError>;

    async fn update(&mut self, local: &Self::Local, item: &Self::Item)
        -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

enum Action {
    Create,
    Update,
    Skip,
}

/// Matches every item against the store by key and creates, updates or
/// skips it. With `dry_run` nothing is written but counts are the same.
///
/// A failing item is logged, counted and recorded in `report`; the loop
/// always runs to the end.
pub async fn reconcile<S: ReconcileStore>(
    store: &mut S,
    items: &[S::Item],
    dry_run: bool,
    report: &mut BatchReport,
) -> ReconcileCounts {
    let mut counts = ReconcileCounts::default();

    for item in items {
        let key = S::key(item);
        match reconcile_one(store, item, dry_run).await {
            Ok(Action::Create) => {
                counts.created += 1;
                report.bump("created");
                report.success(key, Some("created".to_owned()));
            }
            Ok(Action::Update) => {
                counts.updated += 1;
                report.bump("updated");
                report.success(key, Some("updated".to_owned()));
            }
            Ok(Action::Skip) => {
                counts.skipped += 1;
                report.bump("unchanged");
                report.skipped(key, None);
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "reconcile failed for record");
                counts.errors += 1;
                report.bump("errors");
                report.failure(key, e.to_string());
            }
        }
    }

    counts
}

async fn reconcile_one<S: ReconcileStore>(
    store: &mut S,
    item: &S::Item,
    dry_run: bool,
) -> Result<Action, PipelineError> {
    match store.find(item).await? {
        Some(local) if S::is_current(&local, item) => Ok(Action::Skip),
        Some(local) => {
            if !dry_run {
                store.update(&local, item).await?;
            }
            Ok(Action::Update)
        }
        None => {
            if !dry_run {
                store.create(item).await?;
            }
            Ok(Action::Create)
        }
    }
}
