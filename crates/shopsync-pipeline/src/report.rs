//! Per-run summary written as JSON by `--report`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shopsync_db::BatchCounts;
use uuid::Uuid;

use crate::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    /// Handle, Shopify id, change id or SKU depending on the operation.
    pub key: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub operation: String,
    pub batch_id: Option<Uuid>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Named tallies such as `created`, `conflicts` or `auto_approved`.
    pub counts: BTreeMap<String, usize>,
    pub items: Vec<ItemOutcome>,
}

impl BatchReport {
    #[must_use]
    pub fn new(operation: &str, dry_run: bool) -> Self {
        Self {
            operation: operation.to_owned(),
            batch_id: None,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            counts: BTreeMap::new(),
            items: Vec::new(),
        }
    }

    pub fn bump(&mut self, counter: &str) {
        self.add(counter, 1);
    }

    pub fn add(&mut self, counter: &str, n: usize) {
        *self.counts.entry(counter.to_owned()).or_default() += n;
    }

    #[must_use]
    pub fn count(&self, counter: &str) -> usize {
        self.counts.get(counter).copied().unwrap_or(0)
    }

    pub fn success(&mut self, key: impl Into<String>, detail: Option<String>) {
        self.push(key.into(), Outcome::Success, detail);
    }

    pub fn failure(&mut self, key: impl Into<String>, detail: impl Into<String>) {
        self.push(key.into(), Outcome::Failed, Some(detail.into()));
    }

    pub fn skipped(&mut self, key: impl Into<String>, detail: Option<String>) {
        self.push(key.into(), Outcome::Skipped, detail);
    }

    fn push(&mut self, key: String, outcome: Outcome, detail: Option<String>) {
        self.items.push(ItemOutcome {
            key,
            outcome,
            detail,
        });
    }

    fn tally(&self, outcome: Outcome) -> usize {
        self.items.iter().filter(|i| i.outcome == outcome).count()
    }

    #[must_use]
    pub fn successes(&self) -> usize {
        self.tally(Outcome::Success)
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.tally(Outcome::Failed)
    }

    #[must_use]
    pub fn skips(&self) -> usize {
        self.tally(Outcome::Skipped)
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Item tallies in the shape `sync_batches` stores.
    #[must_use]
    pub fn batch_counts(&self) -> BatchCounts {
        let clamp = |n: usize| i32::try_from(n).unwrap_or(i32::MAX);
        BatchCounts {
            total: clamp(self.items.len()),
            successful: clamp(self.successes()),
            failed: clamp(self.failures()),
            skipped: clamp(self.skips()),
        }
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Report`] if the file cannot be written.
    pub fn write_json(&self, path: &Path) -> Result<(), PipelineError> {
        let report_err = |source| PipelineError::Report {
            path: path.display().to_string(),
            source,
        };
        let body = serde_json::to_vec_pretty(self).map_err(|e| report_err(e.into()))?;
        std::fs::write(path, body).map_err(report_err)
    }
}
