//! `sync_batches` bookkeeping around a pipeline run.

use shopsync_core::BatchStatus;
use shopsync_db::BatchType;
use sqlx::PgPool;
use uuid::Uuid;

use crate::report::BatchReport;
use crate::PipelineError;

pub(crate) const TRIGGER_SOURCE: &str = "cli";

/// Opens a `running` batch and records its id on the report. Dry runs write
/// nothing and get no batch.
pub(crate) async fn open_batch(
    pool: &PgPool,
    batch_type: BatchType,
    report: &mut BatchReport,
) -> Result<Option<Uuid>, PipelineError> {
    if report.dry_run {
        return Ok(None);
    }
    let batch = shopsync_db::create_sync_batch(pool, batch_type, TRIGGER_SOURCE).await?;
    tracing::debug!(batch_id = %batch.batch_id, batch_type = %batch_type, "opened sync batch");
    report.batch_id = Some(batch.batch_id);
    Ok(Some(batch.batch_id))
}

/// Stamps the report finished and writes its counts to the batch, if any.
pub(crate) async fn close_batch(
    pool: &PgPool,
    report: &mut BatchReport,
) -> Result<Option<BatchStatus>, PipelineError> {
    report.finish();
    let Some(batch_id) = report.batch_id else {
        return Ok(None);
    };
    let status = shopsync_db::finish_sync_batch(pool, batch_id, report.batch_counts()).await?;
    tracing::info!(
        batch_id = %batch_id,
        operation = %report.operation,
        status = %status,
        successful = report.successes(),
        failed = report.failures(),
        skipped = report.skips(),
        "batch finished"
    );
    Ok(Some(status))
}

/// Marks a batch failed, logging instead of returning a secondary error so the
/// caller can surface the original one.
pub(crate) async fn fail_batch_best_effort(
    pool: &PgPool,
    batch_id: Option<Uuid>,
    context: &'static str,
    message: &str,
) {
    let Some(batch_id) = batch_id else {
        return;
    };
    if let Err(mark_err) = shopsync_db::fail_sync_batch(pool, batch_id, message).await {
        tracing::error!(
            batch_id = %batch_id,
            error = %mark_err,
            "failed to mark {context} batch as failed"
        );
    }
}
