use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use tokio::time::{self, Duration};
use tracing::{info, warn};

use super::{JobReport, SyncContext, SyncPipeline, SyncStatus};
use crate::config;

/// key: sync-scheduler -> run the pipeline every `SYNC_INTERVAL_SECS`
pub fn spawn(pipeline: Arc<SyncPipeline>) {
    let interval = Duration::from_secs(*config::SYNC_INTERVAL_SECS);

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            let today = Utc::now().date_naive();
            if let Err(err) = process_tick(&pipeline, today).await {
                warn!(?err, "sync pipeline tick failed");
            }
        }
    });
}

/// key: sync-scheduler -> tick handler
pub async fn process_tick(pipeline: &SyncPipeline, today: NaiveDate) -> Result<Vec<JobReport>> {
    info!(%today, jobs = ?pipeline.job_names(), "running sync pipeline");
    let reports = pipeline.run(&SyncContext { today }).await;

    let failed: Vec<&str> = reports
        .iter()
        .filter(|report| report.outcome.status == SyncStatus::Failed)
        .map(|report| report.job.as_str())
        .collect();
    if !failed.is_empty() {
        bail!("sync jobs failed: {}", failed.join(", "));
    }
    Ok(reports)
}
