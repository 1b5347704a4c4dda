use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::{JobReport, SyncContext, SyncPipeline};

#[derive(Debug, Deserialize)]
pub struct RunSyncQuery {
    /// Defaults to the current UTC date.
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

/// key: sync-api -> run the pipeline on demand
pub async fn run_sync(
    Extension(pipeline): Extension<Arc<SyncPipeline>>,
    Query(query): Query<RunSyncQuery>,
) -> Json<Vec<JobReport>> {
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());
    Json(pipeline.run(&SyncContext { today }).await)
}
