use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    Json,
};

use super::driver::{ReportRequest, ReportResult, VenturesReport};
use super::registry::PluginDescriptor;
use crate::error::AppResult;

/// key: reports-api -> ventures report endpoints
pub async fn ventures_report(
    Extension(report): Extension<Arc<VenturesReport>>,
    Query(request): Query<ReportRequest>,
) -> AppResult<Json<ReportResult>> {
    Ok(Json(report.collect(request).await?))
}

pub async fn ventures_header(
    Extension(report): Extension<Arc<VenturesReport>>,
) -> AppResult<Json<Vec<String>>> {
    Ok(Json(report.header().await?))
}

pub async fn ventures_plugins(
    Extension(report): Extension<Arc<VenturesReport>>,
) -> AppResult<Json<Vec<PluginDescriptor>>> {
    let plugins = report.plugins().await?;
    Ok(Json(
        plugins
            .into_iter()
            .map(|registered| registered.descriptor)
            .collect(),
    ))
}
