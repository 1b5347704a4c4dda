use axum::{
    routing::{get, post},
    Router,
};

use crate::{reports, sync};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/reports/ventures", get(reports::api::ventures_report))
        .route(
            "/api/reports/ventures/header",
            get(reports::api::ventures_header),
        )
        .route(
            "/api/reports/ventures/plugins",
            get(reports::api::ventures_plugins),
        )
        .route("/api/sync/run", post(sync::api::run_sync))
}
