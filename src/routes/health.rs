//! Liveness endpoint

use serde::Serialize;

use crate::routes::{json_response, BoxBody};
use crate::server::AppState;
use hyper::{Response, StatusCode};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Operating mode: development or production
    pub mode: &'static str,
    /// Connected realtime clients (including session watchers)
    pub feed_subscribers: usize,
    pub timestamp: String,
}

pub fn health_check(state: &AppState) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION"),
            mode: if state.args.dev_mode {
                "development"
            } else {
                "production"
            },
            feed_subscribers: state.ctx.feed.subscriber_count(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    )
}
