//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Upgrades are enabled
//! on every connection so `/realtime` can switch to WebSocket.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::routes::{self, cors_preflight, json_response, not_found, BoxBody, ErrorResponse};
use crate::services::{billing, ServiceContext};
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Store, feed, file storage and remote functions
    pub ctx: ServiceContext,
    /// Issues and verifies session tokens
    pub jwt: JwtValidator,
}

impl AppState {
    pub fn new(args: Args, ctx: ServiceContext) -> Result<Self> {
        let jwt = args.jwt_validator()?;
        Ok(Self { args, ctx, jwt })
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Growest Connect listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory fallbacks allowed");
    }

    billing::spawn_expiry_task(state.ctx.clone(), state.args.expiry_sweep_interval());
    info!(
        "Subscription expiry sweep every {}s",
        state.args.expiry_sweep_interval().as_secs()
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

fn timeout_response() -> Response<BoxBody> {
    json_response(
        StatusCode::GATEWAY_TIMEOUT,
        &ErrorResponse {
            error: "Request timed out".into(),
            code: "TIMEOUT",
            field: None,
        },
    )
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    // WebSocket upgrade must not be wrapped in the request timeout
    if method == Method::GET && path == "/realtime" {
        return Ok(routes::handle_realtime_ws(state, req).await);
    }

    let timeout = state.args.request_timeout();
    let routed = async {
        if path.starts_with("/auth") {
            return routes::handle_auth_request(req, Arc::clone(&state)).await;
        }
        if path.starts_with("/api") {
            return routes::handle_api_request(req, Arc::clone(&state)).await;
        }

        match (&method, path.as_str()) {
            (&Method::GET, "/health") | (&Method::GET, "/healthz") => routes::health_check(&state),
            (&Method::OPTIONS, _) => cors_preflight(),
            _ => not_found(&path),
        }
    };

    match tokio::time::timeout(timeout, routed).await {
        Ok(response) => Ok(response),
        Err(_) => {
            warn!("[{}] {} {} timed out after {:?}", addr, method, path, timeout);
            Ok(timeout_response())
        }
    }
}
