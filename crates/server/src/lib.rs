//! HTTP ingress: turns requests into commands on the bus and, for
//! `POST /cmd`, answers with that command's own result.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use shared::{
    domain::CommandSource,
    error::ErrorKind,
    protocol::{CmdRequest, CmdResponse, Command, PanelState},
};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, info, warn};

mod app_state;

pub use app_state::AppState;

pub const DEFAULT_BIND: &str = "0.0.0.0:9759";
pub const MAX_BODY_BYTES: usize = 64 * 1024;

type ApiResult<T> = Result<T, (StatusCode, Json<CmdResponse>)>;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/cmd", post(submit_command))
        .route("/panels", get(list_panels))
        .route("/panels/:plugin", get(get_panel))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::map_response(json_payload_too_large))
        .with_state(state)
}

/// The body limit answers oversized requests before any handler runs, in
/// plain text. Give them the same JSON shape as every other failure.
async fn json_payload_too_large(response: Response) -> Response {
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return payload_too_large().into_response();
    }
    response
}

fn payload_too_large() -> (StatusCode, Json<CmdResponse>) {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(CmdResponse::error(
            ErrorKind::BadRequest,
            format!("request body exceeds {MAX_BODY_BYTES} bytes"),
        )),
    )
}

/// Serves until shutdown is broadcast on the bus, then stops accepting and
/// lets in-flight requests finish.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let shutdown = state.bus.shutdown_signal();
    let addr = listener.local_addr()?;
    info!(%addr, "web adapter listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.fired().await })
        .await?;

    info!(%addr, "web adapter stopped");
    Ok(())
}

async fn hello(State(state): State<Arc<AppState>>) -> Response {
    if state.bus.is_shutdown() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    format!("Hello {}!", state.name).into_response()
}

async fn submit_command(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CmdRequest>, JsonRejection>,
) -> ApiResult<Json<CmdResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        debug!(%rejection, "rejected command body");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return payload_too_large();
        }
        error_reply(ErrorKind::BadRequest, rejection.body_text())
    })?;

    if state.bus.is_shutdown() {
        return Err(error_reply(ErrorKind::BusClosed, "shutting down"));
    }

    let command = Command::parse(CommandSource::Web, request.cmd)
        .map_err(|err| error_reply(ErrorKind::BadRequest, err.to_string()))?;
    let pending = state
        .bus
        .request(command)
        .map_err(|err| error_reply(err.kind(), err.to_string()))?;

    let id = pending.id();
    match pending.wait(state.reply_timeout).await {
        Ok(result) => Ok(Json(result.into())),
        Err(kind) => {
            warn!(command_id = %id, error = %kind, "no result for web command");
            let message = match kind {
                ErrorKind::Timeout => format!(
                    "no result within {} ms",
                    state.reply_timeout.as_millis()
                ),
                _ => "dispatcher stopped before replying".to_string(),
            };
            Err(error_reply(kind, message))
        }
    }
}

async fn list_panels(State(state): State<Arc<AppState>>) -> Json<Vec<PanelState>> {
    Json(state.panels.snapshot())
}

async fn get_panel(
    State(state): State<Arc<AppState>>,
    Path(plugin): Path<String>,
) -> ApiResult<Json<PanelState>> {
    state.panels.get(&plugin).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(CmdResponse::error(
                ErrorKind::UnknownPlugin,
                format!("no panel for `{plugin}`"),
            )),
        )
    })
}

/// Recognized commands always answer 200 with the `ok` flag; only ingress
/// and availability failures get an error status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UnknownPlugin | ErrorKind::HandlerFailed => StatusCode::OK,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Busy => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::BusClosed => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn error_reply(kind: ErrorKind, message: impl Into<String>) -> (StatusCode, Json<CmdResponse>) {
    (status_for(kind), Json(CmdResponse::error(kind, message)))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
