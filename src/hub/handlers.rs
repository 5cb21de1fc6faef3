use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;

use super::connection::ConnectionLifecycle;
use super::event_hub::Event;
use crate::auth::AccessAuth;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub receiver: String,
    pub message: String,
}

/// Long-lived `text/event-stream` of `message` events addressed to the caller.
pub async fn stream(
    auth: AccessAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let connection = ConnectionLifecycle::open(&state.hub, &auth.owner, state.config.hub.keepalive()).await?;
    info!(client_id = %auth.owner, connection_id = %connection.connection_id(), "notification stream opened");

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(connection.into_stream()))
}

/// Routes a message from the caller to `receiver`. Best effort: accepted even if
/// the receiver is not connected.
pub async fn send(
    auth: AccessAuth,
    req: web::Json<SendRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    if req.receiver.is_empty() {
        return Err(AppError::ValidationError("receiver must not be empty".into()));
    }

    state
        .hub
        .dispatch(Event {
            from: auth.owner,
            to: req.receiver,
            payload: req.message,
        })
        .await?;

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "status": "accepted"
    })))
}
