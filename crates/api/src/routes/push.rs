//! Delivery-channel push endpoint.
//!
//! The channel redelivers on any non-2xx answer, so the status code is the
//! whole contract:
//! - posted, duplicate, or rejected by the posting gate: `204`
//! - malformed (poison message): `204`, logged and dropped
//! - any other failure: `500`, the channel redelivers

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use ledgerline_core::event::PushEnvelope;
use ledgerline_shared::AppError;
use serde_json::json;
use tracing::{error, warn};

use crate::AppState;

/// Creates the push routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/push", post(push))
}

/// POST /push - Apply one pushed event.
async fn push(State(state): State<AppState>, body: Bytes) -> Response {
    let event = match PushEnvelope::decode(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, code = e.error_code(), "Dropping malformed push message");
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    match state.posting.handle_push(&event).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) if !e.is_retryable() => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(
                tenant_id = %event.tenant_id,
                message_id = %event.message_id,
                error = %e,
                "Push processing failed, asking for redelivery"
            );
            let err = AppError::from(e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": err.error_code(),
                    "message": err.to_string()
                })),
            )
                .into_response()
        }
    }
}
