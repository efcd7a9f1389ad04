use crate::error::{ApiError, ApiResult};
use crate::messages::{self, interpolate_message};
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::state::SharedState;
use crate::web::response::ApiResponse;
use crate::workflow::{Delivery, EngineError, WorkflowEvent};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware,
    routing::post,
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-inngest-signature";

#[derive(Serialize)]
pub struct EventReceipt {
    pub delivery: Delivery,
}

pub fn router(state: SharedState) -> Router {
    let limiter = state.webhook_limiter.clone();
    Router::new()
        .route("/", post(receive_event))
        .with_state(state)
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
}

pub fn verify_signature(key: &str, body: &[u8], signature: &str) -> bool {
    let Ok(sig) = general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&sig).is_ok()
}

async fn receive_event(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ApiResponse<EventReceipt>> {
    if let Some(key) = &state.config.workflow_signing_key {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing event signature".to_string()))?;
        if !verify_signature(key, &body, signature) {
            tracing::warn!("Rejected workflow event with bad signature");
            return Err(ApiError::Unauthorized("Invalid event signature".to_string()));
        }
    }

    let event: WorkflowEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid event: {}", e)))?;
    let name = event.name.clone();

    let delivery = state.workflow.send(event).await.map_err(|e| match e {
        EngineError::UnknownEvent(_) | EngineError::InvalidPayload(_, _) => ApiError::BadRequest(e.to_string()),
        EngineError::Closed => ApiError::Internal(e.into()),
    })?;

    tracing::info!("Workflow event {} received ({:?})", name, delivery);
    let message = interpolate_message(messages::EVENT_ACCEPTED, &[("name", &name)]);
    Ok(ApiResponse::accepted(message, EventReceipt { delivery }))
}
