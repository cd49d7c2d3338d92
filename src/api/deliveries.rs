//! Delivery submission and status endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::auth::{Claims, ROLE_DELIVERY_SUBMIT};
use crate::delivery::{Channel, DeliveryRequest, DeliveryResult};
use crate::error::{AppError, Result};
use crate::server::{require_role, AppState};

#[derive(Debug, Deserialize)]
pub struct SubmitDeliveryRequest {
    #[serde(default)]
    pub channel: Channel,
    pub recipient: String,
    pub template_id: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub priority: i32,
    /// Omit to disable deduplication for this request
    #[serde(default)]
    pub dedup_key: Option<String>,
}

impl From<SubmitDeliveryRequest> for DeliveryRequest {
    fn from(body: SubmitDeliveryRequest) -> Self {
        let builder = DeliveryRequest::builder(body.channel, body.recipient, body.template_id)
            .context(body.context)
            .priority(body.priority);
        match body.dedup_key {
            Some(key) => builder.dedup_key(key).build(),
            None => builder.build(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitDeliveryResponse {
    pub job_id: Uuid,
    /// True when an existing job with the same dedup key was returned
    pub deduplicated: bool,
}

/// POST /api/v1/deliveries - Queue a delivery
#[tracing::instrument(
    name = "http.submit_delivery",
    skip(state, claims, body),
    fields(subject = %claims.subject(), template_id = %body.template_id)
)]
pub async fn submit_delivery(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<SubmitDeliveryRequest>,
) -> Result<(StatusCode, Json<SubmitDeliveryResponse>)> {
    require_role(&claims, &[ROLE_DELIVERY_SUBMIT])?;

    let request = DeliveryRequest::from(body);
    let request_id = request.id;
    let job_id = state.engine.submit(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitDeliveryResponse {
            job_id,
            deduplicated: job_id != request_id,
        }),
    ))
}

/// GET /api/v1/deliveries/{id} - Current or terminal status
#[tracing::instrument(name = "http.get_delivery", skip(state, claims))]
pub async fn get_delivery(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryResult>> {
    require_role(&claims, &[ROLE_DELIVERY_SUBMIT])?;

    state
        .engine
        .get_status(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("job {}", id)))
}

/// DELETE /api/v1/deliveries/{id} - Withdraw a pending delivery
#[tracing::instrument(name = "http.cancel_delivery", skip(state, claims))]
pub async fn cancel_delivery(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryResult>> {
    require_role(&claims, &[ROLE_DELIVERY_SUBMIT])?;

    Ok(Json(state.engine.cancel(id).await?))
}
