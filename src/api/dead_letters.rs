//! Operator endpoints for dead-lettered jobs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Claims, ROLE_DELIVERY_ADMIN};
use crate::delivery::{DeadLetterFilter, DeliveryJob};
use crate::error::Result;
use crate::server::{require_role, AppState};

/// Upper bound on listed dead letters when no limit is given
const DEFAULT_LIST_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
pub struct DeadLetterListResponse {
    pub dead_letters: Vec<DeliveryJob>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedriveResponse {
    pub job_id: Uuid,
    pub redriven_from: Uuid,
}

/// GET /api/v1/dead-letters - Inspect dead-lettered jobs
#[tracing::instrument(name = "http.list_dead_letters", skip(state, claims))]
pub async fn list_dead_letters(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(mut filter): Query<DeadLetterFilter>,
) -> Result<Json<DeadLetterListResponse>> {
    require_role(&claims, &[ROLE_DELIVERY_ADMIN])?;

    filter.limit = Some(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT));
    let dead_letters = state.engine.list_dead_lettered(&filter).await?;
    let total = dead_letters.len();

    Ok(Json(DeadLetterListResponse {
        dead_letters,
        total,
    }))
}

/// POST /api/v1/dead-letters/{id}/redrive - Re-submit as a fresh job
#[tracing::instrument(name = "http.redrive_dead_letter", skip(state, claims))]
pub async fn redrive_dead_letter(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<RedriveResponse>)> {
    require_role(&claims, &[ROLE_DELIVERY_ADMIN])?;

    let job_id = state.engine.redrive(id).await?;
    tracing::info!(subject = %claims.subject(), new_job_id = %job_id, "Dead letter re-driven");

    Ok((
        StatusCode::ACCEPTED,
        Json(RedriveResponse {
            job_id,
            redriven_from: id,
        }),
    ))
}
