//! Template catalog endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;
use crate::template::TemplateSummary;

#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<TemplateSummary>,
    pub total: usize,
}

/// GET /api/v1/templates - List available templates
#[tracing::instrument(name = "http.list_templates", skip(state))]
pub async fn list_templates(State(state): State<AppState>) -> Json<TemplateListResponse> {
    let templates = state.template_store.list();
    let total = templates.len();

    Json(TemplateListResponse { templates, total })
}
