use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{jwt_auth, AppState};

use super::dead_letters::{list_dead_letters, redrive_dead_letter};
use super::deliveries::{cancel_delivery, get_delivery, submit_delivery};
use super::health::health;
use super::metrics::prometheus_metrics;
use super::templates::list_templates;

pub fn api_routes(state: &AppState) -> Router<AppState> {
    let v1 = Router::new()
        // Deliveries
        .route("/deliveries", post(submit_delivery))
        .route("/deliveries/{id}", get(get_delivery).delete(cancel_delivery))
        // Operator
        .route("/dead-letters", get(list_dead_letters))
        .route("/dead-letters/{id}/redrive", post(redrive_dead_letter))
        // Catalog
        .route("/templates", get(list_templates))
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth));

    Router::new()
        // Health & Metrics
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest("/api/v1", v1)
}
