//! API layer - HTTP endpoint handlers organized by domain.

mod dead_letters;
mod deliveries;
mod health;
mod metrics;
mod routes;
mod templates;

pub use dead_letters::{list_dead_letters, redrive_dead_letter, DeadLetterListResponse, RedriveResponse};
pub use deliveries::{cancel_delivery, get_delivery, submit_delivery, SubmitDeliveryRequest, SubmitDeliveryResponse};
pub use health::{health, HealthResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
pub use templates::{list_templates, TemplateListResponse};
