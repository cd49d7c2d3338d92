//! HTTP server wiring: shared state, middleware and the axum application.

mod app;
mod middleware;
mod state;

pub use app::create_app;
pub use middleware::{extract_bearer_token, jwt_auth, require_role};
pub use state::AppState;
