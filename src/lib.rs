// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

// Delivery core
pub mod delivery;
pub mod dispatch;
pub mod ledger;
pub mod queue;
pub mod sender;
pub mod template;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
