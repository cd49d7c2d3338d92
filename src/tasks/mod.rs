//! Background tasks

mod maintenance;

pub use maintenance::{MaintenanceConfig, MaintenanceReport, MaintenanceTask};
