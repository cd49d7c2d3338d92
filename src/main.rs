use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use ara_delivery_engine::config::Settings;
use ara_delivery_engine::dispatch::{DeliveryEngine, DispatchConfig};
use ara_delivery_engine::ledger::create_dedup_ledger;
use ara_delivery_engine::queue::{create_delivery_queue, QueueConfig};
use ara_delivery_engine::sender::create_sender_registry;
use ara_delivery_engine::server::{create_app, AppState};
use ara_delivery_engine::shutdown::{GracefulShutdown, ShutdownConfig};
use ara_delivery_engine::tasks::{MaintenanceConfig, MaintenanceTask};
use ara_delivery_engine::telemetry::init_telemetry;
use ara_delivery_engine::template::create_template_store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing; keep the guard alive until exit
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    // Build the delivery core
    let template_store = create_template_store(&settings.templates)?;
    tracing::info!(templates = template_store.count(), "Template catalog loaded");

    let senders = create_sender_registry(&settings.smtp)?;
    let queue = create_delivery_queue(QueueConfig::from(&settings.delivery));
    let ledger = create_dedup_ledger();

    let engine = Arc::new(DeliveryEngine::new(
        queue,
        ledger,
        template_store.clone(),
        senders,
        DispatchConfig::from(&settings.delivery),
    ));
    engine.start().await?;

    // Start maintenance task in background
    let maintenance_task = MaintenanceTask::new(
        MaintenanceConfig::from(&settings.delivery),
        engine.queue(),
        engine.ledger(),
        engine.shutdown_receiver(),
    );
    let maintenance_handle = tokio::spawn(maintenance_task.run());

    // Create Axum app
    let state = AppState::new(settings.clone(), engine.clone(), template_store);
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server until a shutdown signal arrives
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler())
        .await?;

    // Stop workers and background tasks
    let result = GracefulShutdown::new(engine, ShutdownConfig::from(&settings.shutdown))
        .execute("signal received")
        .await;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = maintenance_handle.await;

    if result.success {
        tracing::info!("Server shutdown complete");
    } else {
        tracing::warn!(
            pending = result.pending_jobs,
            in_flight = result.in_flight_jobs,
            "Server shutdown completed with unfinished work"
        );
    }
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
