use anyhow::{bail, Context, Result};
use density_service::{api, build_detector, DensityServiceConfig, DensityServiceState};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Guard must outlive the server so buffered file logs are flushed
    let _log_guard = telemetry::init_with_service("density-service");

    info!("Starting Density Service...");

    let config = DensityServiceConfig::from_env()?;
    info!(
        "Density Service configuration: bind={}, node_id={}, detector={}, threshold={}",
        config.bind_addr, config.node_id, config.detector, config.density_threshold
    );

    let detector = build_detector(&config.detector, config.detector_config.clone())
        .await
        .with_context(|| format!("Failed to initialize detector '{}'", config.detector))?;

    {
        let detector = detector.read().await;
        if !detector.supports_label(&config.person_label) {
            bail!(
                "Detector '{}' cannot emit person label '{}' (labels: {})",
                detector.id(),
                config.person_label,
                detector.class_labels().join(", ")
            );
        }
        info!("Initialized detector: {} v{}", detector.name(), detector.version());
    }

    let state = DensityServiceState::new(
        config.node_id.clone(),
        detector,
        config.pipeline_config(),
        config.default_max_seconds,
    );

    let app = api::router(state.clone(), config.max_upload_bytes);

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Density Service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: DensityServiceState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
    if let Err(e) = state.shutdown().await {
        error!("Error during shutdown: {}", e);
    }
}
