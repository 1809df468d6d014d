//! Signaling server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aural_api::{create_router, metrics, AppState, CleanupSupervisor, ServerConfig};
use aural_rtc::WebRtcConnector;
use aural_vision::{
    DisabledPose, InferenceEngine, PoseEstimator, YoloConfig, YoloDetector, YoloPoseConfig,
    YoloPoseDetector,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("aural=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting aural-api");

    let config = ServerConfig::from_env();
    info!(
        "Server config: host={}, port={}, model={}",
        config.host,
        config.port,
        config.model_path.display()
    );

    // Load the detector once; every session shares it
    let detector = YoloDetector::new(YoloConfig {
        model_path: config.model_path.to_string_lossy().into_owned(),
        ..YoloConfig::default()
    })
    .with_context(|| format!("failed to load detector from {}", config.model_path.display()))?;
    let pose: Arc<dyn PoseEstimator> = match &config.pose_model_path {
        Some(path) => Arc::new(
            YoloPoseDetector::new(YoloPoseConfig {
                model_path: path.to_string_lossy().into_owned(),
                ..YoloPoseConfig::default()
            })
            .with_context(|| format!("failed to load pose model from {}", path.display()))?,
        ),
        None => {
            info!("POSE_MODEL_PATH not set, shoulder-based person distance disabled");
            Arc::new(DisabledPose)
        }
    };
    let engine = Arc::new(InferenceEngine::new(
        Arc::new(detector),
        pose,
        config.min_confidence,
    ));

    let connector = Arc::new(WebRtcConnector::new(config.rtc_config()));
    let state = AppState::new(config.clone(), connector, engine);

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    let supervisor = CleanupSupervisor::new(Arc::clone(&state.sessions), config.cleanup_interval);
    let supervisor_task = tokio::spawn(async move {
        supervisor.run().await;
    });

    let sessions = Arc::clone(&state.sessions);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    supervisor_task.abort();
    sessions.close_all().await;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
