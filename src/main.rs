//! PTZ Camserver
//!
//! Main entry point for the camserver application.

use ptz_camserver::{
    camera_controller::CameraController,
    models::{mask_credentials, FeedId},
    ptz_controller::OnvifConnector,
    settings::Settings,
    state::AppState,
    video_source::FfmpegSourceFactory,
    web_api,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Debug log file name (daily rolling)
const DEBUG_LOG_FILE: &str = "camera_debug.log";

/// Stdout + optional debug file logging
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(settings: &Settings) -> Option<WorkerGuard> {
    let default_filter = if settings.server.debug {
        "ptz_camserver=trace,tower_http=debug"
    } else {
        "ptz_camserver=debug,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let (file_layer, guard) = if settings.server.log_dir.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&settings.server.log_dir, DEBUG_LOG_FILE);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal(controller: Arc<CameraController>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    controller.shutdown();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config_path = Settings::default_path();
    let (settings, created) = Settings::load_or_create(&config_path)?;

    let _log_guard = init_logging(&settings);

    tracing::info!("Starting PTZ Camserver v{}", env!("CARGO_PKG_VERSION"));
    if created {
        tracing::info!(path = %config_path.display(), "Default configuration file created");
    }
    tracing::info!(
        path = %config_path.display(),
        camera_ip = %settings.camera.ip,
        onvif_port = settings.camera.onvif_port,
        rtsp_ptz = %mask_credentials(&settings.camera.locator(FeedId::Ptz)),
        rtsp_fixed = %mask_credentials(&settings.camera.locator(FeedId::Fixed)),
        ptz_speed = settings.ptz.speed,
        ptz_duration = settings.ptz.duration,
        "Configuration loaded"
    );

    // Initialize components
    let connector = Arc::new(OnvifConnector::new(
        &settings.camera.onvif_endpoint(),
        &settings.camera.username,
        &settings.camera.password,
        Duration::from_millis(settings.camera.onvif_timeout_ms),
    ));
    let sources = Arc::new(FfmpegSourceFactory::new());
    let bind_addr = settings.bind_addr();

    let controller = Arc::new(CameraController::connect(settings, connector, sources).await);
    tracing::info!(
        onvif_connected = controller.onvif_connected().await,
        "CameraController initialized"
    );

    let state = AppState::new(controller.clone());
    let app = web_api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(controller.clone()))
        .await?;

    controller.shutdown();
    tracing::info!("Server stopped");
    Ok(())
}
