mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use postboard_api::assets::{AssetPolicy, AssetValidator};
use postboard_api::transcribe::{DisabledTranscriber, HttpTranscriber, Transcriber};
use postboard_api::{AppState, AppStateInner};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postboard=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = postboard_db::Database::open(&config.db_path)?;

    let fetch_client = reqwest::Client::builder()
        .timeout(config.fetch_timeout)
        .build()?;
    let assets = AssetValidator::new(
        fetch_client,
        AssetPolicy {
            image_formats: config.image_formats.clone(),
            video_formats: config.video_formats.clone(),
            max_image_bytes: config.max_image_bytes,
        },
    );

    let transcriber: Arc<dyn Transcriber> = match &config.transcribe_url {
        Some(url) => {
            let client = reqwest::Client::builder()
                .timeout(config.transcribe_timeout)
                .build()?;
            info!("Transcription endpoint: {}", url);
            Arc::new(HttpTranscriber::new(
                client,
                url.clone(),
                config.transcribe_api_key.clone(),
            ))
        }
        None => {
            warn!("POSTBOARD_TRANSCRIBE_URL is unset; transcripts will be unavailable");
            Arc::new(DisabledTranscriber)
        }
    };

    let state: AppState = Arc::new(AppStateInner {
        db,
        assets,
        transcriber,
    });

    let app = postboard_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Postboard listening on {}", addr);
    info!(
        "Thumbnails: {:?} up to {} MB; videos: {:?}",
        config.image_formats, config.max_image_size_mb, config.video_formats
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
