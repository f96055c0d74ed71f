mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use agora_ai::{GeminiClient, Geocoder};
use agora_api::{AppState, AppStateInner};
use agora_db::Database;
use agora_gateway::realtime::RealtimeClient;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let user_agent = format!("agora/{}", env!("CARGO_PKG_VERSION"));
    let state: AppState = Arc::new(AppStateInner {
        db: Database::new(&config.backend_url, &config.backend_service_key),
        realtime: RealtimeClient::new(&config.backend_url, &config.backend_service_key),
        ai: GeminiClient::new(
            config.ai_api_key.clone(),
            config.ai_model.clone(),
            config.ai_base_url.clone(),
        ),
        live_model: config.ai_live_model.clone(),
        geocoder: Geocoder::new(config.geocoder_url.clone(), user_agent),
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = agora_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Agora server listening on {}", addr);
    info!("Backend: {}", config.backend_url);

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
                tracing::warn!("SIGTERM handler unavailable: {}", e);
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
