//! QuickSend - multi-connection messaging gateway
//!
//! Hosts many independent messaging sessions side by side, exposes them
//! through a JSON control API, and relays inbound messages to an external
//! decision service.

mod api;
mod chat_target;
mod config;
mod connection;
mod error;
mod media;
mod qr;
mod registry;
mod relay;
mod runtime;
mod transport;

use api::{create_router, AppState};
use config::GatewayConfig;
use media::MediaFetcher;
use registry::ConnectionRegistry;
use relay::MessageRelay;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use transport::BrowserTransportFactory;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quicksend=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "Unhandled panic");
    }));

    let config = GatewayConfig::from_env();

    let relay = Arc::new(MessageRelay::from_config(config.relay.clone())?);
    if config.relay.enabled {
        match &config.relay.endpoint {
            Some(endpoint) => tracing::info!(
                endpoint = %endpoint,
                pinned_connection = ?config.relay.pinned_connection,
                "Message relay enabled"
            ),
            None => {
                tracing::warn!("HELPDESK_ENABLED is set but HELPDESK_API_URL is missing");
            }
        }
    }

    let factory = Arc::new(BrowserTransportFactory::new(config.browser.clone()));
    let registry = Arc::new(ConnectionRegistry::new(factory, relay));
    let state = AppState::new(registry.clone(), MediaFetcher::new()?);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        browser = config.browser_summary(),
        session_root = %config.browser.session_root.display(),
        "QuickSend server listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let total = registry.count().await;
    tracing::info!(connections = total, "Shutting down, closing connections");
    for (id, e) in registry.shutdown_all().await {
        tracing::error!(connection_id = %id, error = %e, "Failed to close connection");
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
