use std::sync::Arc;

use anyhow::Context;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use smart_inbox::config::AppConfig;
use smart_inbox::inbox::InboxController;
use smart_inbox::inbox::routes::inbox_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env next to the binary
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let port = config.port;

    eprintln!("📬 Smart Inbox v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Redirect URI: {}", config.oauth.redirect_uri);
    eprintln!("   API: http://0.0.0.0:{}\n", port);

    let controller = InboxController::from_config(&config).context("Failed to build inbox")?;

    let app = inbox_routes(Arc::new(controller)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!(port, "Smart Inbox server started");
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
