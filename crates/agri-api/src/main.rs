//! # Agri-Cart
//!
//! Farm-to-consumer marketplace service.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export RAZORPAY_KEY_ID=rzp_test_...
//! export RAZORPAY_KEY_SECRET=...
//!
//! # Run the server
//! agri-cart
//! ```

use agri_api::{routes, AppConfig, AppState, LogFormat};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    init_tracing(config.log_format);

    print_banner();

    // Initialize application state
    let state = AppState::from_config(config)?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Items listed: {}", state.ledger.visible_items().await?.len());

    let app = routes::create_router(state);

    info!("Agri-Cart starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Catalog: GET http://{}/api/v1/items", addr);
        info!("Checkout: POST http://{}/api/v1/checkout/intent", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Agri-Cart stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_banner() {
    println!(
        r#"
  Agri-Cart
  ━━━━━━━━━━━━━━━━━━━━━━━
  Farm-to-consumer marketplace
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
