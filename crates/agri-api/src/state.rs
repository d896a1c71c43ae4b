//! # Application State
//!
//! Shared state for the Axum application.
//! Wires the stock ledger, cart store and checkout orchestrator together
//! over the in-memory adapters and a payment gateway.

use agri_core::{
    BoxedOrderRepository, BoxedPaymentGateway, CartStore, CheckoutConfig, CheckoutOrchestrator,
    InMemoryCartRepository, InMemoryIncidentSink, InMemoryOrderRepository,
    InMemoryStockRepository, ItemCatalog, StockLedger,
};
use agri_razorpay::RazorpayGateway;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Explicit seed catalog location
    pub catalog_path: Option<PathBuf>,
    /// Upper bound on a gateway intent-creation call
    pub gateway_timeout: Duration,
    /// How long an unsettled intent is kept for the amount check
    pub intent_ttl: Duration,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            catalog_path: lookup("CATALOG_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            gateway_timeout: Duration::from_secs(
                lookup("GATEWAY_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(10),
            ),
            intent_ttl: Duration::from_secs(
                lookup("INTENT_TTL_SECS")
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(30 * 60),
            ),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn checkout_config(&self) -> CheckoutConfig {
        CheckoutConfig {
            intent_timeout: self.gateway_timeout,
            intent_ttl: self.intent_ttl,
            ..CheckoutConfig::default()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: StockLedger,
    pub carts: Arc<CartStore>,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub orders: BoxedOrderRepository,
    /// Incidents awaiting review
    pub incidents: InMemoryIncidentSink,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Razorpay gateway plus the seed catalog named by `config`
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let catalog = load_item_catalog(config.catalog_path.as_ref())?;

        let gateway = RazorpayGateway::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Razorpay: {}", e))?;
        if gateway.is_test_mode() {
            tracing::info!("Razorpay running with test keys");
        }

        Ok(Self::with_gateway(config, catalog, Arc::new(gateway)))
    }

    /// Assemble the components around an arbitrary gateway
    pub fn with_gateway(
        config: AppConfig,
        catalog: ItemCatalog,
        gateway: BoxedPaymentGateway,
    ) -> Self {
        let ledger = StockLedger::new(Arc::new(InMemoryStockRepository::from_catalog(&catalog)));
        let carts = Arc::new(CartStore::new(
            Arc::new(InMemoryCartRepository::new()),
            ledger.clone(),
        ));
        let orders: BoxedOrderRepository = Arc::new(InMemoryOrderRepository::new());
        let incidents = InMemoryIncidentSink::new();

        let checkout = Arc::new(CheckoutOrchestrator::new(
            carts.clone(),
            ledger.clone(),
            orders.clone(),
            gateway,
            Arc::new(incidents.clone()),
            config.checkout_config(),
        ));

        Self {
            ledger,
            carts,
            checkout,
            orders,
            incidents,
            config,
        }
    }
}

/// Load the seed catalog from `explicit`, or from `config/items.toml`
fn load_item_catalog(explicit: Option<&PathBuf>) -> anyhow::Result<ItemCatalog> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let catalog = ItemCatalog::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        tracing::info!("Loaded {} items from {}", catalog.items.len(), path.display());
        return Ok(catalog);
    }

    let config_paths = [
        "config/items.toml",
        "../config/items.toml",
        "../../config/items.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = ItemCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} items from {}", catalog.items.len(), path);
            return Ok(catalog);
        }
    }

    tracing::warn!("No item catalog found, starting with an empty catalog");
    Ok(ItemCatalog::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.environment, "development");
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
        assert_eq!(config.intent_ttl, Duration::from_secs(1800));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn test_app_config_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "3000"),
            ("ENVIRONMENT", "production"),
            ("GATEWAY_TIMEOUT_SECS", "4"),
            ("INTENT_TTL_SECS", "120"),
            ("LOG_FORMAT", "JSON"),
            ("CATALOG_PATH", "/etc/agri/items.toml"),
        ]));

        assert_eq!(config.port, 3000);
        assert!(config.is_production());
        assert_eq!(config.checkout_config().intent_timeout, Duration::from_secs(4));
        assert_eq!(config.checkout_config().intent_ttl, Duration::from_secs(120));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.catalog_path,
            Some(PathBuf::from("/etc/agri/items.toml"))
        );
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "eighty"),
            ("GATEWAY_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_socket_addr() {
        let config = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            ..AppConfig::default()
        };
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:3000");

        let config = AppConfig {
            host: "not a host".to_string(),
            ..AppConfig::default()
        };
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_seed_catalog_parses() {
        let catalog = load_item_catalog(None).unwrap();
        assert!(!catalog.items.is_empty());
        assert!(catalog.items.iter().any(|item| !item.visible));
    }

    #[test]
    fn test_missing_explicit_catalog_is_an_error() {
        let path = PathBuf::from("/nonexistent/agri/items.toml");
        assert!(load_item_catalog(Some(&path)).is_err());
    }
}
