// Entry point of the shop backend.
//
// This file's job is to:
// 1. Load configuration
// 2. Open the store and wire the services (dependency injection)
// 3. Run the maintenance loops until shutdown

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use virtual_shop::app::{spawn_currency_sweep, spawn_invite_cleanup, ShopServices};
use virtual_shop::core::shop::{CurrencyPurgePolicy, ShopConfig};
use virtual_shop::infra::notify::SubscriberHub;
use virtual_shop::infra::shop::SqliteShopStore;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn load_config() -> ShopConfig {
    let defaults = ShopConfig::default();
    let currency_purge = match std::env::var("SHOP_CURRENCY_PURGE") {
        Ok(raw) => CurrencyPurgePolicy::from_str(&raw).unwrap_or_else(|| {
            tracing::warn!("Unknown SHOP_CURRENCY_PURGE={:?}, using deferred", raw);
            CurrencyPurgePolicy::Deferred
        }),
        Err(_) => defaults.currency_purge,
    };

    ShopConfig {
        log_shared_limit: env_or("SHOP_LOG_LIMIT", defaults.log_shared_limit),
        restrict_customer_logs: env_or("SHOP_RESTRICT_CUSTOMER_LOGS", defaults.restrict_customer_logs),
        currency_purge,
        ..defaults
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let database_path = std::env::var("DATABASE_URL").unwrap_or_else(|_| "data/shop.db".to_string());
    if let Some(dir) = Path::new(&database_path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let config = load_config();
    tracing::info!(
        log_limit = config.log_shared_limit,
        restrict_customer_logs = config.restrict_customer_logs,
        currency_purge = ?config.currency_purge,
        "Loaded shop configuration"
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let store = SqliteShopStore::new(&database_path).await?;
    let hub = Arc::new(SubscriberHub::new());
    let services = Arc::new(ShopServices::new(store, hub, config));

    let invite_every = Duration::from_secs(env_or("SHOP_INVITE_CLEANUP_SECS", 60u64).max(1));
    let sweep_every = Duration::from_secs(env_or("SHOP_CURRENCY_SWEEP_SECS", 3600u64).max(1));
    let invite_task = spawn_invite_cleanup(Arc::clone(&services), invite_every);
    let sweep_task = spawn_currency_sweep(Arc::clone(&services), sweep_every);

    tracing::info!("Shop backend running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    invite_task.abort();
    sweep_task.abort();
    Ok(())
}
