//! Garden Market storefront daemon.
//!
//! Keeps the catalogs of the vendors listed in `STOREFRONT_WATCH_VENDORS`
//! fresh and logs every catalog change.
//!
//! # Architecture
//!
//! - Catalog API over HTTP (`reqwest`), cached in memory (`moka`)
//! - One refresh timer per watched vendor, sharing in-flight fetches
//! - Sentry for error tracking, `tracing` for logs

#![cfg_attr(not(test), forbid(unsafe_code))]

use garden_market_storefront::catalog::{CatalogEvent, HttpCatalogClient};
use garden_market_storefront::config::StorefrontConfig;
use garden_market_storefront::{AppState, StorefrontError};
use sentry::integrations::tracing as sentry_tracing;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() -> Result<(), StorefrontError> {
    // Load configuration from environment (needed for Sentry init)
    let config = StorefrontConfig::from_env()?;

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "garden_market_storefront=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let client = HttpCatalogClient::new(&config.api)?;
    let state = AppState::from_config(&config, client);

    tracing::info!(
        ttl_secs = state.catalog().ttl().as_secs(),
        interval_secs = state.refresh().interval().as_secs(),
        vendor_policy = %state.cart().policy(),
        "Storefront starting"
    );

    let events = tokio::spawn(log_catalog_events(state.clone(), state.catalog().subscribe()));

    for vendor_id in &config.watch_vendors {
        match state.open_vendor(vendor_id).await {
            Ok(view) => tracing::info!(
                vendor_id = %vendor_id,
                vendor = %view.vendor().name,
                products = view.products().len(),
                generation = view.generation(),
                "Watching vendor"
            ),
            Err(e) => {
                e.report();
                // Keep retrying on the timer until the backend answers
                if e.is_recoverable() {
                    state.refresh().subscribe(vendor_id);
                }
            }
        }
    }

    if config.watch_vendors.is_empty() {
        tracing::warn!("STOREFRONT_WATCH_VENDORS is empty, nothing to keep fresh");
    }

    shutdown_signal().await;

    state.shutdown();
    events.abort();
    tracing::info!(fetches = state.refresh().fetch_count(), "Storefront stopped");
    Ok(())
}

/// Log catalog changes and any cart lines they flag.
async fn log_catalog_events(state: AppState, mut events: broadcast::Receiver<CatalogEvent>) {
    loop {
        match events.recv().await {
            Ok(CatalogEvent::Replaced {
                vendor_id,
                generation,
            }) => {
                tracing::info!(vendor_id = %vendor_id, generation, "Catalog updated");
                let cart = state.cart().snapshot();
                for line in cart.flagged() {
                    tracing::warn!(
                        vendor_id = %line.vendor_id(),
                        product = %line.key(),
                        issue = ?line.issue(),
                        "Cart line needs attention"
                    );
                }
            }
            Ok(event) => tracing::debug!(?event, "Catalog event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Catalog event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received, stopping refresh timers");
}
