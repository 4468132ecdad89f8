//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CATALOG_BASE_URL` - Base URL of the catalog API (e.g., <https://api.example.com/v1>)
//!
//! ## Optional
//! - `CATALOG_API_TOKEN` - Bearer token for the catalog API
//! - `CATALOG_TTL_SECS` - Seconds before a cached catalog is stale (default: 300)
//! - `CATALOG_MAX_VENDORS` - Maximum vendors kept in the cache (default: 256)
//! - `CATALOG_REQUEST_TIMEOUT_SECS` - HTTP timeout per request (default: 15)
//! - `REFRESH_INTERVAL_SECS` - Timer cadence for subscribed vendors (default: 60)
//! - `CART_VENDOR_POLICY` - `reject` or `replace` (default: reject)
//! - `STOREFRONT_WATCH_VENDORS` - Comma-separated vendor ids to keep fresh
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::time::Duration;

use garden_market_core::VendorId;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::cart::VendorPolicy;

/// Default staleness TTL for cached catalogs.
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(300);
/// Default refresh timer cadence.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
/// Default cache capacity, in vendors.
pub const DEFAULT_MAX_VENDORS: u64 = 256;
/// Default HTTP timeout for catalog requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Catalog API connection settings
    pub api: CatalogApiConfig,
    /// Catalog cache settings
    pub catalog: CatalogConfig,
    /// Refresh coordinator settings
    pub refresh: RefreshConfig,
    /// Cart settings
    pub cart: CartConfig,
    /// Vendors the daemon keeps fresh from startup
    pub watch_vendors: Vec<VendorId>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Catalog API connection settings.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct CatalogApiConfig {
    /// Base URL; vendor paths are appended as segments
    pub base_url: Url,
    /// Optional bearer token
    pub api_token: Option<SecretString>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl std::fmt::Debug for CatalogApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Catalog cache settings.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Age after which an entry is stale
    pub ttl: Duration,
    /// Maximum number of vendors cached
    pub max_vendors: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CATALOG_TTL,
            max_vendors: DEFAULT_MAX_VENDORS,
        }
    }
}

/// Refresh coordinator settings.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Timer cadence for subscribed vendors
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Cart settings.
#[derive(Debug, Clone, Default)]
pub struct CartConfig {
    /// What happens when an item from a second vendor is added
    pub vendor_policy: VendorPolicy,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let base_url = env.required("CATALOG_BASE_URL")?;
        let base_url = Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("CATALOG_BASE_URL".to_string(), e.to_string())
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidEnvVar(
                "CATALOG_BASE_URL".to_string(),
                "must be a hierarchical URL such as https://host/path".to_string(),
            ));
        }

        let api = CatalogApiConfig {
            base_url,
            api_token: env.optional("CATALOG_API_TOKEN").map(SecretString::from),
            request_timeout: env.seconds("CATALOG_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT)?,
        };

        let catalog = CatalogConfig {
            ttl: env.seconds("CATALOG_TTL_SECS", DEFAULT_CATALOG_TTL)?,
            max_vendors: env.parsed("CATALOG_MAX_VENDORS", DEFAULT_MAX_VENDORS)?,
        };

        let refresh = RefreshConfig {
            interval: env.seconds("REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL)?,
        };
        if refresh.interval.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "REFRESH_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let cart = CartConfig {
            vendor_policy: env.parsed("CART_VENDOR_POLICY", VendorPolicy::default())?,
        };

        let watch_vendors = env
            .optional("STOREFRONT_WATCH_VENDORS")
            .map(|list| parse_vendor_list(&list))
            .unwrap_or_default();

        Ok(Self {
            api,
            catalog,
            refresh,
            cart,
            watch_vendors,
            sentry_dsn: env.optional("SENTRY_DSN"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Borrowed variable lookup with typed accessors.
struct Env<'a, L: Fn(&str) -> Option<String>>(&'a L);

impl<L: Fn(&str) -> Option<String>> Env<'_, L> {
    /// Get an optional variable, treating empty values as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |value| {
            value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    /// Parse a whole number of seconds.
    fn seconds(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parsed(key, default.as_secs())
            .map(Duration::from_secs)
    }
}

/// Split a comma-separated vendor list, skipping blanks.
fn parse_vendor_list(list: &str) -> Vec<VendorId> {
    list.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(VendorId::from)
        .collect()
}
