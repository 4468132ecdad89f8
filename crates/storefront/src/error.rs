//! Unified error handling with Sentry integration.
//!
//! Each service has its own error enum ([`CartError`], [`RefreshError`],
//! [`FetchError`], [`ConfigError`]). `StorefrontError` wraps them for callers
//! that want a single `?`-friendly type, and knows which kinds are worth
//! reporting to Sentry.

use thiserror::Error;

use crate::cart::CartError;
use crate::catalog::FetchError;
use crate::config::ConfigError;
use crate::refresh::RefreshError;

/// Application-level error type for the storefront services.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// A cart mutation was rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// A catalog refresh failed.
    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// The catalog backend could not be reached or returned bad data.
    #[error("Catalog error: {0}")]
    Fetch(#[from] FetchError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The requested vendor has never been fetched and could not be loaded.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl StorefrontError {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Only configuration errors are permanent.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }

    /// Log the error and, for backend failures, capture it to Sentry.
    ///
    /// Cart rejections are user input problems and are only logged.
    pub fn report(&self) {
        if matches!(self, Self::Refresh(_) | Self::Fetch(_) | Self::Config(_)) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        } else {
            tracing::warn!(error = %self, "Storefront operation rejected");
        }
    }
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// and refresh actions leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("vendor_id", "g1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
