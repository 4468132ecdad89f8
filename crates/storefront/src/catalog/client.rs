//! HTTP client for the catalog API.

use std::sync::Arc;

use garden_market_core::VendorId;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::config::CatalogApiConfig;

use super::conversions::{ProductRecord, VendorRecord, convert_products, convert_vendor};
use super::{CatalogFetcher, FetchError, FetchedCatalog};

/// Characters of a response body kept in logs and errors.
const BODY_PREVIEW_CHARS: usize = 200;

/// Client for the catalog REST API.
///
/// Fetches a vendor and its product list concurrently. Holds no cache of
/// its own; [`super::CatalogCache`] is the single cache.
#[derive(Clone)]
pub struct HttpCatalogClient {
    inner: Arc<HttpCatalogClientInner>,
}

struct HttpCatalogClientInner {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<SecretString>,
}

impl HttpCatalogClient {
    /// Create a new catalog API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot take path segments or the
    /// HTTP client cannot be built.
    pub fn new(config: &CatalogApiConfig) -> Result<Self, FetchError> {
        if config.base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidBaseUrl(config.base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpCatalogClientInner {
                client,
                base_url: config.base_url.clone(),
                api_token: config.api_token.clone(),
            }),
        })
    }

    /// Get a vendor record.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the vendor does not exist.
    #[instrument(skip(self, vendor_id), fields(vendor_id = %vendor_id))]
    pub async fn get_vendor(
        &self,
        vendor_id: &VendorId,
    ) -> Result<garden_market_core::Vendor, FetchError> {
        let record: VendorRecord = self.get_json(&["businesses", vendor_id.as_str()]).await?;
        Ok(convert_vendor(vendor_id, record))
    }

    /// Get a vendor's full product collection, grouped by category.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the vendor does not exist.
    #[instrument(skip(self, vendor_id), fields(vendor_id = %vendor_id))]
    pub async fn get_products(
        &self,
        vendor_id: &VendorId,
    ) -> Result<garden_market_core::ProductsByCategory, FetchError> {
        let records: Vec<ProductRecord> = self
            .get_json(&["businesses", vendor_id.as_str(), "products"])
            .await?;
        Ok(convert_products(vendor_id, records))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::InvalidBaseUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Execute a GET request and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, FetchError> {
        let url = self.endpoint(segments)?;

        let mut request = self
            .inner
            .client
            .get(url.clone())
            .header("Accept", "application/json");
        if let Some(token) = &self.inner.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(FetchError::RateLimited(retry_after));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.path().to_string()));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            let body = preview(&response_text);
            tracing::error!(
                status = %status,
                url = %url,
                body = %body,
                "Catalog API returned non-success status"
            );
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str(&response_text) {
            Ok(value) => {
                debug!(url = %url, "Catalog API response decoded");
                Ok(value)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    url = %url,
                    body = %preview(&response_text),
                    "Failed to parse catalog API response"
                );
                Err(FetchError::Parse(e))
            }
        }
    }
}

impl CatalogFetcher for HttpCatalogClient {
    async fn fetch(&self, vendor_id: &VendorId) -> Result<FetchedCatalog, FetchError> {
        let (vendor, products) =
            tokio::try_join!(self.get_vendor(vendor_id), self.get_products(vendor_id))?;
        Ok(FetchedCatalog { vendor, products })
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
