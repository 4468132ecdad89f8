//! Newtype IDs for type-safe entity references.
//!
//! Vendor ids come from the catalog backend as opaque strings (document
//! keys), so they are wrapped rather than parsed.

use serde::{Deserialize, Serialize};

/// Identifier of a vendor ("garden").
///
/// # Example
///
/// ```rust
/// # use garden_market_core::VendorId;
/// let id = VendorId::new("rosewood-garden");
/// assert_eq!(id.as_str(), "rosewood-garden");
/// assert_eq!(id.to_string(), "rosewood-garden");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(String);

impl VendorId {
    /// Create a new vendor ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ::core::fmt::Display for VendorId {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VendorId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for VendorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<VendorId> for String {
    fn from(id: VendorId) -> Self {
        id.0
    }
}

impl AsRef<str> for VendorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
