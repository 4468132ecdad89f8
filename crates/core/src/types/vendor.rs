//! Vendor ("garden") records.

use serde::{Deserialize, Serialize};

use super::id::VendorId;
use super::price::Price;

/// A seller with contact and delivery metadata.
///
/// The cart never mutates a vendor; the catalog cache swaps the whole
/// record on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub operation_hours: Option<String>,
    #[serde(default)]
    pub has_delivery: bool,
    /// Local delivery cost; `None` when the vendor has not set one.
    #[serde(default)]
    pub delivery_cost: Option<Price>,
    /// Flat island-wide delivery cost. Takes precedence over local delivery.
    #[serde(default)]
    pub island_wide_delivery_cost: Option<Price>,
    #[serde(default)]
    pub delivery_area: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

/// How a vendor delivers, derived from the delivery-policy fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOption {
    /// The vendor does not deliver.
    Unavailable,
    /// One flat cost anywhere on the island.
    IslandWide(Price),
    /// Delivery within an optional named area at a fixed cost.
    Local {
        cost: Price,
        area: Option<String>,
    },
    /// Delivery is offered but no cost has been published.
    Unpriced,
}

impl Vendor {
    /// Resolve the delivery policy.
    ///
    /// An island-wide cost wins over a local cost. A zero local cost counts
    /// as "not published".
    #[must_use]
    pub fn delivery(&self) -> DeliveryOption {
        if !self.has_delivery {
            return DeliveryOption::Unavailable;
        }
        if let Some(cost) = self.island_wide_delivery_cost {
            return DeliveryOption::IslandWide(cost);
        }
        match self.delivery_cost {
            Some(cost) if cost != Price::ZERO => DeliveryOption::Local {
                cost,
                area: self.delivery_area.clone(),
            },
            _ => DeliveryOption::Unpriced,
        }
    }
}
