//! Core types for Garden Market.
//!
//! This module provides type-safe wrappers for the catalog domain.

pub mod category;
pub mod id;
pub mod price;
pub mod product;
pub mod status;
pub mod vendor;

pub use category::{Category, CategoryError};
pub use id::VendorId;
pub use price::{Price, PriceError};
pub use product::{Product, ProductKey, ProductsByCategory};
pub use status::LineIssue;
pub use vendor::{DeliveryOption, Vendor};
