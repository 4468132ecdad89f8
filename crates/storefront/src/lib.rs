//! Garden Market storefront library.
//!
//! Cart and catalog freshness services: a staleness-aware catalog cache, a
//! refresh coordinator that de-duplicates fetches, and a cart that is
//! checked against the latest known catalog. Provided as a library so it
//! can be tested and embedded.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod refresh;
pub mod state;

#[cfg(test)]
mod test_support;

pub use error::{Result, StorefrontError};
pub use state::AppState;
