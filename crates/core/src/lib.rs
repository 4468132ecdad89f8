//! Garden Market Core - Shared domain types.
//!
//! This crate provides the types shared by every Garden Market component:
//! vendors ("gardens"), their products ("plants"), categories and prices.
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no caching, no HTTP
//! clients. Catalog freshness and the cart live in
//! `garden-market-storefront`.
//!
//! # Modules
//!
//! - [`types`] - Vendor ids, prices, categories, products and line issues

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
