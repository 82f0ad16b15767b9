//! ShopLane Core - Shared domain types.
//!
//! This crate provides the types used across all ShopLane components:
//! - `storefront` - Cart, wishlist, checkout and catalog client
//! - `admin` - Back-office client for orders, inventory and customers
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no caches. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, money, variants, contact details and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
