//! Core types for ShopLane.
//!
//! This module provides type-safe wrappers for common domain concepts and
//! the records the remote store hands back (products, orders, users).

pub mod address;
pub mod email;
pub mod id;
pub mod order;
pub mod price;
pub mod product;
pub mod status;
pub mod user;
pub mod variant;

pub use address::{Address, AddressError, AddressKind, Phone, Pincode};
pub use email::{Email, EmailError};
pub use id::*;
pub use order::{Order, OrderAddress, OrderItem};
pub use price::{CurrencyCode, Money};
pub use product::Product;
pub use status::*;
pub use user::UserProfile;
pub use variant::VariantKey;
