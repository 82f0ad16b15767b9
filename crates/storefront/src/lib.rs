//! ShopLane storefront client core.
//!
//! The pieces a shopping front end needs between its views and the store
//! API: an optimistic cart and wishlist with a write-through on-device
//! cache, the checkout state machine, the catalog, saved addresses with
//! pincode lookup, and account management.
//!
//! Rendering is left to the embedding application, which subscribes to
//! [`notify::Notifier`] for toasts and to [`session::Session`] for identity.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod address;
pub mod api;
pub mod bookmarks;
pub mod cache;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod remote;
pub mod services;
pub mod session;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test_support;
