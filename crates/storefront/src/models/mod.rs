//! Storefront state records.
//!
//! These are the in-memory (and cached) shapes of cart and wishlist
//! contents, separate from the wire types the remote store returns.

pub mod cart;

pub use cart::{CartLine, LineKey, WishlistEntry};
