//! ShopLane back-office client.
//!
//! Operators work the fulfilment queue, maintain inventory, list products
//! (one at a time or in bulk), browse customers and read the revenue ledger.
//! Everything goes through [`client::AdminClient`], which carries the admin
//! bearer credential from [`config::AdminConfig`].
//!
//! # Security
//!
//! The admin credential can change order status and delete products. It is
//! held as a [`secrecy::SecretString`] and never logged.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod client;
pub mod config;
pub mod customers;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod orders;
pub mod products;

pub use client::AdminClient;
pub use config::AdminConfig;
pub use error::{AdminError, Result};
