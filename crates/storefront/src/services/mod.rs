//! Services that talk to endpoints outside the cart and checkout flows.
//!
//! - `auth` - login, registration, password recovery, profile
//! - `orders` - the customer's order history
//! - `postal` - pincode to city/state lookup

pub mod auth;
pub mod orders;
pub mod postal;
