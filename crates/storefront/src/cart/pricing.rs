//! Cart totals.

use serde::{Deserialize, Serialize};
use shoplane_core::Money;

use crate::models::CartLine;

/// Fee schedule applied on top of line totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    /// Flat fee added to every non-empty cart.
    pub platform_fee: Money,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            platform_fee: Money::from_major(20),
        }
    }
}

/// Totals shown on the cart page. `total` is also what checkout charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub item_count: u32,
    pub subtotal: Money,
    pub platform_fee: Money,
    pub total: Money,
}

impl Pricing {
    /// Subtotal plus the platform fee. An empty cart costs nothing.
    #[must_use]
    pub fn summarize(&self, lines: &[CartLine]) -> CartSummary {
        let subtotal: Money = lines.iter().map(CartLine::line_total).sum();
        let item_count = lines.iter().map(|line| line.quantity).sum();
        let platform_fee = if lines.is_empty() {
            Money::ZERO
        } else {
            self.platform_fee
        };
        CartSummary {
            item_count,
            subtotal,
            platform_fee,
            total: subtotal + platform_fee,
        }
    }
}
