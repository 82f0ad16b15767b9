//! Revenue summary computed from the order list.

use serde::Serialize;
use shoplane_core::{Money, Order, OrderStatus};

/// Money received and money still to be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    /// Orders whose payment has settled (`paid` and later).
    pub bank_balance: Money,
    /// Cash-on-delivery orders still awaiting collection.
    pub expected_cash: Money,
    pub settled_orders: usize,
    pub pending_cod_orders: usize,
}

impl Ledger {
    #[must_use]
    pub fn from_orders(orders: &[Order]) -> Self {
        orders.iter().fold(Self::default(), |mut ledger, order| {
            if order.status.is_settled() {
                ledger.bank_balance = ledger.bank_balance + order.amount;
                ledger.settled_orders += 1;
            } else if order.status == OrderStatus::Pending && order.is_cash_on_delivery() {
                ledger.expected_cash = ledger.expected_cash + order.amount;
                ledger.pending_cod_orders += 1;
            }
            ledger
        })
    }

    /// Bank balance plus cash still to collect.
    #[must_use]
    pub fn total_revenue(&self) -> Money {
        self.bank_balance + self.expected_cash
    }
}
