//! Order fulfilment queue.
//!
//! Paid orders move through five warehouse tabs, one per status:
//!
//! | tab | status |
//! |---|---|
//! | Pending Labels | `paid` |
//! | RTD | `ready` |
//! | Pending Handover | `packed` |
//! | In Transit | `shipped` |
//! | Completed | `delivered` |
//!
//! Cash-on-delivery orders stay `pending` until collected and appear in no
//! tab; the ledger accounts for them.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;
use shoplane_core::{Order, OrderId, OrderStatus};
use tracing::instrument;

use crate::client::AdminClient;
use crate::error::AdminError;

/// A warehouse queue tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderTab {
    PendingLabels,
    ReadyToDispatch,
    PendingHandover,
    InTransit,
    Completed,
}

impl OrderTab {
    pub const ALL: [Self; 5] = [
        Self::PendingLabels,
        Self::ReadyToDispatch,
        Self::PendingHandover,
        Self::InTransit,
        Self::Completed,
    ];

    /// The status whose orders this tab lists.
    #[must_use]
    pub const fn status(self) -> OrderStatus {
        match self {
            Self::PendingLabels => OrderStatus::Paid,
            Self::ReadyToDispatch => OrderStatus::Ready,
            Self::PendingHandover => OrderStatus::Packed,
            Self::InTransit => OrderStatus::Shipped,
            Self::Completed => OrderStatus::Delivered,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::PendingLabels => "Pending Labels",
            Self::ReadyToDispatch => "RTD",
            Self::PendingHandover => "Pending Handover",
            Self::InTransit => "In Transit",
            Self::Completed => "Completed",
        }
    }
}

impl std::str::FromStr for OrderTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        Self::ALL
            .into_iter()
            .find(|tab| {
                tab.label().to_ascii_lowercase() == wanted || tab.status().as_str() == wanted
            })
            .ok_or_else(|| format!("unknown tab: {s}"))
    }
}

/// All orders, viewed through the warehouse tabs.
#[derive(Debug, Clone, Default)]
pub struct OrderQueue {
    orders: Vec<Order>,
}

impl OrderQueue {
    #[must_use]
    pub const fn new(orders: Vec<Order>) -> Self {
        Self { orders }
    }

    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Number of orders in a tab, ignoring any search.
    #[must_use]
    pub fn count(&self, tab: OrderTab) -> usize {
        self.orders.iter().filter(|o| o.status == tab.status()).count()
    }

    /// Orders in `tab` whose payment id or recipient name contains `search`,
    /// case-insensitively. A blank search matches everything.
    #[must_use]
    pub fn filter(&self, tab: OrderTab, search: &str) -> Vec<&Order> {
        let needle = search.trim().to_lowercase();
        self.orders
            .iter()
            .filter(|o| o.status == tab.status())
            .filter(|o| needle.is_empty() || matches_search(o, &needle))
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| &o.id == id)
    }

    /// Move an order to `target`, forward only.
    ///
    /// The local copy changes only after the server accepted the update.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::InvalidTransition`] for a backward or same-status
    /// move, [`AdminError::NotFound`] for an unknown order, or the API error.
    #[instrument(skip(self, client), fields(order_id = %id))]
    pub async fn advance(
        &mut self,
        client: &AdminClient,
        id: &OrderId,
        target: OrderStatus,
    ) -> Result<&Order, AdminError> {
        let index = self
            .orders
            .iter()
            .position(|o| &o.id == id)
            .ok_or_else(|| AdminError::NotFound(format!("order {id}")))?;
        let current = self.orders.get(index).map(|o| o.status).unwrap_or_default();
        if !current.can_advance_to(target) {
            return Err(AdminError::InvalidTransition {
                from: current,
                to: target,
            });
        }

        client.update_order_status(id, target).await?;

        let order = self
            .orders
            .get_mut(index)
            .ok_or_else(|| AdminError::NotFound(format!("order {id}")))?;
        order.status = target;
        tracing::info!(from = %current, to = %target, "order advanced");
        Ok(order)
    }
}

fn matches_search(order: &Order, needle: &str) -> bool {
    let payment = order
        .razorpay_payment_id
        .as_deref()
        .is_some_and(|id| id.to_lowercase().contains(needle));
    let name = order
        .address
        .as_ref()
        .and_then(|a| a.recipient())
        .is_some_and(|name| name.to_lowercase().contains(needle));
    payment || name
}

// =============================================================================
// Endpoints
// =============================================================================

#[derive(Serialize)]
struct StatusUpdate {
    status: OrderStatus,
}

impl AdminClient {
    /// Every order in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn all_orders(&self) -> Result<Vec<Order>, AdminError> {
        self.send(self.request(Method::GET, "/api/payment/all-orders")?)
            .await
    }

    /// Set an order's status without local validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), AdminError> {
        let path = format!("/api/payment/update-status/{}", id.as_str());
        self.send_empty(self.request(Method::PUT, &path)?.json(&StatusUpdate { status }))
            .await
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// Invoice number shown on the printout: `OD` plus the payment id without
/// its `pay_` prefix.
#[must_use]
pub fn invoice_number(order: &Order) -> String {
    let id = order
        .razorpay_payment_id
        .as_deref()
        .map_or("N/A", |id| id.get(4..).unwrap_or(""));
    format!("OD{id}")
}

/// Plain-text tax invoice for an order.
#[must_use]
pub fn render_invoice(order: &Order, issued: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "TAX INVOICE");
    let _ = writeln!(out, "Order ID: {}", invoice_number(order));
    let _ = writeln!(out, "Invoice Date: {}", issued.format("%d %b %Y"));
    if let Some(created) = order.created_at {
        let _ = writeln!(out, "Order Date: {}", created.format("%d %b %Y"));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Shipping Details:");
    let recipient = order
        .address
        .as_ref()
        .and_then(|a| a.recipient())
        .unwrap_or("Valued Customer");
    let _ = writeln!(out, "{recipient}");
    let line = order.address.as_ref().map(|a| a.to_line()).unwrap_or_default();
    let _ = writeln!(out, "{}", if line.is_empty() { "N/A" } else { line.as_str() });
    let _ = writeln!(out, "Email: {}", order.email.as_deref().unwrap_or("N/A"));
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<32} {:>5} {:>12} {:>12}", "Product", "Qty", "Unit Price", "Net Amount");
    for item in &order.items {
        let _ = writeln!(
            out,
            "{:<32} {:>5} {:>12} {:>12}",
            item.name,
            item.qty,
            item.price.to_string(),
            item.line_total().to_string()
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Grand Total: {}", order.amount);
    let _ = writeln!(out, "This is a computer generated invoice.");
    out
}
