//! Order records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::OrderId;
use super::price::Money;
use super::status::OrderStatus;

/// One purchased line as frozen into an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub qty: u32,
    pub price: Money,
    #[serde(default)]
    pub image: String,
}

impl OrderItem {
    /// Price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.price * self.qty
    }
}

/// Shipping address attached to an order.
///
/// Checkout submits a single formatted line; orders created by other
/// channels carry a structured object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderAddress {
    Line(String),
    Detailed {
        #[serde(default, rename = "fullName", alias = "name")]
        full_name: Option<String>,
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        city: Option<String>,
        #[serde(default)]
        state: Option<String>,
        #[serde(default)]
        pincode: Option<String>,
        #[serde(default)]
        phone: Option<String>,
    },
}

impl OrderAddress {
    /// Recipient name, when the address is structured.
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::Line(_) => None,
            Self::Detailed { full_name, .. } => full_name.as_deref(),
        }
    }

    /// Printable single-line form.
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Self::Line(line) => line.clone(),
            Self::Detailed {
                full_name,
                address,
                city,
                state,
                pincode,
                ..
            } => [full_name, address, city, state, pincode]
                .into_iter()
                .filter_map(|part| part.as_deref())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// An order as listed by the order endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: OrderId,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<OrderAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_payment_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Payment reference shown to customers and staff.
    #[must_use]
    pub fn payment_reference(&self) -> Option<&str> {
        self.razorpay_payment_id
            .as_deref()
            .or(self.razorpay_order_id.as_deref())
    }

    /// Whether this is a cash-on-delivery order.
    #[must_use]
    pub fn is_cash_on_delivery(&self) -> bool {
        self.razorpay_order_id
            .as_deref()
            .is_some_and(|id| id.starts_with("COD_"))
            || self.razorpay_payment_id.as_deref() == Some("CASH_ON_DELIVERY")
    }

    /// Total number of units across all items.
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        self.items.iter().map(|item| item.qty).sum()
    }
}

/// Status strings arrive in any case ("Pending", "paid"); null means paid.
fn lenient_status<'de, D>(deserializer: D) -> Result<OrderStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(OrderStatus::default()),
        Some(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
