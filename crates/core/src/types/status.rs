//! Status enums for orders, payments and accounts.

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// Orders are created as `Pending` (cash on delivery) or `Paid` (gateway
/// verified) and are then walked forward by the back office. Status never
/// moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    /// Orders without an explicit status are treated as paid.
    #[default]
    Paid,
    /// Ready to dispatch (label printed).
    Ready,
    Packed,
    Shipped,
    Delivered,
}

impl OrderStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Paid,
        Self::Ready,
        Self::Packed,
        Self::Shipped,
        Self::Delivered,
    ];

    /// The next status in the fulfilment pipeline, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Paid),
            Self::Paid => Some(Self::Ready),
            Self::Ready => Some(Self::Packed),
            Self::Packed => Some(Self::Shipped),
            Self::Shipped => Some(Self::Delivered),
            Self::Delivered => None,
        }
    }

    /// Whether moving from `self` to `target` goes strictly forward.
    #[must_use]
    pub fn can_advance_to(self, target: Self) -> bool {
        target > self
    }

    /// Whether money for this order has been collected.
    ///
    /// Cash-on-delivery orders stay `Pending` until the courier collects.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Ready => "ready",
            Self::Packed => "packed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "ready" => Ok(Self::Ready),
            "packed" => Ok(Self::Packed),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// How the customer pays at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    #[default]
    Upi,
    Card,
    CashOnDelivery,
}

impl PaymentMode {
    /// Whether this mode goes through the hosted payment gateway.
    #[must_use]
    pub const fn uses_gateway(self) -> bool {
        !matches!(self, Self::CashOnDelivery)
    }
}

impl std::fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upi => write!(f, "upi"),
            Self::Card => write!(f, "card"),
            Self::CashOnDelivery => write!(f, "cod"),
        }
    }
}

impl std::str::FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upi" => Ok(Self::Upi),
            "card" => Ok(Self::Card),
            "cod" | "cash_on_delivery" => Ok(Self::CashOnDelivery),
            _ => Err(format!("invalid payment mode: {s}")),
        }
    }
}

/// Account role returned by the auth endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}
