//! Shipping address types.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::AddressId;

/// Errors that can occur when validating address fields.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Pincode is not exactly six digits.
    #[error("pincode must be exactly {expected} digits")]
    InvalidPincode {
        /// Required number of digits.
        expected: usize,
    },
    /// Phone number is not a ten digit mobile number.
    #[error("phone must be a 10 digit mobile number")]
    InvalidPhone,
    /// A required field is empty.
    #[error("{0} cannot be empty")]
    MissingField(&'static str),
}

/// A six digit Indian postal code.
///
/// ## Examples
///
/// ```
/// use shoplane_core::Pincode;
///
/// assert!(Pincode::parse("452001").is_ok());
/// assert!(Pincode::parse("45200").is_err());
/// assert!(Pincode::parse("45200a").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pincode(String);

impl Pincode {
    /// Number of digits in a pincode.
    pub const LENGTH: usize = 6;

    /// Parse a pincode.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is exactly six ASCII digits.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        if s.len() != Self::LENGTH || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressError::InvalidPincode {
                expected: Self::LENGTH,
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Whether a partially typed value could still become a pincode.
    ///
    /// Form input rejects anything that is not a digit prefix.
    #[must_use]
    pub fn is_partial(s: &str) -> bool {
        s.len() <= Self::LENGTH && s.bytes().all(|b| b.is_ascii_digit())
    }

    /// Returns the pincode as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pincode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Pincode {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pincode> for String {
    fn from(pin: Pincode) -> Self {
        pin.0
    }
}

/// A mobile phone number, stored as its ten significant digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Parse a phone number, accepting an optional `+91`/`0` prefix and spaces.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::InvalidPhone`] if ten digits cannot be extracted.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let digits: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        let digits = digits
            .strip_prefix("+91")
            .or_else(|| digits.strip_prefix('0').filter(|d| d.len() == 10))
            .unwrap_or(&digits);
        if digits.len() != 10 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressError::InvalidPhone);
        }
        Ok(Self(digits.to_owned()))
    }

    /// Returns the digits as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Phone {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

/// Address label shown on the address card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AddressKind {
    #[default]
    Home,
    Work,
    Other,
}

/// A saved shipping address.
///
/// `city` and `state` are normally derived from the pincode lookup and are
/// not typed in by the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "_id")]
    pub id: AddressId,
    pub name: String,
    pub phone: Phone,
    pub pincode: Pincode,
    pub locality: String,
    pub address: String,
    pub city: String,
    pub state: String,
    #[serde(rename = "type", default)]
    pub kind: AddressKind,
}

impl Address {
    /// Single-line form sent with orders: `street, city, state - pincode`.
    #[must_use]
    pub fn one_line(&self) -> String {
        format!(
            "{}, {}, {} - {}",
            self.address, self.city, self.state, self.pincode
        )
    }
}
