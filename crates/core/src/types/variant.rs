//! Variant keys distinguishing otherwise identical cart lines.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A size/color combination for a product.
///
/// Two cart lines for the same product are distinct when their variant keys
/// differ. Both parts are optional; an all-empty key is normalised to "no
/// variant" by [`VariantKey::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct VariantKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl VariantKey {
    /// A size-only variant.
    #[must_use]
    pub fn size(size: impl Into<String>) -> Self {
        Self {
            size: Some(size.into()),
            color: None,
        }
    }

    /// A size and color variant.
    #[must_use]
    pub fn new(size: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            size: Some(size.into()),
            color: Some(color.into()),
        }
    }

    /// Trim both parts and collapse an empty key to `None`.
    #[must_use]
    pub fn normalize(key: Option<Self>) -> Option<Self> {
        let key = key?;
        let clean = |part: Option<String>| {
            part.map(|p| p.trim().to_owned()).filter(|p| !p.is_empty())
        };
        let key = Self {
            size: clean(key.size),
            color: clean(key.color),
        };
        (key.size.is_some() || key.color.is_some()).then_some(key)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.size, &self.color) {
            (Some(size), Some(color)) => write!(f, "{size}/{color}"),
            (Some(size), None) => f.write_str(size),
            (None, Some(color)) => f.write_str(color),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_blank_keys() {
        let blank = VariantKey {
            size: Some("  ".to_string()),
            color: None,
        };
        assert_eq!(VariantKey::normalize(Some(blank)), None);
        assert_eq!(VariantKey::normalize(None), None);
    }

    #[test]
    fn test_normalize_trims() {
        let key = VariantKey::normalize(Some(VariantKey::size(" M "))).unwrap_or_default();
        assert_eq!(key.size.as_deref(), Some("M"));
    }

    #[test]
    fn test_display() {
        assert_eq!(VariantKey::new("L", "Black").to_string(), "L/Black");
        assert_eq!(VariantKey::size("XL").to_string(), "XL");
    }
}
