//! Registered customers.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use shoplane_core::UserProfile;
use tracing::instrument;

use crate::client::AdminClient;
use crate::error::AdminError;

/// Sign-up date buckets on the customers screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CustomerFilter {
    #[default]
    All,
    /// Joined on the current (UTC) calendar day.
    Today,
    /// Joined within the last seven days.
    Week,
    /// Joined more than seven days ago.
    Older,
}

impl CustomerFilter {
    pub const ALL: [Self; 4] = [Self::All, Self::Today, Self::Week, Self::Older];

    /// Customers without a sign-up date only match [`CustomerFilter::All`].
    #[must_use]
    pub fn matches(self, customer: &UserProfile, now: DateTime<Utc>) -> bool {
        let Some(joined) = customer.created_at else {
            return self == Self::All;
        };
        let week_ago = now - Duration::days(7);
        match self {
            Self::All => true,
            Self::Today => joined.date_naive() == now.date_naive(),
            Self::Week => joined >= week_ago,
            Self::Older => joined < week_ago,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Today => "Today",
            Self::Week => "This Week",
            Self::Older => "Older",
        }
    }
}

impl FromStr for CustomerFilter {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "today" => Ok(Self::Today),
            "week" | "this week" => Ok(Self::Week),
            "older" => Ok(Self::Older),
            other => Err(AdminError::BadRequest(format!("unknown filter '{other}'"))),
        }
    }
}

/// Customers in `filter` whose name or email contains `search`.
#[must_use]
pub fn filter_customers<'a>(
    customers: &'a [UserProfile],
    filter: CustomerFilter,
    search: &str,
    now: DateTime<Utc>,
) -> Vec<&'a UserProfile> {
    let needle = search.trim().to_lowercase();
    customers
        .iter()
        .filter(|c| filter.matches(c, now))
        .filter(|c| {
            needle.is_empty()
                || c.name.to_lowercase().contains(&needle)
                || c.email.as_str().to_lowercase().contains(&needle)
        })
        .collect()
}

/// Bucket sizes for the filter chips, ignoring any search term.
#[must_use]
pub fn filter_counts(customers: &[UserProfile], now: DateTime<Utc>) -> Vec<(CustomerFilter, usize)> {
    CustomerFilter::ALL
        .iter()
        .map(|&f| (f, customers.iter().filter(|c| f.matches(c, now)).count()))
        .collect()
}

impl AdminClient {
    /// Every registered customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn all_customers(&self) -> Result<Vec<UserProfile>, AdminError> {
        self.send(self.request(Method::GET, "/api/admin/all-customers")?)
            .await
    }
}
