//! The signed-in customer's order history.

use reqwest::Method;
use serde::Deserialize;
use shoplane_core::Order;
use tracing::instrument;

use crate::api::{ApiClient, ApiError};

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    orders: Vec<Order>,
}

/// List the signed-in user's orders, newest first.
///
/// A signed-out caller gets an empty list rather than an error.
///
/// # Errors
///
/// Returns an error if the request fails or the credential was rejected.
#[instrument(skip(api))]
pub async fn my_orders(api: &ApiClient) -> Result<Vec<Order>, ApiError> {
    let builder = match api.authed(Method::GET, "/api/payment/my-orders") {
        Ok(builder) => builder,
        Err(ApiError::NotAuthenticated) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let response: OrdersResponse = api.send(builder).await?;
    if !response.success {
        return Ok(Vec::new());
    }

    let mut orders = response.orders;
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    tracing::debug!(count = orders.len(), "loaded order history");
    Ok(orders)
}
