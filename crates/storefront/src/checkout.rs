//! Checkout flow coordinator.
//!
//! Drives one checkout from cart review to a confirmed order:
//!
//! ```text
//! CartReview -> AddressSelection -> PaymentMethodSelection
//!     -> GatewayAuthorization | CashOnDeliveryConfirm
//!     -> OrderVerification -> OrderConfirmed
//! ```
//!
//! Gateway payments create an order on the remote store, hand the checkout
//! options to a [`GatewayAuthorizer`] (the hosted payment UI) and submit the
//! resulting signature for server-side verification. Cash on delivery skips
//! the gateway and submits a synthetic reference directly.
//!
//! A failed verification returns the flow to payment method selection. There
//! is no automatic retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use shoplane_core::{Address, Money, OrderItem, OrderStatus, PaymentMode};
use thiserror::Error;
use tracing::instrument;

use crate::api::{ApiClient, ApiError};
use crate::cache::{CacheError, LocalCache, LocalCacheExt, keys};
use crate::cart::{CartStore, CartSummary, Pricing};
use crate::error::add_breadcrumb;
use crate::models::CartLine;

/// Payment id recorded for cash-on-delivery orders.
pub const COD_PAYMENT_ID: &str = "CASH_ON_DELIVERY";
/// Signature placeholder for cash-on-delivery orders.
pub const COD_SIGNATURE: &str = "COD_BYPASS";

/// Where a checkout currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckoutStep {
    CartReview,
    AddressSelection,
    PaymentMethodSelection,
    GatewayAuthorization,
    CashOnDeliveryConfirm,
    OrderVerification,
    OrderConfirmed,
}

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Your bag is empty")]
    EmptyCart,

    #[error("Please provide shipping details first")]
    AddressRequired,

    #[error("Cannot {action} during {step:?}")]
    InvalidTransition {
        step: CheckoutStep,
        action: &'static str,
    },

    #[error("Authentication required!")]
    NotAuthenticated,

    #[error("Payment service error: {0}")]
    Remote(#[from] ApiError),

    #[error("Verification failed!")]
    VerificationRejected,

    #[error("Could not save checkout state: {0}")]
    Cache(#[from] CacheError),
}

// =============================================================================
// Payment backend
// =============================================================================

/// Order created on the gateway before the hosted UI opens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Amount in minor units, as the gateway reports it.
    pub amount: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "INR".to_string()
}

/// Body of the verification call. Also creates the order record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyPaymentRequest {
    pub email: String,
    pub amount: Money,
    pub items: Vec<OrderItem>,
    pub address: String,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Remote endpoints used by checkout.
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    async fn create_gateway_order(&self, amount: Money) -> Result<GatewayOrder, ApiError>;
    async fn verify_payment(
        &self,
        request: &VerifyPaymentRequest,
    ) -> Result<VerifyResponse, ApiError>;
}

#[async_trait]
impl PaymentBackend for ApiClient {
    #[instrument(skip(self))]
    async fn create_gateway_order(&self, amount: Money) -> Result<GatewayOrder, ApiError> {
        #[derive(Serialize)]
        struct Body {
            amount: Money,
        }
        self.authed_json(Method::POST, "/api/payment/order", &Body { amount })
            .await
    }

    #[instrument(skip(self, request), fields(order_id = %request.razorpay_order_id))]
    async fn verify_payment(
        &self,
        request: &VerifyPaymentRequest,
    ) -> Result<VerifyResponse, ApiError> {
        self.authed_json(Method::POST, "/api/payment/verify", request)
            .await
    }
}

// =============================================================================
// Gateway authorizer
// =============================================================================

/// Contact details pre-filled in the hosted payment UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prefill {
    pub name: String,
    pub contact: String,
    pub email: String,
}

/// Everything the hosted payment UI needs to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub amount: u64,
    pub currency: String,
    pub name: String,
    pub description: String,
    pub order_id: String,
    pub prefill: Prefill,
}

/// What the hosted payment UI reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Authorized {
        order_id: String,
        payment_id: String,
        signature: String,
    },
    /// The customer closed the payment UI.
    Dismissed,
}

/// The out-of-process payment UI.
#[async_trait]
pub trait GatewayAuthorizer: Send + Sync {
    async fn authorize(&self, options: &CheckoutOptions) -> GatewayOutcome;
}

// =============================================================================
// Confirmation sequence
// =============================================================================

/// Stages shown after an order is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStage {
    PaymentVerified,
    SendingConfirmation,
    Success,
    ReturnToCatalog,
}

/// Delay before each stage after the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationTimings {
    pub sending_confirmation: Duration,
    pub success: Duration,
    pub return_to_catalog: Duration,
}

impl Default for ConfirmationTimings {
    fn default() -> Self {
        Self {
            sending_confirmation: Duration::from_millis(2000),
            success: Duration::from_millis(3000),
            return_to_catalog: Duration::from_millis(2500),
        }
    }
}

impl ConfirmationTimings {
    /// No delays, for tests and non-interactive use.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            sending_confirmation: Duration::ZERO,
            success: Duration::ZERO,
            return_to_catalog: Duration::ZERO,
        }
    }

    /// Delays in milliseconds as `sending,success,return`, e.g. `2000,3000,2500`.
    ///
    /// # Errors
    ///
    /// Returns a message if there are not exactly three whole numbers.
    pub fn parse_millis(raw: &str) -> Result<Self, String> {
        let delays = raw
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| format!("'{}': {e}", part.trim()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        match delays.as_slice() {
            &[sending_confirmation, success, return_to_catalog] => Ok(Self {
                sending_confirmation,
                success,
                return_to_catalog,
            }),
            other => Err(format!("expected 3 delays, got {}", other.len())),
        }
    }

    /// Emit each stage in order, sleeping between them.
    pub async fn play(&self, mut on_stage: impl FnMut(ConfirmationStage) + Send) {
        on_stage(ConfirmationStage::PaymentVerified);
        for (delay, stage) in [
            (self.sending_confirmation, ConfirmationStage::SendingConfirmation),
            (self.success, ConfirmationStage::Success),
            (self.return_to_catalog, ConfirmationStage::ReturnToCatalog),
        ] {
            tokio::time::sleep(delay).await;
            on_stage(stage);
        }
    }
}

// =============================================================================
// CheckoutFlow
// =============================================================================

/// A placed order as seen by the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order_reference: String,
    pub payment_id: String,
    pub mode: PaymentMode,
    pub amount: Money,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
}

/// Result of [`CheckoutFlow::pay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentResult {
    Confirmed(OrderReceipt),
    /// The customer closed the payment UI; pick a method again.
    Dismissed,
}

/// One checkout in progress.
pub struct CheckoutFlow {
    store: CartStore,
    backend: Arc<dyn PaymentBackend>,
    cache: Arc<dyn LocalCache>,
    pricing: Pricing,
    gateway_key: Option<String>,
    step: CheckoutStep,
    address: Option<Address>,
    mode: Option<PaymentMode>,
}

impl CheckoutFlow {
    /// Start at cart review. A shipping address saved by an earlier visit
    /// is picked up from the cache.
    #[must_use]
    pub fn new(
        store: CartStore,
        backend: Arc<dyn PaymentBackend>,
        cache: Arc<dyn LocalCache>,
        pricing: Pricing,
        gateway_key: Option<String>,
    ) -> Self {
        let address = cache.get(keys::SHIPPING_ADDRESS).ok().flatten();
        Self {
            store,
            backend,
            cache,
            pricing,
            gateway_key,
            step: CheckoutStep::CartReview,
            address,
            mode: None,
        }
    }

    #[must_use]
    pub const fn step(&self) -> CheckoutStep {
        self.step
    }

    #[must_use]
    pub const fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    #[must_use]
    pub const fn payment_mode(&self) -> Option<PaymentMode> {
        self.mode
    }

    /// What the customer will be charged for the current cart.
    #[must_use]
    pub fn amount(&self) -> CartSummary {
        self.store.summary(&self.pricing)
    }

    /// Leave cart review.
    ///
    /// # Errors
    ///
    /// Fails when the cart is empty or the flow is past cart review.
    pub fn begin(&mut self) -> Result<(), CheckoutError> {
        self.require_step(&[CheckoutStep::CartReview], "begin checkout")?;
        if self.store.cart().is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        self.step = CheckoutStep::AddressSelection;
        Ok(())
    }

    /// Choose the shipping address and remember it across restarts.
    ///
    /// # Errors
    ///
    /// Fails outside address or payment method selection, or if the address
    /// cannot be cached.
    pub fn select_address(&mut self, address: Address) -> Result<(), CheckoutError> {
        self.require_step(
            &[
                CheckoutStep::AddressSelection,
                CheckoutStep::PaymentMethodSelection,
            ],
            "select an address",
        )?;
        self.cache.set(keys::SHIPPING_ADDRESS, &address)?;
        self.address = Some(address);
        Ok(())
    }

    /// Move on to payment method selection.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::AddressRequired`] when no address is selected.
    pub fn proceed_to_payment(&mut self) -> Result<(), CheckoutError> {
        self.require_step(&[CheckoutStep::AddressSelection], "proceed to payment")?;
        if self.address.is_none() {
            self.store
                .notifier()
                .error("Please provide shipping details first");
            return Err(CheckoutError::AddressRequired);
        }
        if self.store.cart().is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        self.step = CheckoutStep::PaymentMethodSelection;
        Ok(())
    }

    /// Pick how to pay.
    ///
    /// # Errors
    ///
    /// Fails outside payment method selection.
    pub fn choose_payment(&mut self, mode: PaymentMode) -> Result<(), CheckoutError> {
        self.require_step(
            &[
                CheckoutStep::PaymentMethodSelection,
                CheckoutStep::GatewayAuthorization,
                CheckoutStep::CashOnDeliveryConfirm,
            ],
            "choose a payment method",
        )?;
        self.mode = Some(mode);
        self.step = if mode.uses_gateway() {
            CheckoutStep::GatewayAuthorization
        } else {
            CheckoutStep::CashOnDeliveryConfirm
        };
        Ok(())
    }

    /// Pay through the gateway and place the order.
    ///
    /// # Errors
    ///
    /// Fails when not signed in, when the gateway order cannot be created,
    /// or when verification fails. After a verification failure the flow is
    /// back at payment method selection.
    #[instrument(skip(self, authorizer))]
    pub async fn pay(
        &mut self,
        authorizer: &dyn GatewayAuthorizer,
    ) -> Result<PaymentResult, CheckoutError> {
        self.require_step(&[CheckoutStep::GatewayAuthorization], "pay")?;
        let mode = self.mode.unwrap_or_default();
        let (address, email) = self.ready_to_submit()?;
        let amount = self.amount().total;

        let order = match self.backend.create_gateway_order(amount).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(error = %e, "failed to create gateway order");
                self.store.notifier().error(transaction_failed_message(&e));
                return Err(e.into());
            }
        };
        tracing::info!(order_id = %order.id, amount = %amount, "gateway order created");

        let options = CheckoutOptions {
            key: self.gateway_key.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            name: "ShopLane".to_string(),
            description: "Premium Purchase".to_string(),
            order_id: order.id.clone(),
            prefill: Prefill {
                name: address.name.clone(),
                contact: address.phone.to_string(),
                email: email.clone(),
            },
        };

        match authorizer.authorize(&options).await {
            GatewayOutcome::Dismissed => {
                tracing::info!(order_id = %order.id, "payment dismissed");
                self.step = CheckoutStep::PaymentMethodSelection;
                Ok(PaymentResult::Dismissed)
            }
            GatewayOutcome::Authorized {
                order_id,
                payment_id,
                signature,
            } => {
                let request = self.verification_request(
                    &address, email, amount, order_id, payment_id, signature, None,
                );
                let receipt = self.verify(request, mode, true).await?;
                Ok(PaymentResult::Confirmed(receipt))
            }
        }
    }

    /// Place a cash-on-delivery order.
    ///
    /// # Errors
    ///
    /// Fails when not signed in or when the order is rejected; the flow is
    /// then back at payment method selection.
    #[instrument(skip(self))]
    pub async fn confirm_cash_on_delivery(&mut self) -> Result<OrderReceipt, CheckoutError> {
        self.require_step(&[CheckoutStep::CashOnDeliveryConfirm], "confirm cash on delivery")?;
        let (address, email) = self.ready_to_submit()?;
        let amount = self.amount().total;

        let request = self.verification_request(
            &address,
            email,
            amount,
            cod_reference(),
            COD_PAYMENT_ID.to_string(),
            COD_SIGNATURE.to_string(),
            Some("Pending".to_string()),
        );
        self.verify(request, PaymentMode::CashOnDelivery, false)
            .await
    }

    /// Start over after a confirmed order.
    pub fn reset(&mut self) {
        self.step = CheckoutStep::CartReview;
        self.mode = None;
        self.address = None;
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn require_step(&self, allowed: &[CheckoutStep], action: &'static str) -> Result<(), CheckoutError> {
        if allowed.contains(&self.step) {
            Ok(())
        } else {
            Err(CheckoutError::InvalidTransition {
                step: self.step,
                action,
            })
        }
    }

    fn ready_to_submit(&self) -> Result<(Address, String), CheckoutError> {
        let Some(user) = self.store.session().user() else {
            self.store.notifier().error("Authentication required!");
            return Err(CheckoutError::NotAuthenticated);
        };
        let address = self.address.clone().ok_or(CheckoutError::AddressRequired)?;
        if self.store.cart().is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        Ok((address, user.email.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    fn verification_request(
        &self,
        address: &Address,
        email: String,
        amount: Money,
        order_id: String,
        payment_id: String,
        signature: String,
        status: Option<String>,
    ) -> VerifyPaymentRequest {
        VerifyPaymentRequest {
            email,
            amount,
            items: self.store.cart().iter().map(order_item).collect(),
            address: address.one_line(),
            razorpay_order_id: order_id,
            razorpay_payment_id: payment_id,
            razorpay_signature: signature,
            status,
        }
    }

    async fn verify(
        &mut self,
        request: VerifyPaymentRequest,
        mode: PaymentMode,
        require_success_flag: bool,
    ) -> Result<OrderReceipt, CheckoutError> {
        self.step = CheckoutStep::OrderVerification;

        let outcome = match self.backend.verify_payment(&request).await {
            Ok(response) if response.success || !require_success_flag => Ok(()),
            Ok(response) => {
                tracing::warn!(message = ?response.message, "payment verification rejected");
                Err(CheckoutError::VerificationRejected)
            }
            Err(e) => {
                tracing::error!(error = %e, "payment verification failed");
                Err(e.into())
            }
        };

        if let Err(e) = outcome {
            self.step = CheckoutStep::PaymentMethodSelection;
            self.store.notifier().error(match &e {
                CheckoutError::Remote(api) if !require_success_flag => {
                    transaction_failed_message(api)
                }
                _ => "Verification failed!".to_string(),
            });
            return Err(e);
        }

        self.step = CheckoutStep::OrderConfirmed;
        add_breadcrumb(
            "checkout",
            "Order placed",
            Some(&[("order_id", &request.razorpay_order_id), ("mode", &mode.to_string())]),
        );
        tracing::info!(
            order_id = %request.razorpay_order_id,
            amount = %request.amount,
            %mode,
            "order confirmed"
        );

        self.store.clear_after_order().await;
        if let Err(e) = self.cache.remove(keys::SHIPPING_ADDRESS) {
            tracing::warn!(error = %e, "failed to clear shipping address");
        }
        self.store.notifier().success("Order placed!");

        Ok(OrderReceipt {
            order_reference: request.razorpay_order_id,
            payment_id: request.razorpay_payment_id,
            mode,
            amount: request.amount,
            status: if mode.uses_gateway() {
                OrderStatus::Paid
            } else {
                OrderStatus::Pending
            },
            items: request.items,
        })
    }
}

fn order_item(line: &CartLine) -> OrderItem {
    OrderItem {
        name: line.product.name.clone(),
        qty: line.quantity,
        price: line.price,
        image: line.product.primary_image().unwrap_or_default().to_string(),
    }
}

/// `COD_<unix millis>`.
fn cod_reference() -> String {
    format!("COD_{}", chrono::Utc::now().timestamp_millis())
}

fn transaction_failed_message(error: &ApiError) -> String {
    match error {
        ApiError::Api { message, .. } if !message.is_empty() => message.clone(),
        _ => "Transaction failed!".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use shoplane_core::{AddressId, AddressKind, Phone, Pincode};

    use super::*;
    use crate::cart::MutationFailurePolicy;
    use crate::notify::drain;
    use crate::test_support::{FakeRemote, Harness, product};

    #[derive(Default)]
    struct FakePayments {
        requests: Mutex<Vec<VerifyPaymentRequest>>,
        reject: bool,
        fail_order: bool,
    }

    #[async_trait]
    impl PaymentBackend for FakePayments {
        async fn create_gateway_order(&self, amount: Money) -> Result<GatewayOrder, ApiError> {
            if self.fail_order {
                return Err(ApiError::Api {
                    status: 400,
                    message: "Amount too low".to_string(),
                });
            }
            Ok(GatewayOrder {
                id: "order_abc".to_string(),
                amount: u64::try_from(amount.to_minor_units().unwrap()).unwrap(),
                currency: "INR".to_string(),
            })
        }

        async fn verify_payment(
            &self,
            request: &VerifyPaymentRequest,
        ) -> Result<VerifyResponse, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(VerifyResponse {
                success: !self.reject,
                message: None,
            })
        }
    }

    struct ScriptedGateway(GatewayOutcome);

    #[async_trait]
    impl GatewayAuthorizer for ScriptedGateway {
        async fn authorize(&self, options: &CheckoutOptions) -> GatewayOutcome {
            assert_eq!(options.order_id, "order_abc");
            self.0.clone()
        }
    }

    fn address() -> Address {
        Address {
            id: AddressId::new("addr_1"),
            name: "Asha".to_string(),
            phone: Phone::parse("9876543210").unwrap(),
            pincode: Pincode::parse("452001").unwrap(),
            locality: "Vijay Nagar".to_string(),
            address: "12 MG Road".to_string(),
            city: "Indore".to_string(),
            state: "Madhya Pradesh".to_string(),
            kind: AddressKind::Home,
        }
    }

    fn flow(h: &Harness, payments: Arc<FakePayments>) -> CheckoutFlow {
        CheckoutFlow::new(
            h.store.clone(),
            payments,
            Arc::clone(&h.cache),
            Pricing::default(),
            Some("rzp_test".to_string()),
        )
    }

    fn to_payment(flow: &mut CheckoutFlow, mode: PaymentMode) {
        flow.begin().unwrap();
        flow.select_address(address()).unwrap();
        flow.proceed_to_payment().unwrap();
        flow.choose_payment(mode).unwrap();
    }

    #[tokio::test]
    async fn test_begin_rejects_empty_cart() {
        let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
        let mut flow = flow(&h, Arc::default());
        assert!(matches!(flow.begin(), Err(CheckoutError::EmptyCart)));
        assert_eq!(flow.step(), CheckoutStep::CartReview);
    }

    #[tokio::test]
    async fn test_cannot_leave_address_selection_without_address() {
        let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
        h.store.add_item(&product("p1", 500), None);
        let mut flow = flow(&h, Arc::default());

        flow.begin().unwrap();
        assert!(matches!(
            flow.proceed_to_payment(),
            Err(CheckoutError::AddressRequired)
        ));
        assert_eq!(flow.step(), CheckoutStep::AddressSelection);
    }

    #[tokio::test]
    async fn test_out_of_order_calls_are_rejected() {
        let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
        h.store.add_item(&product("p1", 500), None);
        let mut flow = flow(&h, Arc::default());

        assert!(matches!(
            flow.choose_payment(PaymentMode::Upi),
            Err(CheckoutError::InvalidTransition { .. })
        ));
        assert!(matches!(
            flow.confirm_cash_on_delivery().await,
            Err(CheckoutError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_cash_on_delivery_places_pending_order_and_clears_cart() {
        let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
        h.store.add_item(&product("p1", 1200), None);
        let payments = Arc::new(FakePayments::default());
        let mut flow = flow(&h, Arc::clone(&payments));

        to_payment(&mut flow, PaymentMode::CashOnDelivery);
        assert_eq!(flow.step(), CheckoutStep::CashOnDeliveryConfirm);
        assert_eq!(flow.amount().total, Money::from_major(1220));
        let receipt = flow.confirm_cash_on_delivery().await.unwrap();

        assert_eq!(receipt.status, OrderStatus::Pending);
        assert!(receipt.order_reference.starts_with("COD_"));
        assert_eq!(receipt.amount, Money::from_major(1220));
        assert_eq!(flow.step(), CheckoutStep::OrderConfirmed);
        assert!(h.store.cart().is_empty());
        assert_eq!(h.cache.get_raw(keys::SHIPPING_ADDRESS).unwrap(), None);

        let requests = payments.requests.lock().unwrap();
        assert_eq!(requests[0].razorpay_payment_id, COD_PAYMENT_ID);
        assert_eq!(requests[0].razorpay_signature, COD_SIGNATURE);
        assert_eq!(requests[0].status.as_deref(), Some("Pending"));
        assert_eq!(
            requests[0].address,
            "12 MG Road, Indore, Madhya Pradesh - 452001"
        );
        assert_eq!(requests[0].email, "asha@shop.in");
        assert_eq!(requests[0].amount, Money::from_major(1220));
    }

    #[tokio::test]
    async fn test_gateway_payment_verifies_and_confirms() {
        let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
        h.store.add_item(&product("p1", 500), None);
        let payments = Arc::new(FakePayments::default());
        let mut flow = flow(&h, Arc::clone(&payments));
        to_payment(&mut flow, PaymentMode::Upi);
        assert_eq!(flow.amount().subtotal, Money::from_major(500));
        assert_eq!(flow.amount().total, Money::from_major(520));

        let gateway = ScriptedGateway(GatewayOutcome::Authorized {
            order_id: "order_abc".to_string(),
            payment_id: "pay_123".to_string(),
            signature: "sig".to_string(),
        });
        let PaymentResult::Confirmed(receipt) = flow.pay(&gateway).await.unwrap() else {
            panic!("expected a confirmed order");
        };

        assert_eq!(receipt.status, OrderStatus::Paid);
        assert_eq!(receipt.amount, Money::from_major(520));
        assert_eq!(receipt.items[0].image, "uploads/p1.jpg");
        assert!(h.store.cart().is_empty());
        let requests = payments.requests.lock().unwrap();
        assert_eq!(requests[0].status, None);
        assert_eq!(requests[0].amount, Money::from_major(520));
    }

    #[tokio::test]
    async fn test_dismissed_gateway_returns_to_method_selection() {
        let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
        h.store.add_item(&product("p1", 500), None);
        let payments = Arc::new(FakePayments::default());
        let mut flow = flow(&h, Arc::clone(&payments));
        to_payment(&mut flow, PaymentMode::Card);

        let result = flow
            .pay(&ScriptedGateway(GatewayOutcome::Dismissed))
            .await
            .unwrap();

        assert_eq!(result, PaymentResult::Dismissed);
        assert_eq!(flow.step(), CheckoutStep::PaymentMethodSelection);
        assert_eq!(h.store.cart().len(), 1);
        assert!(payments.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_verification_holds_checkout() {
        let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
        h.store.add_item(&product("p1", 500), None);
        let mut notices = h.notifier.subscribe();
        let payments = Arc::new(FakePayments {
            reject: true,
            ..FakePayments::default()
        });
        let mut flow = flow(&h, payments);
        to_payment(&mut flow, PaymentMode::Upi);

        let gateway = ScriptedGateway(GatewayOutcome::Authorized {
            order_id: "order_abc".to_string(),
            payment_id: "pay_123".to_string(),
            signature: "forged".to_string(),
        });
        let err = flow.pay(&gateway).await.unwrap_err();

        assert!(matches!(err, CheckoutError::VerificationRejected));
        assert_eq!(flow.step(), CheckoutStep::PaymentMethodSelection);
        assert_eq!(h.store.cart().len(), 1);
        assert!(
            drain(&mut notices)
                .iter()
                .any(|n| n.message == "Verification failed!")
        );
    }

    #[tokio::test]
    async fn test_gateway_order_failure_surfaces_server_message() {
        let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
        h.store.add_item(&product("p1", 500), None);
        let mut notices = h.notifier.subscribe();
        let payments = Arc::new(FakePayments {
            fail_order: true,
            ..FakePayments::default()
        });
        let mut flow = flow(&h, payments);
        to_payment(&mut flow, PaymentMode::Upi);

        let err = flow
            .pay(&ScriptedGateway(GatewayOutcome::Dismissed))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Remote(_)));
        assert!(
            drain(&mut notices)
                .iter()
                .any(|n| n.message == "Amount too low")
        );
    }

    #[tokio::test]
    async fn test_signed_out_checkout_requires_auth() {
        let h = Harness::signed_out(FakeRemote::new());
        h.store.add_item(&product("p1", 500), None);
        let mut flow = flow(&h, Arc::default());
        to_payment(&mut flow, PaymentMode::CashOnDelivery);

        assert!(matches!(
            flow.confirm_cash_on_delivery().await,
            Err(CheckoutError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_saved_address_is_restored() {
        let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
        h.cache.set(keys::SHIPPING_ADDRESS, &address()).unwrap();
        let flow = flow(&h, Arc::default());
        assert_eq!(flow.address().unwrap().city, "Indore");
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_stages_wait_between_steps() {
        let start = tokio::time::Instant::now();
        let mut stages = Vec::new();
        ConfirmationTimings::default()
            .play(|stage| stages.push((stage, start.elapsed())))
            .await;
        assert_eq!(
            stages,
            vec![
                (ConfirmationStage::PaymentVerified, Duration::ZERO),
                (ConfirmationStage::SendingConfirmation, Duration::from_millis(2000)),
                (ConfirmationStage::Success, Duration::from_millis(5000)),
                (ConfirmationStage::ReturnToCatalog, Duration::from_millis(7500)),
            ]
        );
    }

    #[tokio::test]
    async fn test_immediate_confirmation_plays_every_stage() {
        let mut stages = Vec::new();
        ConfirmationTimings::immediate()
            .play(|stage| stages.push(stage))
            .await;
        assert_eq!(stages.len(), 4);
        assert_eq!(stages.last(), Some(&ConfirmationStage::ReturnToCatalog));
    }

    #[test]
    fn test_parse_confirmation_delays() {
        assert_eq!(
            ConfirmationTimings::parse_millis("2000, 3000,2500").unwrap(),
            ConfirmationTimings::default()
        );
        assert_eq!(
            ConfirmationTimings::parse_millis("0,0,0").unwrap(),
            ConfirmationTimings::immediate()
        );
        assert!(ConfirmationTimings::parse_millis("2000,3000").is_err());
        assert!(ConfirmationTimings::parse_millis("2s,3s,1s").is_err());
    }
}
