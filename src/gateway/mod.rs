//! Payment gateway contract.
//!
//! Wallet payments are collected by an external hosted-checkout provider. The engine only needs
//! two touch points: creating a checkout session (which yields a redirect URL for the customer)
//! and ingesting the asynchronous webhook notice once the provider settles the transaction.
//! The concrete HTTP client lives outside this crate; tests use a stub.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::Cents;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("No payment gateway has been configured")]
    NotConfigured,
    #[error("The payment gateway did not respond in time")]
    Timeout,
    #[error("The payment gateway rejected the request: {0}")]
    Rejected(String),
    #[error("Could not reach the payment gateway: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLineItem {
    pub title: String,
    pub unit_price: Cents,
    pub quantity: i64,
}

/// Where the provider sends the customer back after the hosted checkout concludes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub failed_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    pub order_id: i64,
    pub amount: Cents,
    pub currency: String,
    pub purpose: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub failed_url: String,
    pub cancel_url: String,
    pub line_items: Vec<CheckoutLineItem>,
}

/// A checkout session created at the provider. `gateway_ref` is the provider's identifier for
/// the session and is what the webhook notice will carry back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCheckout {
    pub gateway_ref: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayTxStatus {
    Confirmed,
    Failed,
    Cancelled,
}

/// The payload of a settled-transaction webhook, already authenticated and decoded by the
/// transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotice {
    pub gateway_ref: String,
    pub transaction_ref: String,
    pub status: GatewayTxStatus,
    pub payer_email: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait PaymentGatewayClient: Send + Sync {
    async fn create_checkout(&self, request: CreateCheckoutRequest) -> Result<GatewayCheckout, GatewayError>;
}
