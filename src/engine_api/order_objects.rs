use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Cents, NewOrder, NewOrderLine, OrderStatus, PaymentMethod};

/// One entry of a raw cart as submitted by a client. For menu products, `selections` maps each
/// slot id of the menu to the chosen option product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    pub quantity: i64,
    #[serde(default)]
    pub selections: HashMap<i64, i64>,
}

impl CartItem {
    pub fn simple(product_id: i64, quantity: i64) -> Self {
        Self { product_id, quantity, selections: HashMap::new() }
    }

    pub fn menu(product_id: i64, quantity: i64, selections: HashMap<i64, i64>) -> Self {
        Self { product_id, quantity, selections }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub customer_id: Option<String>,
    pub contact_email: Option<String>,
}

/// The output of cart expansion, ready to be persisted.
#[derive(Debug, Clone)]
pub struct PreparedCheckout {
    pub order: NewOrder,
    pub lines: Vec<NewOrderLine>,
}

/// What a client gets back from placing an order. Serialized into the idempotency store, so a
/// replayed request returns the identical body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutPreparation {
    pub order_id: i64,
    pub total: Cents,
    pub lines: Vec<PreparedLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedLine {
    pub line_id: i64,
    pub product_id: i64,
    pub title: String,
    pub unit_price: Cents,
    pub quantity: i64,
    pub menu_slot_name: Option<String>,
}

/// An interactive payment instruction for a pending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentRequest {
    Cash { amount_received: Cents },
    Card { processor: String, transaction_ref: String },
    GratisGuest,
    GratisVip,
    GratisStaff,
    GratisClub { member_id: String, member_name: String, quantity: i64 },
}

impl PaymentRequest {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentRequest::Cash { .. } => PaymentMethod::Cash,
            PaymentRequest::Card { .. } => PaymentMethod::Card,
            PaymentRequest::GratisGuest => PaymentMethod::GratisGuest,
            PaymentRequest::GratisVip => PaymentMethod::GratisVip,
            PaymentRequest::GratisStaff => PaymentMethod::GratisStaff,
            PaymentRequest::GratisClub { .. } => PaymentMethod::GratisClub,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub order_id: i64,
    pub status: OrderStatus,
    pub method: PaymentMethod,
    /// Change due for cash payments, zero otherwise.
    pub change: Cents,
    /// Products that went negative during deduction. Only ever non-empty on the webhook path.
    pub oversold: Vec<i64>,
}

/// The redirect hand-off for a wallet payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletCheckout {
    pub order_id: i64,
    pub gateway_ref: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemedItem {
    pub line_id: i64,
    pub product_id: i64,
    pub title: String,
    pub quantity: i64,
}

/// The result of a station redemption pass over an order. `matched` counts every stock-carrying
/// line the station was eligible for, redeemed or not; `redeemed` counts how many of those this
/// call actually claimed. `matched > 0, redeemed == 0` reads as "already handled", while
/// `matched == 0` means the order holds nothing for this station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemResult {
    pub order_id: i64,
    pub device_id: i64,
    pub matched: usize,
    pub redeemed: usize,
    pub items: Vec<RedeemedItem>,
    pub redeemed_at: DateTime<Utc>,
}

/// Club loyalty configuration: which products members may claim for free, and how many
/// redemptions each member gets in total.
#[derive(Debug, Clone, Default)]
pub struct ClubSettings {
    pub free_product_ids: HashSet<i64>,
    pub max_redemptions_per_member: i64,
}

impl ClubSettings {
    pub fn new(free_product_ids: HashSet<i64>, max_redemptions_per_member: i64) -> Self {
        Self { free_product_ids, max_redemptions_per_member }
    }
}
