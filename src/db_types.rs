use std::{
    fmt::Display,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::op;

//--------------------------------------       Cents         ---------------------------------------------------------
/// A monetary amount in integer minor-currency units. All prices and totals in the engine are
/// represented as `Cents`; floating point never enters the money path.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Cents(i64);

op!(binary Cents, Add, add);
op!(binary Cents, Sub, sub);
op!(inplace Cents, AddAssign, add_assign);
op!(inplace Cents, SubAssign, sub_assign);
op!(unary Cents, Neg, neg);

impl Mul<i64> for Cents {
    type Output = Cents;

    fn mul(self, rhs: i64) -> Self::Output {
        Cents(self.0 * rhs)
    }
}

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 / 100;
        let minor = (self.0 % 100).abs();
        write!(f, "{units}.{minor:02}")
    }
}

impl Cents {
    pub fn value(&self) -> i64 {
        self.0
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(pub &'static str, pub String);

/// Implements `Display`, `FromStr` and `From<String>` for a fieldless enum so it can round-trip
/// through TEXT columns and log lines with the same spelling the database uses.
macro_rules! text_enum {
    ($name:ident, $($variant:ident => $text:literal),+ $(,)?) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($name::$variant => write!(f, $text)),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    s => Err(ConversionError(stringify!($name), s.to_string())),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                value.parse().unwrap_or_else(|e| {
                    log::error!("{e}. This conversion cannot fail, so check the database contents.");
                    Self::default()
                })
            }
        }
    };
}

//--------------------------------------     ProductType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    /// A plain product sold as-is.
    #[default]
    Simple,
    /// A flat-priced bundle with configurable slots.
    Menu,
}

text_enum!(ProductType, Simple => "simple", Menu => "menu");

//--------------------------------------     OrderStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// The order has been created and no payment has been received.
    #[default]
    Pending,
    /// Payment has been received in full. Inventory has been deducted.
    Paid,
    /// The order was cancelled before payment. No inventory was ever deducted.
    Cancelled,
    /// A paid order has been refunded and its inventory restored.
    Refunded,
}

text_enum!(OrderStatus, Pending => "pending", Paid => "paid", Cancelled => "cancelled", Refunded => "refunded");

//--------------------------------------     OrderOrigin     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderOrigin {
    /// Self-service web shop.
    #[default]
    Shop,
    /// Staff-operated point of sale.
    Pos,
}

text_enum!(OrderOrigin, Shop => "shop", Pos => "pos");

//--------------------------------------       LineType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    /// A plain product line, priced at product price × quantity.
    #[default]
    Simple,
    /// A menu bundle line, priced at the menu's own flat price.
    Bundle,
    /// A zero-priced child of a bundle line representing one slot's selected option.
    Component,
}

text_enum!(LineType, Simple => "simple", Bundle => "bundle", Component => "component");

//--------------------------------------    LedgerReason     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Initial stock load for a product.
    OpeningBalance,
    /// Deduction at the moment an order is paid.
    Sale,
    /// Compensating entry when a paid order is refunded.
    Refund,
    /// Compensating entry when previously deducted stock is released.
    Cancellation,
    /// Operator stock adjustment.
    #[default]
    ManualAdjust,
    /// Reconciliation of a discrepancy (e.g. an oversold race).
    Correction,
}

text_enum!(
    LedgerReason,
    OpeningBalance => "opening_balance",
    Sale => "sale",
    Refund => "refund",
    Cancellation => "cancellation",
    ManualAdjust => "manual_adjust",
    Correction => "correction",
);

//--------------------------------------   PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    /// Redirect-based external wallet; confirmed asynchronously by webhook.
    Wallet,
    GratisGuest,
    GratisVip,
    GratisStaff,
    /// Zero-cost payment against a loyalty member's free-product allowance.
    GratisClub,
}

text_enum!(
    PaymentMethod,
    Cash => "cash",
    Card => "card",
    Wallet => "wallet",
    GratisGuest => "gratis_guest",
    GratisVip => "gratis_vip",
    GratisStaff => "gratis_staff",
    GratisClub => "gratis_club",
);

//--------------------------------------   Device enums      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Pos,
    Station,
}

text_enum!(DeviceType, Pos => "pos", Station => "station");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Revoked,
}

text_enum!(DeviceStatus, Pending => "pending", Approved => "approved", Rejected => "rejected", Revoked => "revoked");

//--------------------------------------      Product        ---------------------------------------------------------
/// Catalog read model. Products are maintained by the upstream catalog CRUD; the engine only
/// reads them, and copies name and price onto order lines at checkout time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Cents,
    pub product_type: ProductType,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      MenuSlot       ---------------------------------------------------------
/// One named choice-group on a menu product. Slots are ordered by `position`.
#[derive(Debug, Clone, FromRow)]
pub struct MenuSlot {
    pub id: i64,
    pub menu_product_id: i64,
    pub name: String,
    pub position: i64,
}

/// A slot together with the product ids eligible as its option.
#[derive(Debug, Clone)]
pub struct MenuSlotDef {
    pub slot: MenuSlot,
    pub option_product_ids: Vec<i64>,
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Reference to the customer, if one is signed in.
    pub customer_id: Option<String>,
    /// Contact email for order notifications.
    pub contact_email: Option<String>,
    /// The order total. Always the sum of top-level line `quantity × unit_price`.
    pub total: Cents,
    pub origin: OrderOrigin,
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer_id: Option<String>,
    pub contact_email: Option<String>,
    pub total: Cents,
    pub status: OrderStatus,
    pub origin: OrderOrigin,
    pub payment_method: Option<PaymentMethod>,
    /// Reference id returned by the external payment gateway, if a wallet payment was started.
    pub gateway_ref: Option<String>,
    /// Transaction reference reported by the gateway webhook on confirmation.
    pub gateway_tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    NewOrderLine     ---------------------------------------------------------
/// An order line before persistence. Component lines reference their parent bundle by index into
/// the draft line vector; the storage layer resolves indices to row ids on insert.
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub line_type: LineType,
    pub product_id: i64,
    /// Product name snapshot at order time.
    pub title: String,
    /// Price snapshot at order time. Zero for component lines.
    pub unit_price: Cents,
    pub quantity: i64,
    pub parent_index: Option<usize>,
    pub menu_slot_id: Option<i64>,
    /// Slot name snapshot, kept for display after slot definitions change.
    pub menu_slot_name: Option<String>,
}

impl NewOrderLine {
    pub fn simple(product: &Product, quantity: i64) -> Self {
        Self {
            line_type: LineType::Simple,
            product_id: product.id,
            title: product.name.clone(),
            unit_price: product.price,
            quantity,
            parent_index: None,
            menu_slot_id: None,
            menu_slot_name: None,
        }
    }

    /// The priced umbrella line of a menu. Carries no stock itself.
    pub fn bundle(menu: &Product, quantity: i64) -> Self {
        Self {
            line_type: LineType::Bundle,
            product_id: menu.id,
            title: menu.name.clone(),
            unit_price: menu.price,
            quantity,
            parent_index: None,
            menu_slot_id: None,
            menu_slot_name: None,
        }
    }

    /// A zero-priced slot choice under a bundle line.
    pub fn component(option: &Product, quantity: i64, parent_index: usize, slot: &MenuSlot) -> Self {
        Self {
            line_type: LineType::Component,
            product_id: option.id,
            title: option.name.clone(),
            unit_price: Cents::default(),
            quantity,
            parent_index: Some(parent_index),
            menu_slot_id: Some(slot.id),
            menu_slot_name: Some(slot.name.clone()),
        }
    }

    /// Simple and component lines carry stock; bundle lines are flat-priced wrappers.
    pub fn carries_stock(&self) -> bool {
        matches!(self.line_type, LineType::Simple | LineType::Component)
    }
}

//--------------------------------------     OrderLine       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub line_type: LineType,
    pub product_id: i64,
    pub title: String,
    pub unit_price: Cents,
    pub quantity: i64,
    pub parent_line_id: Option<i64>,
    pub menu_slot_id: Option<i64>,
    pub menu_slot_name: Option<String>,
    /// Set when a redemption row exists for this line.
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OrderLine {
    /// Simple and component lines carry stock; bundle lines are flat-priced wrappers.
    pub fn carries_stock(&self) -> bool {
        matches!(self.line_type, LineType::Simple | LineType::Component)
    }
}

//--------------------------------------  NewLedgerEntry     ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub product_id: i64,
    /// Signed stock change. Negative for sales, positive for refunds and restocks.
    pub delta: i64,
    pub reason: LedgerReason,
    pub order_id: Option<i64>,
    pub order_line_id: Option<i64>,
    pub device_id: Option<i64>,
    pub created_by: Option<String>,
}

impl NewLedgerEntry {
    pub fn new(product_id: i64, delta: i64, reason: LedgerReason) -> Self {
        Self { product_id, delta, reason, order_id: None, order_line_id: None, device_id: None, created_by: None }
    }

    pub fn for_order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn for_line(mut self, line_id: i64) -> Self {
        self.order_line_id = Some(line_id);
        self
    }
}

//--------------------------------------    LedgerEntry      ---------------------------------------------------------
/// One immutable signed stock-change record. Entries are append-only; current stock for a product
/// is always the sum of its deltas, never a stored counter.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub product_id: i64,
    pub delta: i64,
    pub reason: LedgerReason,
    pub order_id: Option<i64>,
    pub order_line_id: Option<i64>,
    pub device_id: Option<i64>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     StockLevel      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, FromRow, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: i64,
    pub stock: i64,
}

//-------------------------------------- IdempotencyRecord ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub id: i64,
    pub scope: String,
    pub key: String,
    /// Hash of the canonical request body, used to reject key reuse with a different payload.
    pub fingerprint: String,
    /// The cached response, stored as JSON text and returned verbatim on replay.
    pub response: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------       Device        ---------------------------------------------------------
/// A paired POS or station device. The engine consumes devices only to answer "which order lines
/// can this device redeem"; pairing and approval happen upstream.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub device_type: DeviceType,
    pub status: DeviceStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;

    fn product(id: i64, product_type: ProductType) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            price: Cents::from(1000),
            product_type,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn only_simple_and_component_lines_carry_stock() {
        let menu = product(1, ProductType::Menu);
        let option = product(2, ProductType::Simple);
        let slot = MenuSlot { id: 7, menu_product_id: 1, name: "Main".into(), position: 1 };
        assert!(NewOrderLine::simple(&option, 1).carries_stock());
        assert!(NewOrderLine::component(&option, 1, 0, &slot).carries_stock());
        assert!(!NewOrderLine::bundle(&menu, 1).carries_stock());
    }
}
