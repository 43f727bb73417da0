use thiserror::Error;

use crate::{
    db::traits::StorageError,
    db_types::{Cents, OrderStatus},
    gateway::GatewayError,
};

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("The cart is empty")]
    EmptyCart,
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: i64, quantity: i64 },
    #[error("Product {0} does not exist")]
    UnknownProduct(i64),
    #[error("Product {0} is not available for ordering")]
    InactiveProduct(i64),
    #[error("Menu {menu_product_id} requires a selection for slot '{slot_name}'")]
    MissingSlotSelection { menu_product_id: i64, slot_id: i64, slot_name: String },
    #[error("Slot {slot_id} does not belong to menu {menu_product_id}")]
    SlotNotOnMenu { menu_product_id: i64, slot_id: i64 },
    #[error("Product {option_product_id} is not an eligible option for slot {slot_id}")]
    OptionNotEligible { slot_id: i64, option_product_id: i64 },
    #[error("Not enough stock of product {product_id}: wanted {requested}, have {available}")]
    InsufficientStock { product_id: i64, requested: i64, available: i64 },
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for CheckoutError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InsufficientStock { product_id, requested, available } => {
                Self::InsufficientStock { product_id, requested, available }
            },
            other => Self::Storage(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("No order is linked to gateway reference '{0}'")]
    GatewayRefNotFound(String),
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: i64, from: OrderStatus, to: OrderStatus },
    #[error("Idempotency key reused with a different request body")]
    IdempotencyKeyReuse,
    #[error("Not enough stock of product {product_id}: wanted {requested}, have {available}")]
    Oversold { product_id: i64, requested: i64, available: i64 },
    #[error("Cash received ({received}) is less than the order total ({total})")]
    CashShort { received: Cents, total: Cents },
    #[error("Product {0} is not part of the club free-product allowance")]
    ProductNotInClubAllowance(i64),
    #[error("Member {member_id} has {remaining} free redemptions left but asked for {requested}")]
    ClubAllowanceExhausted { member_id: String, remaining: i64, requested: i64 },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("A cached response could not be decoded: {0}")]
    BadCachedResponse(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for OrderFlowError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OrderNotFound(id) => Self::OrderNotFound(id),
            StorageError::InvalidStatusTransition { order_id, from, to } => {
                Self::InvalidTransition { order_id, from, to }
            },
            StorageError::InsufficientStock { product_id, requested, available } => {
                Self::Oversold { product_id, requested, available }
            },
            other => Self::Storage(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum RedemptionError {
    #[error("Device {0} is not registered")]
    DeviceNotFound(i64),
    #[error("Device {0} has not been approved")]
    DeviceNotApproved(i64),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Order {order_id} is {status} and cannot be redeemed")]
    OrderNotRedeemable { order_id: i64, status: OrderStatus },
    #[error("A cached response could not be decoded: {0}")]
    BadCachedResponse(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for RedemptionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OrderNotFound(id) => Self::OrderNotFound(id),
            other => Self::Storage(other.to_string()),
        }
    }
}
