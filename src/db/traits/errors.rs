use thiserror::Error;

use crate::db_types::OrderStatus;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database driver error: {0}")]
    Driver(#[from] sqlx::Error),
    #[error("Order {0} not found")]
    OrderNotFound(i64),
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidStatusTransition { order_id: i64, from: OrderStatus, to: OrderStatus },
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: i64, requested: i64, available: i64 },
}
