use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatus, PaymentMethod};

/// Fired after an order commits the pending → paid transition and its sale entries have
/// landed in the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub method: PaymentMethod,
    /// Products this payment drove into negative stock. Empty on the interactive paths.
    pub oversold: Vec<i64>,
}

impl OrderPaidEvent {
    pub fn new(order: Order, method: PaymentMethod, oversold: Vec<i64>) -> Self {
        Self { order, method, oversold }
    }
}

/// Fired when an order leaves the live set, either cancelled before payment or refunded after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatus,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}
