use crate::{
    db::traits::{data_objects::PaidOrderSummary, StorageError},
    db_types::{NewOrder, NewOrderLine, Order, OrderLine, PaymentMethod},
};

/// This trait defines the highest level of behaviour for backends supporting the fulfillment
/// engine.
///
/// This behaviour includes:
/// * Atomic creation of an order together with its lines.
/// * The order status state machine, with conditional updates as the serialization gate so that
///   two concurrent transitions on the same order have exactly one winner.
/// * The authoritative inventory deduction at the `pending -> paid` transition, and the
///   compensating entries on refund.
#[allow(async_fn_in_trait)]
pub trait FulfillmentDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Persists the order and all of its lines in a single atomic transaction. Component lines
    /// reference their parent bundle by index into `lines`; the backend resolves indices to the
    /// row ids it assigns. No inventory is deducted here.
    async fn insert_order_with_lines(
        &self,
        order: NewOrder,
        lines: Vec<NewOrderLine>,
    ) -> Result<(Order, Vec<OrderLine>), StorageError>;

    /// Deletes a still-`pending` order and its lines. Used to discard the loser of an
    /// idempotency-key race; pending orders have no ledger entries, so no compensation is
    /// needed. Returns `false` if the order was not found or no longer pending.
    async fn discard_pending_order(&self, order_id: i64) -> Result<bool, StorageError>;

    /// Transitions an order from `pending` to `paid` and, in the same transaction, appends one
    /// negative `sale` ledger entry per stock-carrying line. Stock is re-validated against the
    /// ledger inside the transaction: when `allow_oversell` is false the whole transaction fails
    /// with [`StorageError::InsufficientStock`], leaving the order `pending`; when true (webhook
    /// confirmations, where funds have already moved) the deduction proceeds and products driven
    /// negative are reported in the summary.
    ///
    /// Any status other than `pending` fails with [`StorageError::InvalidStatusTransition`] and
    /// changes nothing.
    async fn mark_order_paid(
        &self,
        order_id: i64,
        method: PaymentMethod,
        gateway_tx_ref: Option<&str>,
        allow_oversell: bool,
    ) -> Result<PaidOrderSummary, StorageError>;

    /// Transitions an order from `pending` to `cancelled`. No ledger entries are written because
    /// none were ever deducted for a pending order.
    async fn cancel_pending_order(&self, order_id: i64) -> Result<Order, StorageError>;

    /// Transitions an order from `paid` to `refunded` and, in the same transaction, appends one
    /// positive `refund` ledger entry per previously deducted line, restoring pre-sale stock.
    async fn refund_paid_order(&self, order_id: i64) -> Result<PaidOrderSummary, StorageError>;

    /// Stores the external gateway reference on a pending order after a wallet checkout has been
    /// created.
    async fn set_gateway_ref(&self, order_id: i64, gateway_ref: &str) -> Result<(), StorageError>;

    /// Looks up the order a gateway webhook refers to.
    async fn order_by_gateway_ref(&self, gateway_ref: &str) -> Result<Option<Order>, StorageError>;

    /// Fills in the contact email reported by the gateway, without overwriting one the customer
    /// supplied at checkout.
    async fn merge_contact_email(&self, order_id: i64, email: &str) -> Result<(), StorageError>;

    /// Records a loyalty-club free-product redemption counted against the member's allowance.
    async fn record_club_redemption(
        &self,
        member_id: &str,
        member_name: &str,
        order_id: i64,
        quantity: i64,
    ) -> Result<(), StorageError>;

    /// Total quantity this member has already redeemed.
    async fn club_redemption_total(&self, member_id: &str) -> Result<i64, StorageError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
