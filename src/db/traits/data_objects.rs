use crate::db_types::{Order, OrderLine, StockLevel};

/// The outcome of a committed `pending -> paid` or `paid -> refunded` transition: the updated
/// order, the lines that carried stock, and the post-commit stock level of every touched product.
/// `oversold` lists products whose stock went negative in this transaction.
#[derive(Debug, Clone)]
pub struct PaidOrderSummary {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub stock_changes: Vec<StockLevel>,
    pub oversold: Vec<i64>,
}
