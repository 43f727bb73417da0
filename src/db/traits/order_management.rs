use crate::{
    db::traits::StorageError,
    db_types::{Order, OrderLine, OrderOrigin, OrderStatus},
};

#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn order_by_id(&self, order_id: i64) -> Result<Option<Order>, StorageError>;

    /// All lines of an order in insertion order, with redemption timestamps attached.
    async fn lines_for_order(&self, order_id: i64) -> Result<Vec<OrderLine>, StorageError>;

    /// Fetches orders according to criteria specified in the `OrderQueryFilter`, ordered by
    /// creation time ascending.
    async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, StorageError>;
}

#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub(crate) customer_id: Option<String>,
    pub(crate) origin: Option<OrderOrigin>,
    pub(crate) statuses: Vec<OrderStatus>,
}

impl OrderQueryFilter {
    pub fn with_customer_id(mut self, customer_id: String) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_origin(mut self, origin: OrderOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() && self.origin.is_none() && self.statuses.is_empty()
    }
}
