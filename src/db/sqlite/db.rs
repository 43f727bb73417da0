use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use chrono::Duration;
use log::*;
use sqlx::SqlitePool;

use super::{club, db_url, devices, idempotency, inventory, new_pool, orders, products, redemptions};
use crate::{
    db::traits::{
        CatalogManagement,
        FulfillmentDatabase,
        IdempotencyManagement,
        InventoryManagement,
        OrderManagement,
        OrderQueryFilter,
        PaidOrderSummary,
        RedemptionManagement,
        StorageError,
    },
    db_types::{
        Cents,
        Device,
        DeviceStatus,
        DeviceType,
        IdempotencyRecord,
        LedgerEntry,
        LedgerReason,
        MenuSlotDef,
        NewLedgerEntry,
        NewOrder,
        NewOrderLine,
        Order,
        OrderLine,
        OrderStatus,
        PaymentMethod,
        Product,
        ProductType,
        StockLevel,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, StorageError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -- Catalog and device maintenance. These record the output of the upstream admin CRUD and
    // -- pairing flows; the engine itself only reads these tables.

    pub async fn add_product(
        &self,
        name: &str,
        price: Cents,
        product_type: ProductType,
        active: bool,
    ) -> Result<i64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        products::insert_product(name, price, product_type, active, &mut conn).await
    }

    pub async fn add_menu_slot(&self, menu_product_id: i64, name: &str, position: i64) -> Result<i64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        products::insert_menu_slot(menu_product_id, name, position, &mut conn).await
    }

    pub async fn add_slot_option(&self, slot_id: i64, option_product_id: i64) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        products::insert_slot_option(slot_id, option_product_id, &mut conn).await
    }

    pub async fn add_device(&self, name: &str, device_type: DeviceType, status: DeviceStatus) -> Result<i64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        devices::insert_device(name, device_type, status, &mut conn).await
    }

    pub async fn set_device_status(&self, device_id: i64, status: DeviceStatus) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        devices::set_device_status(device_id, status, &mut conn).await
    }

    pub async fn assign_product_to_device(&self, device_id: i64, product_id: i64) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        devices::assign_product(device_id, product_id, &mut conn).await
    }

    /// Sums the required quantity per product over the stock-carrying lines of an order.
    fn required_quantities(lines: &[OrderLine]) -> HashMap<i64, i64> {
        let mut required: HashMap<i64, i64> = HashMap::new();
        for line in lines.iter().filter(|l| l.carries_stock()) {
            *required.entry(line.product_id).or_insert(0) += line.quantity;
        }
        required
    }
}

impl FulfillmentDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order_with_lines(
        &self,
        order: NewOrder,
        lines: Vec<NewOrderLine>,
    ) -> Result<(Order, Vec<OrderLine>), StorageError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(&order, &mut tx).await?;
        let lines = orders::insert_lines(order.id, &lines, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order #{} has been saved with {} lines", order.id, lines.len());
        Ok((order, lines))
    }

    async fn discard_pending_order(&self, order_id: i64) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;
        let discarded = orders::delete_pending_order(order_id, &mut tx).await?;
        tx.commit().await?;
        if discarded {
            debug!("🗃️ Pending order #{order_id} discarded");
        }
        Ok(discarded)
    }

    async fn mark_order_paid(
        &self,
        order_id: i64,
        method: PaymentMethod,
        gateway_tx_ref: Option<&str>,
        allow_oversell: bool,
    ) -> Result<PaidOrderSummary, StorageError> {
        let mut tx = self.pool.begin().await?;
        // The conditional update is the gate; of two concurrent pay attempts only one passes.
        // It is also deliberately the first statement of the transaction, so concurrent writers
        // queue on the write lock instead of deadlocking on a read-to-write upgrade.
        if !orders::mark_paid(order_id, method, gateway_tx_ref, &mut tx).await? {
            let order =
                orders::fetch_order_by_id(order_id, &mut tx).await?.ok_or(StorageError::OrderNotFound(order_id))?;
            return Err(StorageError::InvalidStatusTransition {
                order_id,
                from: order.status,
                to: OrderStatus::Paid,
            });
        }
        let lines = orders::fetch_lines_for_order(order_id, &mut tx).await?;
        let required = Self::required_quantities(&lines);
        let product_ids: Vec<i64> = required.keys().copied().collect();
        let available = inventory::current_stock_batch(&product_ids, &mut tx).await?;
        if !allow_oversell {
            for (product_id, requested) in &required {
                let available = available.get(product_id).copied().unwrap_or(0);
                if available < *requested {
                    // Dropping the transaction rolls the status update back.
                    return Err(StorageError::InsufficientStock {
                        product_id: *product_id,
                        requested: *requested,
                        available,
                    });
                }
            }
        }
        for line in lines.iter().filter(|l| l.carries_stock()) {
            let entry = NewLedgerEntry::new(line.product_id, -line.quantity, LedgerReason::Sale)
                .for_order(order_id)
                .for_line(line.id);
            inventory::insert_entry(&entry, &mut tx).await?;
        }
        let new_stock = inventory::current_stock_batch(&product_ids, &mut tx).await?;
        let order =
            orders::fetch_order_by_id(order_id, &mut tx).await?.ok_or(StorageError::OrderNotFound(order_id))?;
        tx.commit().await?;

        let stock_changes =
            new_stock.iter().map(|(&product_id, &stock)| StockLevel { product_id, stock }).collect();
        let oversold: Vec<i64> =
            new_stock.iter().filter(|(_, &stock)| stock < 0).map(|(&product_id, _)| product_id).collect();
        if !oversold.is_empty() {
            warn!(
                "🗃️ Order #{order_id} drove stock negative for products {oversold:?}. Manual reconciliation is \
                 required."
            );
        }
        debug!("🗃️ Order #{order_id} is paid ({method}). {} sale entries appended.", required.len());
        Ok(PaidOrderSummary { order, lines, stock_changes, oversold })
    }

    async fn cancel_pending_order(&self, order_id: i64) -> Result<Order, StorageError> {
        let mut tx = self.pool.begin().await?;
        if !orders::transition_status(order_id, OrderStatus::Pending, OrderStatus::Cancelled, &mut tx).await? {
            let order =
                orders::fetch_order_by_id(order_id, &mut tx).await?.ok_or(StorageError::OrderNotFound(order_id))?;
            return Err(StorageError::InvalidStatusTransition {
                order_id,
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }
        let order =
            orders::fetch_order_by_id(order_id, &mut tx).await?.ok_or(StorageError::OrderNotFound(order_id))?;
        tx.commit().await?;
        debug!("🗃️ Order #{order_id} cancelled. No stock was ever deducted for it.");
        Ok(order)
    }

    async fn refund_paid_order(&self, order_id: i64) -> Result<PaidOrderSummary, StorageError> {
        let mut tx = self.pool.begin().await?;
        if !orders::transition_status(order_id, OrderStatus::Paid, OrderStatus::Refunded, &mut tx).await? {
            let order =
                orders::fetch_order_by_id(order_id, &mut tx).await?.ok_or(StorageError::OrderNotFound(order_id))?;
            return Err(StorageError::InvalidStatusTransition {
                order_id,
                from: order.status,
                to: OrderStatus::Refunded,
            });
        }
        let lines = orders::fetch_lines_for_order(order_id, &mut tx).await?;
        for line in lines.iter().filter(|l| l.carries_stock()) {
            let entry = NewLedgerEntry::new(line.product_id, line.quantity, LedgerReason::Refund)
                .for_order(order_id)
                .for_line(line.id);
            inventory::insert_entry(&entry, &mut tx).await?;
        }
        let product_ids: Vec<i64> = Self::required_quantities(&lines).keys().copied().collect();
        let new_stock = inventory::current_stock_batch(&product_ids, &mut tx).await?;
        let order =
            orders::fetch_order_by_id(order_id, &mut tx).await?.ok_or(StorageError::OrderNotFound(order_id))?;
        tx.commit().await?;
        let stock_changes =
            new_stock.iter().map(|(&product_id, &stock)| StockLevel { product_id, stock }).collect();
        debug!("🗃️ Order #{order_id} refunded. Stock restored for {} products.", product_ids.len());
        Ok(PaidOrderSummary { order, lines, stock_changes, oversold: Vec::new() })
    }

    async fn set_gateway_ref(&self, order_id: i64, gateway_ref: &str) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::set_gateway_ref(order_id, gateway_ref, &mut conn).await
    }

    async fn order_by_gateway_ref(&self, gateway_ref: &str) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_gateway_ref(gateway_ref, &mut conn).await
    }

    async fn merge_contact_email(&self, order_id: i64, email: &str) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::merge_contact_email(order_id, email, &mut conn).await
    }

    async fn record_club_redemption(
        &self,
        member_id: &str,
        member_name: &str,
        order_id: i64,
        quantity: i64,
    ) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        let _ = club::insert_redemption(member_id, member_name, order_id, quantity, &mut conn).await?;
        Ok(())
    }

    async fn club_redemption_total(&self, member_id: &str) -> Result<i64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        club::total_for_member(member_id, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

impl InventoryManagement for SqliteDatabase {
    async fn record_delta(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StorageError> {
        let mut conn = self.pool.acquire().await?;
        inventory::insert_entry(&entry, &mut conn).await
    }

    async fn record_deltas(&self, entries: Vec<NewLedgerEntry>) -> Result<Vec<LedgerEntry>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut result = Vec::with_capacity(entries.len());
        for entry in &entries {
            result.push(inventory::insert_entry(entry, &mut tx).await?);
        }
        tx.commit().await?;
        Ok(result)
    }

    async fn current_stock(&self, product_id: i64) -> Result<i64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        inventory::current_stock(product_id, &mut conn).await
    }

    async fn current_stock_batch(&self, product_ids: &[i64]) -> Result<HashMap<i64, i64>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        inventory::current_stock_batch(product_ids, &mut conn).await
    }

    async fn stock_snapshot(&self) -> Result<Vec<StockLevel>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        inventory::stock_snapshot(&mut conn).await
    }

    async fn entries_for_product(
        &self,
        product_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        inventory::entries_for_product(product_id, limit, offset, &mut conn).await
    }
}

impl IdempotencyManagement for SqliteDatabase {
    async fn idempotency_get(&self, scope: &str, key: &str) -> Result<Option<IdempotencyRecord>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::fetch_record(scope, key, &mut conn).await
    }

    async fn idempotency_save_if_absent(
        &self,
        scope: &str,
        key: &str,
        fingerprint: &str,
        response: &str,
        ttl: Duration,
    ) -> Result<IdempotencyRecord, StorageError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::save_if_absent(scope, key, fingerprint, response, ttl, &mut conn).await
    }

    async fn idempotency_cleanup_expired(&self) -> Result<u64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::cleanup_expired(&mut conn).await
    }
}

impl RedemptionManagement for SqliteDatabase {
    async fn device_by_id(&self, device_id: i64) -> Result<Option<Device>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        devices::fetch_device(device_id, &mut conn).await
    }

    async fn product_ids_for_device(&self, device_id: i64) -> Result<HashSet<i64>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        devices::product_ids_for_device(device_id, &mut conn).await
    }

    async fn redeem_line(&self, order_line_id: i64, device_id: i64) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        redemptions::redeem_line(order_line_id, device_id, &mut conn).await
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn products_by_ids(&self, product_ids: &[i64]) -> Result<Vec<Product>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        products::fetch_products_by_ids(product_ids, &mut conn).await
    }

    async fn slots_for_menu(&self, menu_product_id: i64) -> Result<Vec<MenuSlotDef>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        products::fetch_slots_for_menu(menu_product_id, &mut conn).await
    }
}

impl OrderManagement for SqliteDatabase {
    async fn order_by_id(&self, order_id: i64) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_id(order_id, &mut conn).await
    }

    async fn lines_for_order(&self, order_id: i64) -> Result<Vec<OrderLine>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_lines_for_order(order_id, &mut conn).await
    }

    async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders(query, &mut conn).await
    }
}
