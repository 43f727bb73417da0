//! Ledger reads, manual corrections, and the live stock feed.

use std::{collections::HashMap, sync::Arc};

use log::*;

use crate::{
    db::traits::{InventoryManagement, StorageError},
    db_types::{LedgerEntry, LedgerReason, NewLedgerEntry, StockLevel},
    events::{InventoryHub, StockSubscription, StockUpdate},
};

pub struct InventoryApi<B> {
    db: B,
    hub: Arc<InventoryHub>,
}

impl<B> InventoryApi<B>
where B: InventoryManagement
{
    pub fn new(db: B, hub: Arc<InventoryHub>) -> Self {
        Self { db, hub }
    }

    pub fn hub(&self) -> &Arc<InventoryHub> {
        &self.hub
    }

    pub async fn current_stock(&self, product_id: i64) -> Result<i64, StorageError> {
        self.db.current_stock(product_id).await
    }

    pub async fn current_stock_batch(&self, product_ids: &[i64]) -> Result<HashMap<i64, i64>, StorageError> {
        self.db.current_stock_batch(product_ids).await
    }

    pub async fn stock_snapshot(&self) -> Result<Vec<StockLevel>, StorageError> {
        self.db.stock_snapshot().await
    }

    pub async fn history(&self, product_id: i64, limit: i64, offset: i64) -> Result<Vec<LedgerEntry>, StorageError> {
        self.db.entries_for_product(product_id, limit, offset).await
    }

    /// Appends a manual correction and pushes the new level to live subscribers. `delta` is
    /// signed; restocks are positive, spoilage and shrinkage negative.
    pub async fn manual_adjustment(
        &self,
        product_id: i64,
        delta: i64,
        reason: LedgerReason,
        operator: Option<&str>,
    ) -> Result<LedgerEntry, StorageError> {
        let mut entry = NewLedgerEntry::new(product_id, delta, reason);
        entry.created_by = operator.map(String::from);
        let entry = self.db.record_delta(entry).await?;
        let stock = self.db.current_stock(product_id).await?;
        info!("📦️ Manual {reason} of {delta} on product {product_id}. Stock is now {stock}");
        self.hub.publish(StockUpdate::new(product_id, stock, delta));
        Ok(entry)
    }

    /// A consistent starting snapshot plus a live subscription. Updates committed after the
    /// snapshot arrive on the subscription, so a client that applies them in order converges.
    pub async fn stock_stream(&self) -> Result<(Vec<StockLevel>, StockSubscription), StorageError> {
        let subscription = self.hub.subscribe();
        let snapshot = self.db.stock_snapshot().await?;
        Ok((snapshot, subscription))
    }
}
