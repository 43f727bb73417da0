use std::collections::HashMap;

use crate::{
    db::traits::StorageError,
    db_types::{LedgerEntry, NewLedgerEntry, StockLevel},
};

/// The append-only inventory ledger. Stock is always the SUM aggregate over entries; there is no
/// cached counter to go stale. Recording a delta never fails on negative resulting stock — the
/// ledger is a pure bookkeeping primitive, and availability checks belong to the caller.
#[allow(async_fn_in_trait)]
pub trait InventoryManagement {
    async fn record_delta(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StorageError>;

    /// Appends several entries in one transaction.
    async fn record_deltas(&self, entries: Vec<NewLedgerEntry>) -> Result<Vec<LedgerEntry>, StorageError>;

    async fn current_stock(&self, product_id: i64) -> Result<i64, StorageError>;

    /// Batch stock lookup for rendering catalog and stock together. Products with no ledger
    /// entries report 0, not "not found".
    async fn current_stock_batch(&self, product_ids: &[i64]) -> Result<HashMap<i64, i64>, StorageError>;

    /// Current stock of every product that has at least one ledger entry.
    async fn stock_snapshot(&self) -> Result<Vec<StockLevel>, StorageError>;

    /// Ledger history for one product, newest first.
    async fn entries_for_product(
        &self,
        product_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StorageError>;
}
