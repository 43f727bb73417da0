use std::collections::HashMap;

use log::trace;
use sqlx::{QueryBuilder, Row, SqliteConnection};

use crate::{
    db::traits::StorageError,
    db_types::{LedgerEntry, NewLedgerEntry, StockLevel},
};

const ENTRY_COLUMNS: &str =
    "id, product_id, delta, reason, order_id, order_line_id, device_id, created_by, created_at";

/// Appends one entry to the ledger. Entries are never updated or deleted; negative resulting
/// stock is not an error here — availability checks belong to the caller.
pub async fn insert_entry(entry: &NewLedgerEntry, conn: &mut SqliteConnection) -> Result<LedgerEntry, StorageError> {
    let res = sqlx::query(
        r#"INSERT INTO inventory_ledger (product_id, delta, reason, order_id, order_line_id, device_id, created_by)
           VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
    )
    .bind(entry.product_id)
    .bind(entry.delta)
    .bind(entry.reason)
    .bind(entry.order_id)
    .bind(entry.order_line_id)
    .bind(entry.device_id)
    .bind(entry.created_by.as_deref())
    .execute(&mut *conn)
    .await?;
    let id = res.last_insert_rowid();
    trace!("📦️ Ledger entry #{id}: product {} delta {} ({})", entry.product_id, entry.delta, entry.reason);
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM inventory_ledger WHERE id = $1");
    let entry = sqlx::query_as::<_, LedgerEntry>(&sql).bind(id).fetch_one(conn).await?;
    Ok(entry)
}

pub async fn current_stock(product_id: i64, conn: &mut SqliteConnection) -> Result<i64, StorageError> {
    let row = sqlx::query("SELECT COALESCE(SUM(delta), 0) AS stock FROM inventory_ledger WHERE product_id = $1")
        .bind(product_id)
        .fetch_one(conn)
        .await?;
    Ok(row.get::<i64, _>("stock"))
}

/// Batch stock lookup. Every requested product id appears in the result; products with no ledger
/// entries report 0.
pub async fn current_stock_batch(
    product_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<HashMap<i64, i64>, StorageError> {
    let mut result: HashMap<i64, i64> = product_ids.iter().map(|id| (*id, 0)).collect();
    if product_ids.is_empty() {
        return Ok(result);
    }
    let mut builder =
        QueryBuilder::new("SELECT product_id, SUM(delta) AS stock FROM inventory_ledger WHERE product_id IN (");
    let mut separated = builder.separated(", ");
    for id in product_ids {
        separated.push_bind(*id);
    }
    builder.push(") GROUP BY product_id");
    let rows = builder.build().fetch_all(conn).await?;
    for row in rows {
        result.insert(row.get::<i64, _>("product_id"), row.get::<i64, _>("stock"));
    }
    Ok(result)
}

/// Current stock of every product that has at least one ledger entry.
pub async fn stock_snapshot(conn: &mut SqliteConnection) -> Result<Vec<StockLevel>, StorageError> {
    let levels = sqlx::query_as::<_, StockLevel>(
        "SELECT product_id, SUM(delta) AS stock FROM inventory_ledger GROUP BY product_id ORDER BY product_id ASC",
    )
    .fetch_all(conn)
    .await?;
    Ok(levels)
}

/// Ledger history for one product, newest first.
pub async fn entries_for_product(
    product_id: i64,
    limit: i64,
    offset: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, StorageError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM inventory_ledger WHERE product_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3"
    );
    let entries =
        sqlx::query_as::<_, LedgerEntry>(&sql).bind(product_id).bind(limit).bind(offset).fetch_all(conn).await?;
    Ok(entries)
}
