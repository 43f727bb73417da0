use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db::traits::{OrderQueryFilter, StorageError},
    db_types::{NewOrder, NewOrderLine, Order, OrderLine, OrderStatus, PaymentMethod},
};

const ORDER_COLUMNS: &str = "id, customer_id, contact_email, total, status, origin, payment_method, gateway_ref, \
                             gateway_tx_ref, created_at, updated_at";

const LINE_COLUMNS: &str = "l.id, l.order_id, l.line_type, l.product_id, l.title, l.unit_price, l.quantity, \
                            l.parent_line_id, l.menu_slot_id, l.menu_slot_name, r.redeemed_at, l.created_at";

/// Inserts a new order row. This is not atomic on its own; embed the call inside a transaction
/// together with [`insert_lines`] and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Order, StorageError> {
    let res = sqlx::query(
        r#"INSERT INTO orders (customer_id, contact_email, total, status, origin)
           VALUES ($1, $2, $3, 'pending', $4)"#,
    )
    .bind(order.customer_id.as_deref())
    .bind(order.contact_email.as_deref())
    .bind(order.total)
    .bind(order.origin)
    .execute(&mut *conn)
    .await?;
    let id = res.last_insert_rowid();
    let order = fetch_order_by_id(id, conn).await?.ok_or(StorageError::OrderNotFound(id))?;
    Ok(order)
}

/// Inserts the draft lines for an order, resolving component parent indices to the row ids
/// assigned to earlier lines in the same batch.
pub async fn insert_lines(
    order_id: i64,
    lines: &[NewOrderLine],
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderLine>, StorageError> {
    let mut ids = Vec::with_capacity(lines.len());
    for line in lines {
        let parent_line_id = line.parent_index.map(|i| ids[i]);
        let res = sqlx::query(
            r#"INSERT INTO order_lines
               (order_id, line_type, product_id, title, unit_price, quantity, parent_line_id, menu_slot_id, menu_slot_name)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(order_id)
        .bind(line.line_type)
        .bind(line.product_id)
        .bind(line.title.as_str())
        .bind(line.unit_price)
        .bind(line.quantity)
        .bind(parent_line_id)
        .bind(line.menu_slot_id)
        .bind(line.menu_slot_name.as_deref())
        .execute(&mut *conn)
        .await?;
        ids.push(res.last_insert_rowid());
    }
    trace!("🗃️ {} lines saved for order #{order_id}", ids.len());
    fetch_lines_for_order(order_id, conn).await
}

pub async fn fetch_order_by_id(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, StorageError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let order = sqlx::query_as::<_, Order>(&sql).bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_gateway_ref(
    gateway_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StorageError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE gateway_ref = $1 ORDER BY id DESC LIMIT 1");
    let order = sqlx::query_as::<_, Order>(&sql).bind(gateway_ref).fetch_optional(conn).await?;
    Ok(order)
}

/// All lines of an order in insertion order, with redemption timestamps joined in.
pub async fn fetch_lines_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderLine>, StorageError> {
    let sql = format!(
        r#"SELECT {LINE_COLUMNS}
           FROM order_lines l LEFT JOIN order_line_redemptions r ON r.order_line_id = l.id
           WHERE l.order_id = $1
           ORDER BY l.id ASC"#
    );
    let lines = sqlx::query_as::<_, OrderLine>(&sql).bind(order_id).fetch_all(conn).await?;
    Ok(lines)
}

/// Conditionally transitions an order's status. The `WHERE status = from` clause is the
/// serialization gate: under concurrent attempts exactly one caller sees `true`.
pub async fn transition_status(
    order_id: i64,
    from: OrderStatus,
    to: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<bool, StorageError> {
    let res = sqlx::query(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND status = $3",
    )
    .bind(to)
    .bind(order_id)
    .bind(from)
    .execute(conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// The `pending -> paid` gate, stamping the payment method and optional gateway transaction
/// reference in the same statement.
pub async fn mark_paid(
    order_id: i64,
    method: PaymentMethod,
    gateway_tx_ref: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<bool, StorageError> {
    let res = sqlx::query(
        r#"UPDATE orders
           SET status = 'paid', payment_method = $1, gateway_tx_ref = COALESCE($2, gateway_tx_ref),
               updated_at = CURRENT_TIMESTAMP
           WHERE id = $3 AND status = 'pending'"#,
    )
    .bind(method)
    .bind(gateway_tx_ref)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn set_gateway_ref(order_id: i64, gateway_ref: &str, conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let _ = sqlx::query("UPDATE orders SET gateway_ref = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(gateway_ref)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Fills in the contact email if the order has none yet.
pub async fn merge_contact_email(order_id: i64, email: &str, conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let _ = sqlx::query(
        "UPDATE orders SET contact_email = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND contact_email IS NULL",
    )
    .bind(email)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Deletes a still-pending order and its lines. Pending orders have no ledger entries, so no
/// compensation is needed. Returns `false` when the order is missing or no longer pending.
pub async fn delete_pending_order(order_id: i64, conn: &mut SqliteConnection) -> Result<bool, StorageError> {
    let Some(order) = fetch_order_by_id(order_id, &mut *conn).await? else {
        return Ok(false);
    };
    if order.status != OrderStatus::Pending {
        debug!("🗃️ Order #{order_id} is {} and will not be discarded", order.status);
        return Ok(false);
    }
    let _ = sqlx::query("DELETE FROM order_lines WHERE order_id = $1").bind(order_id).execute(&mut *conn).await?;
    let res = sqlx::query("DELETE FROM orders WHERE id = $1 AND status = 'pending'").bind(order_id).execute(conn).await?;
    Ok(res.rows_affected() == 1)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn fetch_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, StorageError> {
    let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders "));
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(customer_id) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(customer_id);
    }
    if let Some(origin) = query.origin {
        where_clause.push("origin = ");
        where_clause.push_bind_unseparated(origin.to_string());
    }
    if !query.statuses.is_empty() {
        let statuses = query.statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}
