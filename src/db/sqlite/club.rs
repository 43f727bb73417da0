use sqlx::{Row, SqliteConnection};

use crate::db::traits::StorageError;

/// Records one free-product redemption against a loyalty member's allowance.
pub async fn insert_redemption(
    member_id: &str,
    member_name: &str,
    order_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, StorageError> {
    let res = sqlx::query(
        "INSERT INTO club_redemptions (member_id, member_name, order_id, quantity) VALUES ($1, $2, $3, $4)",
    )
    .bind(member_id)
    .bind(member_name)
    .bind(order_id)
    .bind(quantity)
    .execute(conn)
    .await?;
    Ok(res.last_insert_rowid())
}

pub async fn total_for_member(member_id: &str, conn: &mut SqliteConnection) -> Result<i64, StorageError> {
    let row = sqlx::query("SELECT COALESCE(SUM(quantity), 0) AS total FROM club_redemptions WHERE member_id = $1")
        .bind(member_id)
        .fetch_one(conn)
        .await?;
    Ok(row.get::<i64, _>("total"))
}
