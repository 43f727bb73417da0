use log::trace;
use sqlx::SqliteConnection;

use crate::db::traits::StorageError;

/// Marks a line redeemed. The unique constraint on `order_line_id` is the at-most-once gate:
/// under concurrent callers exactly one insert lands, and everyone else observes
/// "already redeemed" via a zero row count rather than an error.
pub async fn redeem_line(
    order_line_id: i64,
    device_id: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, StorageError> {
    let res = sqlx::query(
        r#"INSERT INTO order_line_redemptions (order_line_id, device_id)
           VALUES ($1, $2)
           ON CONFLICT (order_line_id) DO NOTHING"#,
    )
    .bind(order_line_id)
    .bind(device_id)
    .execute(conn)
    .await?;
    let newly_redeemed = res.rows_affected() == 1;
    if newly_redeemed {
        trace!("🎫️ Line #{order_line_id} redeemed by device #{device_id}");
    }
    Ok(newly_redeemed)
}
