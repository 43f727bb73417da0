use std::collections::HashSet;

use sqlx::SqliteConnection;

use crate::{
    db::traits::StorageError,
    db_types::{Device, DeviceStatus, DeviceType},
};

const DEVICE_COLUMNS: &str = "id, name, device_type, status, created_at";

pub async fn fetch_device(device_id: i64, conn: &mut SqliteConnection) -> Result<Option<Device>, StorageError> {
    let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1");
    let device = sqlx::query_as::<_, Device>(&sql).bind(device_id).fetch_optional(conn).await?;
    Ok(device)
}

/// The product ids assigned to a device. Determines which order lines the device may redeem.
pub async fn product_ids_for_device(
    device_id: i64,
    conn: &mut SqliteConnection,
) -> Result<HashSet<i64>, StorageError> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT product_id FROM device_products WHERE device_id = $1")
        .bind(device_id)
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Registers a device. The pairing handshake lives upstream; this records its outcome.
pub async fn insert_device(
    name: &str,
    device_type: DeviceType,
    status: DeviceStatus,
    conn: &mut SqliteConnection,
) -> Result<i64, StorageError> {
    let res = sqlx::query("INSERT INTO devices (name, device_type, status) VALUES ($1, $2, $3)")
        .bind(name)
        .bind(device_type)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(res.last_insert_rowid())
}

pub async fn set_device_status(
    device_id: i64,
    status: DeviceStatus,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    let _ = sqlx::query("UPDATE devices SET status = $1 WHERE id = $2").bind(status).bind(device_id).execute(conn).await?;
    Ok(())
}

pub async fn assign_product(device_id: i64, product_id: i64, conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let _ = sqlx::query(
        "INSERT INTO device_products (device_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(device_id)
    .bind(product_id)
    .execute(conn)
    .await?;
    Ok(())
}
