use chrono::{Duration, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{db::traits::StorageError, db_types::IdempotencyRecord};

const RECORD_COLUMNS: &str = "id, scope, key, fingerprint, response, created_at, expires_at";

/// Fetches the live record for (scope, key). Expired records are invisible; they are removed
/// lazily by [`cleanup_expired`].
pub async fn fetch_record(
    scope: &str,
    key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<IdempotencyRecord>, StorageError> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM idempotency WHERE scope = $1 AND key = $2 AND expires_at > $3");
    let record = sqlx::query_as::<_, IdempotencyRecord>(&sql)
        .bind(scope)
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

/// Inserts the record unless one already exists for (scope, key). The unique constraint makes the
/// insert the atomic commit point: under a race exactly one response is stored, and every caller
/// reads the stored record back.
pub async fn save_if_absent(
    scope: &str,
    key: &str,
    fingerprint: &str,
    response: &str,
    ttl: Duration,
    conn: &mut SqliteConnection,
) -> Result<IdempotencyRecord, StorageError> {
    let now = Utc::now();
    let expires_at = now + ttl;
    // A conflicting live record wins; a conflicting expired record is replaced in place.
    let res = sqlx::query(
        r#"INSERT INTO idempotency (scope, key, fingerprint, response, expires_at)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (scope, key) DO UPDATE
           SET fingerprint = excluded.fingerprint, response = excluded.response,
               created_at = CURRENT_TIMESTAMP, expires_at = excluded.expires_at
           WHERE idempotency.expires_at <= $6"#,
    )
    .bind(scope)
    .bind(key)
    .bind(fingerprint)
    .bind(response)
    .bind(expires_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    if res.rows_affected() == 0 {
        debug!("🗃️ Idempotency record ({scope}, {key}) already exists. Returning the stored response.");
    }
    let record =
        fetch_record(scope, key, conn).await?.ok_or(StorageError::Driver(sqlx::Error::RowNotFound))?;
    Ok(record)
}

pub async fn cleanup_expired(conn: &mut SqliteConnection) -> Result<u64, StorageError> {
    let res = sqlx::query("DELETE FROM idempotency WHERE expires_at <= $1").bind(Utc::now()).execute(conn).await?;
    Ok(res.rows_affected())
}
