use std::collections::HashSet;

use crate::{
    db::traits::StorageError,
    db_types::Device,
};

/// Devices, their assigned product sets, and the unique-per-line redemption insert that gives
/// redemption its at-most-once guarantee.
#[allow(async_fn_in_trait)]
pub trait RedemptionManagement {
    async fn device_by_id(&self, device_id: i64) -> Result<Option<Device>, StorageError>;

    /// The set of product ids this device may redeem.
    async fn product_ids_for_device(&self, device_id: i64) -> Result<HashSet<i64>, StorageError>;

    /// Marks a line redeemed by inserting its redemption row. Returns `true` if this call created
    /// the row, `false` if the line was already redeemed. Under concurrent callers the unique
    /// constraint on the line id guarantees exactly one `true`.
    async fn redeem_line(&self, order_line_id: i64, device_id: i64) -> Result<bool, StorageError>;
}
