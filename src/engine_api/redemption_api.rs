//! Station-side item hand-over.
//!
//! A pickup station scans a paid order and claims the lines matching its assigned products.
//! Claims are at most once per line, enforced by a unique constraint in storage, and idempotent
//! per station: retrying the same scan from the same station replays the first result, while
//! the same order scanned at a second station gets its own pass that reports everything it
//! matched but hands over only what is left.

use chrono::Utc;
use log::*;

use crate::{
    db::traits::{IdempotencyManagement, OrderManagement, RedemptionManagement},
    db_types::{DeviceStatus, OrderStatus},
    engine_api::{
        errors::RedemptionError,
        order_objects::{RedeemResult, RedeemedItem},
    },
    helpers::{fingerprint, redemption_scope},
};

/// Replays cover double scans, which happen within seconds, not days.
const REDEMPTION_CACHE_TTL_HOURS: i64 = 24;

pub struct RedemptionApi<B> {
    db: B,
}

impl<B> RedemptionApi<B>
where B: RedemptionManagement + OrderManagement + IdempotencyManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub async fn redeem(
        &self,
        device_id: i64,
        order_id: i64,
        idempotency_key: &str,
    ) -> Result<RedeemResult, RedemptionError> {
        let scope = redemption_scope(device_id, order_id);
        if let Some(record) = self.db.idempotency_get(&scope, idempotency_key).await? {
            debug!("🎫️ Replaying redemption result for order #{order_id} at device #{device_id}");
            return serde_json::from_str(&record.response)
                .map_err(|e| RedemptionError::BadCachedResponse(e.to_string()));
        }
        let device = self.db.device_by_id(device_id).await?.ok_or(RedemptionError::DeviceNotFound(device_id))?;
        if device.status != DeviceStatus::Approved {
            return Err(RedemptionError::DeviceNotApproved(device_id));
        }
        let order = self.db.order_by_id(order_id).await?.ok_or(RedemptionError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::Paid {
            return Err(RedemptionError::OrderNotRedeemable { order_id, status: order.status });
        }
        let assigned = self.db.product_ids_for_device(device_id).await?;
        let lines = self.db.lines_for_order(order_id).await?;
        let mut matched = 0;
        let mut items = Vec::new();
        for line in lines.iter().filter(|l| l.carries_stock() && assigned.contains(&l.product_id)) {
            // Already-handled lines still count as matched, so staff can tell a fully served
            // order apart from one with nothing for this station.
            matched += 1;
            if line.redeemed_at.is_some() {
                continue;
            }
            // The insert is the race arbiter; a false return means another scan got there first.
            if self.db.redeem_line(line.id, device_id).await? {
                items.push(RedeemedItem {
                    line_id: line.id,
                    product_id: line.product_id,
                    title: line.title.clone(),
                    quantity: line.quantity,
                });
            }
        }
        let result = RedeemResult {
            order_id,
            device_id,
            matched,
            redeemed: items.len(),
            items,
            redeemed_at: Utc::now(),
        };
        info!(
            "🎫️ Device #{device_id} redeemed {}/{} matching lines of order #{order_id}",
            result.redeemed, result.matched
        );
        let body = serde_json::to_string(&result).map_err(|e| RedemptionError::Storage(e.to_string()))?;
        let fp = fingerprint(&(device_id, order_id));
        let ttl = chrono::Duration::hours(REDEMPTION_CACHE_TTL_HOURS);
        let _ = self.db.idempotency_save_if_absent(&scope, idempotency_key, &fp, &body, ttl).await?;
        Ok(result)
    }
}
