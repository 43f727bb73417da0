//! Small shared utilities: idempotency scopes and request fingerprints.

use blake2::{Blake2b512, Digest};
use serde::Serialize;

/// Scope for order-creation idempotency keys.
pub const ORDER_CREATE_SCOPE: &str = "order:create";

/// Scope for payment attempts against a specific order.
pub fn order_payment_scope(order_id: i64) -> String {
    format!("order:{order_id}:payment")
}

/// Scope for redemption attempts. Device-scoped: the same key from two different stations is
/// two different requests.
pub fn redemption_scope(device_id: i64, order_id: i64) -> String {
    format!("station:{device_id}:order:{order_id}")
}

/// A stable digest of a request payload, used to detect an idempotency key being reused with a
/// different body.
pub fn fingerprint<T: Serialize>(payload: &T) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let digest = Blake2b512::digest(&bytes);
    digest.iter().fold(String::with_capacity(128), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fingerprints_are_stable_and_payload_sensitive() {
        let a = fingerprint(&("cash", 500));
        let b = fingerprint(&("cash", 500));
        let c = fingerprint(&("cash", 600));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 128);
    }

    #[test]
    fn scopes_are_distinct_per_device_and_order() {
        assert_eq!(redemption_scope(3, 99), "station:3:order:99");
        assert_ne!(redemption_scope(3, 99), redemption_scope(4, 99));
        assert_ne!(order_payment_scope(1), order_payment_scope(2));
    }
}
