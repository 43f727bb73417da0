//! Fan-out hub for live stock updates.
//!
//! Every committed ledger write publishes a [`StockUpdate`] to the hub. Subscribers (typically
//! one per connected storefront session) each get their own bounded channel. Publishing never
//! blocks and never waits on a slow consumer: if a subscriber's buffer is full the update is
//! dropped for that subscriber, and closed subscribers are pruned on the next publish.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub product_id: i64,
    pub new_stock: i64,
    pub delta: i64,
    pub timestamp: DateTime<Utc>,
}

impl StockUpdate {
    pub fn new(product_id: i64, new_stock: i64, delta: i64) -> Self {
        Self { product_id, new_stock, delta, timestamp: Utc::now() }
    }
}

/// A live feed of stock updates. Dropping the subscription (or calling
/// [`InventoryHub::unsubscribe`]) detaches it from the hub.
pub struct StockSubscription {
    id: u64,
    receiver: mpsc::Receiver<StockUpdate>,
}

impl StockSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<StockUpdate> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StockUpdate> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
pub struct InventoryHub {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<StockUpdate>>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl Default for InventoryHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl InventoryHub {
    pub fn new(buffer_size: usize) -> Self {
        Self { subscribers: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0), buffer_size }
    }

    pub fn subscribe(&self) -> StockSubscription {
        let (sender, receiver) = mpsc::channel(self.buffer_size);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut subs = self.subscribers.lock().unwrap();
        subs.insert(id, sender);
        debug!("📬️ Stock subscriber #{id} attached ({} active)", subs.len());
        StockSubscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut subs = self.subscribers.lock().unwrap();
        if subs.remove(&id).is_some() {
            debug!("📬️ Stock subscriber #{id} detached ({} active)", subs.len());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Delivers an update to every live subscriber without blocking. Subscribers with full
    /// buffers miss this update; subscribers whose receiver has been dropped are removed.
    pub fn publish(&self, update: StockUpdate) {
        let mut subs = self.subscribers.lock().unwrap();
        let mut closed = Vec::new();
        for (id, sender) in subs.iter() {
            match sender.try_send(update.clone()) {
                Ok(()) => {},
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!("📬️ Stock subscriber #{id} is lagging. Update for product {} dropped.", update.product_id);
                },
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed.push(*id);
                },
            }
        }
        for id in closed {
            subs.remove(&id);
            trace!("📬️ Stock subscriber #{id} pruned");
        }
    }

    pub fn publish_all<I: IntoIterator<Item = StockUpdate>>(&self, updates: I) {
        for update in updates {
            self.publish(update);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_the_update() {
        let hub = InventoryHub::default();
        let mut s1 = hub.subscribe();
        let mut s2 = hub.subscribe();
        hub.publish(StockUpdate::new(7, 41, -1));
        let u1 = s1.recv().await.unwrap();
        let u2 = s2.recv().await.unwrap();
        assert_eq!(u1.product_id, 7);
        assert_eq!(u2.new_stock, 41);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_updates_without_blocking() {
        let hub = InventoryHub::new(1);
        let mut sub = hub.subscribe();
        hub.publish(StockUpdate::new(1, 10, -1));
        hub.publish(StockUpdate::new(1, 9, -1));
        // Buffer size 1: the second publish is dropped, not queued.
        assert_eq!(sub.recv().await.unwrap().new_stock, 10);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned() {
        let hub = InventoryHub::default();
        let sub = hub.subscribe();
        let mut live = hub.subscribe();
        drop(sub);
        hub.publish(StockUpdate::new(3, 5, 5));
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(live.recv().await.unwrap().delta, 5);
    }

    #[tokio::test]
    async fn unsubscribe_detaches() {
        let hub = InventoryHub::default();
        let sub = hub.subscribe();
        hub.unsubscribe(sub.id());
        assert_eq!(hub.subscriber_count(), 0);
    }
}
