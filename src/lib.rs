//! Order Fulfillment Engine
//!
//! The order fulfillment engine is the backend core for a point-of-sale and self-service
//! food-ordering operation. Customers or staff assemble a cart of simple items and configurable
//! menu bundles, pay through one of several methods, and staff devices redeem purchased items at
//! physical stations. This library contains the core logic only; HTTP routing, authentication and
//! catalog administration live upstream.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@db`]). Sqlite is the supported backend. You should
//!    never need to access the database directly. Instead, use the public API provided by the
//!    engine. The exception is the data types used in the database, which are defined in the
//!    `db_types` module and are public.
//! 2. The engine public API ([`mod@engine_api`]). This provides the public-facing functionality:
//!    checkout composition, order and payment flow, device redemption and inventory queries.
//!    Backends need to implement the traits in [`mod@db`] in order to drive these APIs.
//!
//! The engine also emits events when orders are paid or annulled, and broadcasts live stock
//! levels through the [`events::InventoryHub`] so that displays can track inventory in real time.
mod db;

pub mod db_types;
mod engine_api;
pub mod events;
pub mod gateway;
pub mod helpers;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use db::traits::{
    CatalogManagement,
    FulfillmentDatabase,
    IdempotencyManagement,
    InventoryManagement,
    OrderManagement,
    OrderQueryFilter,
    PaidOrderSummary,
    RedemptionManagement,
    StorageError,
};
pub use engine_api::{
    order_objects,
    CheckoutComposer,
    CheckoutError,
    InventoryApi,
    OrderFlowApi,
    OrderFlowError,
    RedemptionApi,
    RedemptionError,
};
