//! # Fulfillment engine public API
//!
//! The `engine_api` module exposes the programmatic API of the order fulfillment engine.
//! The API is modular: a transport layer can pick just the pieces it serves, and each API
//! instance is created by supplying a database backend implementing the traits it needs.
//!
//! * [`checkout`] expands a raw cart into priced order lines, resolving menu bundles and their
//!   slot selections against the catalog.
//! * [`order_flow_api`] is the primary API: idempotent order creation, payment capture across
//!   every supported method, wallet-gateway hand-off, cancellation and refunds.
//! * [`redemption_api`] hands paid items over the counter, at most once per line, scoped to the
//!   station doing the handing.
//! * [`inventory_api`] reads the ledger, applies manual corrections, and feeds the live stock
//!   update hub.
//!
//! The pattern for using the APIs is the same throughout:
//!
//! ```rust,ignore
//! use order_fulfillment_engine::{OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/fulfillment.db", 5).await?;
//! let api = OrderFlowApi::new(db, producers, hub, gateway, club_settings);
//! let prep = api.place_order(&customer, cart, &idempotency_key).await?;
//! ```

pub mod checkout;
pub mod errors;
pub mod inventory_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod redemption_api;

pub use checkout::CheckoutComposer;
pub use errors::{CheckoutError, OrderFlowError, RedemptionError};
pub use inventory_api::InventoryApi;
pub use order_flow_api::OrderFlowApi;
pub use redemption_api::RedemptionApi;
