//! # Database management and control.
//!
//! This module defines the interface contracts that storage backends must expose in order to
//! drive the fulfillment engine.
//!
//! ## Traits
//! * [`FulfillmentDatabase`] defines the highest level of behaviour: atomic order creation, the
//!   order status state machine, and the authoritative inventory deduction that happens when an
//!   order is paid.
//! * [`InventoryManagement`] is the append-only stock ledger: record signed deltas, derive
//!   current stock as the sum over entries.
//! * [`IdempotencyManagement`] is the (scope, key) response cache that makes checkout, payment
//!   and redemption calls safe to retry.
//! * [`RedemptionManagement`] covers devices, their product assignments and the unique-per-line
//!   redemption insert.
//! * [`CatalogManagement`] reads the product and menu-slot models maintained upstream.
//! * [`OrderManagement`] provides order and order-line queries.
mod catalog_management;
mod data_objects;
mod errors;
mod fulfillment_database;
mod idempotency_management;
mod inventory_management;
mod order_management;
mod redemption_management;

pub use catalog_management::CatalogManagement;
pub use data_objects::PaidOrderSummary;
pub use errors::StorageError;
pub use fulfillment_database::FulfillmentDatabase;
pub use idempotency_management::IdempotencyManagement;
pub use inventory_management::InventoryManagement;
pub use order_management::{OrderManagement, OrderQueryFilter};
pub use redemption_management::RedemptionManagement;

#[macro_export]
macro_rules! op {
    (binary $for_struct:ident, $impl_trait:ident, $impl_fn:ident) => {
        impl $impl_trait for $for_struct {
            type Output = Self;

            fn $impl_fn(self, rhs: Self) -> Self::Output {
                Self(self.0.$impl_fn(rhs.0))
            }
        }
    };

    (inplace $for_struct:ident, $impl_trait:ident, $impl_fn:ident) => {
        impl $impl_trait for $for_struct {
            fn $impl_fn(&mut self, rhs: Self) {
                self.0.$impl_fn(rhs.0)
            }
        }
    };

    (unary $for_struct:ident, $impl_trait:ident, $impl_fn:ident) => {
        impl $impl_trait for $for_struct {
            type Output = Self;

            fn $impl_fn(self) -> Self::Output {
                Self(self.0.$impl_fn())
            }
        }
    };
}
