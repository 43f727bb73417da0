use crate::{
    db::traits::StorageError,
    db_types::{MenuSlotDef, Product},
};

/// Read access to the product catalog maintained by the upstream admin CRUD.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    /// Fetches the products with the given ids. Unknown ids are simply absent from the result.
    async fn products_by_ids(&self, product_ids: &[i64]) -> Result<Vec<Product>, StorageError>;

    /// The slots of a menu product, ordered by position, each with its eligible option set.
    async fn slots_for_menu(&self, menu_product_id: i64) -> Result<Vec<MenuSlotDef>, StorageError>;
}
