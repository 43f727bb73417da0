use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db::traits::StorageError,
    db_types::{Cents, MenuSlot, MenuSlotDef, Product, ProductType},
};

const PRODUCT_COLUMNS: &str = "id, name, price, product_type, active, created_at";

pub async fn fetch_products_by_ids(
    product_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<Vec<Product>, StorageError> {
    if product_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id IN ("));
    let mut separated = builder.separated(", ");
    for id in product_ids {
        separated.push_bind(*id);
    }
    builder.push(")");
    let products = builder.build_query_as::<Product>().fetch_all(conn).await?;
    trace!("🗃️ Loaded {} of {} requested products", products.len(), product_ids.len());
    Ok(products)
}

/// The slots of a menu product, ordered by position, each carrying its eligible option set.
pub async fn fetch_slots_for_menu(
    menu_product_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<MenuSlotDef>, StorageError> {
    let slots = sqlx::query_as::<_, MenuSlot>(
        "SELECT id, menu_product_id, name, position FROM menu_slots WHERE menu_product_id = $1 ORDER BY position ASC",
    )
    .bind(menu_product_id)
    .fetch_all(&mut *conn)
    .await?;
    let mut defs = Vec::with_capacity(slots.len());
    for slot in slots {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT option_product_id FROM menu_slot_options WHERE slot_id = $1")
                .bind(slot.id)
                .fetch_all(&mut *conn)
                .await?;
        let option_product_ids = rows.into_iter().map(|(id,)| id).collect();
        defs.push(MenuSlotDef { slot, option_product_ids });
    }
    Ok(defs)
}

/// Catalog writes below this point record the output of the upstream admin CRUD. The engine
/// itself only reads products.
pub async fn insert_product(
    name: &str,
    price: Cents,
    product_type: ProductType,
    active: bool,
    conn: &mut SqliteConnection,
) -> Result<i64, StorageError> {
    let res = sqlx::query("INSERT INTO products (name, price, product_type, active) VALUES ($1, $2, $3, $4)")
        .bind(name)
        .bind(price)
        .bind(product_type)
        .bind(active)
        .execute(conn)
        .await?;
    Ok(res.last_insert_rowid())
}

pub async fn insert_menu_slot(
    menu_product_id: i64,
    name: &str,
    position: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, StorageError> {
    let res = sqlx::query("INSERT INTO menu_slots (menu_product_id, name, position) VALUES ($1, $2, $3)")
        .bind(menu_product_id)
        .bind(name)
        .bind(position)
        .execute(conn)
        .await?;
    Ok(res.last_insert_rowid())
}

pub async fn insert_slot_option(
    slot_id: i64,
    option_product_id: i64,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    let _ = sqlx::query(
        "INSERT INTO menu_slot_options (slot_id, option_product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(slot_id)
    .bind(option_product_id)
    .execute(conn)
    .await?;
    Ok(())
}
