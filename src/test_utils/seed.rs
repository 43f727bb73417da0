//! Catalog and stock fixtures shared by the integration tests.

use crate::{
    db_types::{Cents, DeviceStatus, DeviceType, LedgerReason, NewLedgerEntry, ProductType},
    InventoryManagement,
    SqliteDatabase,
};

/// A small food-stand catalog: three simple products and one two-slot combo menu.
pub struct BasicCatalog {
    pub burger: i64,
    pub fries: i64,
    pub soda: i64,
    pub combo: i64,
    pub slot_main: i64,
    pub slot_side: i64,
}

pub async fn seed_basic_catalog(db: &SqliteDatabase) -> BasicCatalog {
    let burger = db.add_product("Burger", Cents::from(1200), ProductType::Simple, true).await.unwrap();
    let fries = db.add_product("Fries", Cents::from(400), ProductType::Simple, true).await.unwrap();
    let soda = db.add_product("Soda", Cents::from(300), ProductType::Simple, true).await.unwrap();
    let combo = db.add_product("Combo", Cents::from(1500), ProductType::Menu, true).await.unwrap();
    let slot_main = db.add_menu_slot(combo, "Main", 1).await.unwrap();
    let slot_side = db.add_menu_slot(combo, "Side", 2).await.unwrap();
    db.add_slot_option(slot_main, burger).await.unwrap();
    db.add_slot_option(slot_side, fries).await.unwrap();
    db.add_slot_option(slot_side, soda).await.unwrap();
    BasicCatalog { burger, fries, soda, combo, slot_main, slot_side }
}

pub async fn add_stock(db: &SqliteDatabase, product_id: i64, quantity: i64) {
    let entry = NewLedgerEntry::new(product_id, quantity, LedgerReason::OpeningBalance);
    db.record_delta(entry).await.unwrap();
}

pub async fn approved_station(db: &SqliteDatabase, name: &str, product_ids: &[i64]) -> i64 {
    let device = db.add_device(name, DeviceType::Station, DeviceStatus::Approved).await.unwrap();
    for pid in product_ids {
        db.assign_product_to_device(device, *pid).await.unwrap();
    }
    device
}
