use std::{collections::HashMap, sync::Arc};

use order_fulfillment_engine::{
    db_types::{Cents, DeviceStatus, DeviceType, OrderOrigin, OrderStatus},
    events::{EventProducers, InventoryHub},
    order_objects::{CartItem, ClubSettings, CustomerInfo, PaymentRequest},
    test_utils::{
        gateway::StubGateway,
        prepare_env::{prepare_test_env, random_db_path},
        seed::{add_stock, approved_station, seed_basic_catalog, BasicCatalog},
    },
    FulfillmentDatabase,
    OrderFlowApi,
    OrderManagement,
    RedemptionApi,
    RedemptionError,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

struct TestRig {
    flow: OrderFlowApi<SqliteDatabase, StubGateway>,
    redemption: RedemptionApi<SqliteDatabase>,
    catalog: BasicCatalog,
}

async fn setup() -> TestRig {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let catalog = seed_basic_catalog(&db).await;
    let hub = Arc::new(InventoryHub::default());
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default(), hub, None, ClubSettings::default());
    let redemption = RedemptionApi::new(db);
    TestRig { flow, redemption, catalog }
}

async fn tear_down(rig: TestRig) {
    let url = rig.flow.db().url().to_string();
    drop(rig);
    Sqlite::drop_database(&url).await.unwrap();
}

/// Places and cash-pays an order, returning its id.
async fn paid_order(rig: &TestRig, cart: Vec<CartItem>, key: &str) -> i64 {
    let customer = CustomerInfo::default();
    let prep = rig.flow.place_order(&customer, &cart, OrderOrigin::Pos, key).await.unwrap();
    let request = PaymentRequest::Cash { amount_received: Cents::from(100_000) };
    rig.flow.pay(prep.order_id, request, &format!("{key}-pay")).await.unwrap();
    prep.order_id
}

#[tokio::test]
async fn a_station_redeems_only_its_assigned_products() {
    let rig = setup().await;
    add_stock(rig.flow.db(), rig.catalog.burger, 10).await;
    add_stock(rig.flow.db(), rig.catalog.fries, 10).await;
    let grill = approved_station(rig.flow.db(), "Grill", &[rig.catalog.burger]).await;
    let order_id =
        paid_order(&rig, vec![CartItem::simple(rig.catalog.burger, 1), CartItem::simple(rig.catalog.fries, 2)], "k1")
            .await;

    let result = rig.redemption.redeem(grill, order_id, "scan-1").await.unwrap();
    assert_eq!(result.matched, 1);
    assert_eq!(result.redeemed, 1);
    assert_eq!(result.items[0].product_id, rig.catalog.burger);

    // The fries line is untouched and still redeemable by a fryer station.
    let fryer = approved_station(rig.flow.db(), "Fryer", &[rig.catalog.fries]).await;
    let result = rig.redemption.redeem(fryer, order_id, "scan-2").await.unwrap();
    assert_eq!(result.redeemed, 1);
    assert_eq!(result.items[0].product_id, rig.catalog.fries);
    tear_down(rig).await;
}

#[tokio::test]
async fn rescanning_at_the_same_station_replays_the_first_result() {
    let rig = setup().await;
    add_stock(rig.flow.db(), rig.catalog.burger, 10).await;
    let grill = approved_station(rig.flow.db(), "Grill", &[rig.catalog.burger]).await;
    let order_id = paid_order(&rig, vec![CartItem::simple(rig.catalog.burger, 1)], "k1").await;

    let first = rig.redemption.redeem(grill, order_id, "scan-1").await.unwrap();
    assert_eq!(first.redeemed, 1);
    let replay = rig.redemption.redeem(grill, order_id, "scan-1").await.unwrap();
    assert_eq!(replay.redeemed, 1);
    assert_eq!(replay.redeemed_at, first.redeemed_at);

    // A genuinely new scan still matches the line but finds nothing left to hand over.
    let second_pass = rig.redemption.redeem(grill, order_id, "scan-2").await.unwrap();
    assert_eq!(second_pass.matched, 1);
    assert_eq!(second_pass.redeemed, 0);
    tear_down(rig).await;
}

#[tokio::test]
async fn a_second_station_cannot_double_serve_redeemed_lines() {
    let rig = setup().await;
    add_stock(rig.flow.db(), rig.catalog.burger, 10).await;
    let grill_a = approved_station(rig.flow.db(), "Grill A", &[rig.catalog.burger]).await;
    let grill_b = approved_station(rig.flow.db(), "Grill B", &[rig.catalog.burger]).await;
    let order_id = paid_order(&rig, vec![CartItem::simple(rig.catalog.burger, 1)], "k1").await;

    let first = rig.redemption.redeem(grill_a, order_id, "scan-a").await.unwrap();
    assert_eq!(first.redeemed, 1);
    // Station scope means B's scan is not a replay of A's. B still matches the burger line,
    // but the line is already gone.
    let second = rig.redemption.redeem(grill_b, order_id, "scan-a").await.unwrap();
    assert_eq!(second.matched, 1);
    assert_eq!(second.redeemed, 0);
    tear_down(rig).await;
}

#[tokio::test]
async fn already_redeemed_lines_still_count_as_matched() {
    let rig = setup().await;
    add_stock(rig.flow.db(), rig.catalog.burger, 10).await;
    add_stock(rig.flow.db(), rig.catalog.fries, 10).await;
    add_stock(rig.flow.db(), rig.catalog.soda, 10).await;
    let cart = vec![
        CartItem::simple(rig.catalog.burger, 1),
        CartItem::simple(rig.catalog.fries, 1),
        CartItem::simple(rig.catalog.soda, 1),
    ];
    let order_id = paid_order(&rig, cart, "k1").await;
    // The grill hands the burger over first.
    let grill = approved_station(rig.flow.db(), "Grill", &[rig.catalog.burger]).await;
    let first = rig.redemption.redeem(grill, order_id, "scan-g").await.unwrap();
    assert_eq!(first.redeemed, 1);

    // The expo counter covers burger and soda. It matches both lines, sees the burger is
    // already handled, and serves only the soda.
    let expo = approved_station(rig.flow.db(), "Expo", &[rig.catalog.burger, rig.catalog.soda]).await;
    let result = rig.redemption.redeem(expo, order_id, "scan-e").await.unwrap();
    assert_eq!(result.matched, 2);
    assert_eq!(result.redeemed, 1);
    assert_eq!(result.items[0].product_id, rig.catalog.soda);
    tear_down(rig).await;
}

#[tokio::test]
async fn concurrent_scans_hand_each_line_over_once() {
    let rig = setup().await;
    add_stock(rig.flow.db(), rig.catalog.burger, 10).await;
    let grill = approved_station(rig.flow.db(), "Grill", &[rig.catalog.burger]).await;
    let order_id = paid_order(&rig, vec![CartItem::simple(rig.catalog.burger, 1)], "k1").await;

    let api = Arc::new(rig.redemption);
    let mut handles = Vec::new();
    for i in 0..4 {
        let api = api.clone();
        handles.push(tokio::spawn(async move { api.redeem(grill, order_id, &format!("scan-{i}")).await }));
    }
    let mut total_redeemed = 0;
    for handle in handles {
        total_redeemed += handle.await.unwrap().unwrap().redeemed;
    }
    assert_eq!(total_redeemed, 1);
    let url = rig.flow.db().url().to_string();
    drop((rig.flow, api));
    Sqlite::drop_database(&url).await.unwrap();
}

#[tokio::test]
async fn only_paid_orders_at_approved_devices_are_redeemable() {
    let rig = setup().await;
    add_stock(rig.flow.db(), rig.catalog.burger, 10).await;
    let customer = CustomerInfo::default();
    let cart = vec![CartItem::simple(rig.catalog.burger, 1)];
    let prep = rig.flow.place_order(&customer, &cart, OrderOrigin::Pos, "k1").await.unwrap();
    let grill = approved_station(rig.flow.db(), "Grill", &[rig.catalog.burger]).await;

    // Pending order.
    let err = rig.redemption.redeem(grill, prep.order_id, "scan-1").await.unwrap_err();
    assert!(matches!(err, RedemptionError::OrderNotRedeemable { status: OrderStatus::Pending, .. }));

    // Unknown device.
    let err = rig.redemption.redeem(9999, prep.order_id, "scan-2").await.unwrap_err();
    assert!(matches!(err, RedemptionError::DeviceNotFound(9999)));

    // Unapproved device.
    let db = rig.flow.db();
    let pending_station = db.add_device("New station", DeviceType::Station, DeviceStatus::Pending).await.unwrap();
    let err = rig.redemption.redeem(pending_station, prep.order_id, "scan-3").await.unwrap_err();
    assert!(matches!(err, RedemptionError::DeviceNotApproved(_)));
    tear_down(rig).await;
}

#[tokio::test]
async fn menu_components_redeem_individually_but_the_bundle_line_does_not() {
    let rig = setup().await;
    add_stock(rig.flow.db(), rig.catalog.burger, 10).await;
    add_stock(rig.flow.db(), rig.catalog.fries, 10).await;
    let selections: HashMap<i64, i64> =
        [(rig.catalog.slot_main, rig.catalog.burger), (rig.catalog.slot_side, rig.catalog.fries)]
            .into_iter()
            .collect();
    let order_id = paid_order(&rig, vec![CartItem::menu(rig.catalog.combo, 1, selections)], "k1").await;
    // A station assigned the combo product itself matches nothing: bundle lines are not physical.
    let counter = approved_station(rig.flow.db(), "Counter", &[rig.catalog.combo]).await;
    let result = rig.redemption.redeem(counter, order_id, "scan-0").await.unwrap();
    assert_eq!(result.matched, 0);

    let grill = approved_station(rig.flow.db(), "Grill", &[rig.catalog.burger]).await;
    let result = rig.redemption.redeem(grill, order_id, "scan-1").await.unwrap();
    assert_eq!(result.redeemed, 1);
    let lines = rig.flow.db().lines_for_order(order_id).await.unwrap();
    let redeemed: Vec<_> = lines.iter().filter(|l| l.redeemed_at.is_some()).collect();
    assert_eq!(redeemed.len(), 1);
    assert_eq!(redeemed[0].product_id, rig.catalog.burger);
    tear_down(rig).await;
}
