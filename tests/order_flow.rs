use std::{collections::HashMap, sync::Arc};

use log::*;
use order_fulfillment_engine::{
    db_types::{Cents, OrderOrigin, OrderStatus, PaymentMethod},
    events::{EventProducers, InventoryHub},
    gateway::{CheckoutUrls, GatewayTxStatus, WebhookNotice},
    order_objects::{CartItem, ClubSettings, CustomerInfo, PaymentRequest},
    test_utils::{
        gateway::StubGateway,
        prepare_env::{prepare_test_env, random_db_path},
        seed::{add_stock, seed_basic_catalog, BasicCatalog},
    },
    CheckoutError,
    FulfillmentDatabase,
    IdempotencyManagement,
    InventoryManagement,
    OrderFlowApi,
    OrderFlowError,
    OrderManagement,
    OrderQueryFilter,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

async fn setup() -> (OrderFlowApi<SqliteDatabase, StubGateway>, BasicCatalog) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let catalog = seed_basic_catalog(&db).await;
    let hub = Arc::new(InventoryHub::default());
    let club = ClubSettings::new([catalog.soda].into_iter().collect(), 5);
    let api = OrderFlowApi::new(db, EventProducers::default(), hub, Some(StubGateway), club);
    (api, catalog)
}

async fn tear_down(api: OrderFlowApi<SqliteDatabase, StubGateway>) {
    let url = api.db().url().to_string();
    Sqlite::drop_database(&url).await.unwrap();
}

fn walk_in() -> CustomerInfo {
    CustomerInfo::default()
}

#[tokio::test]
async fn placing_the_same_cart_twice_creates_one_order() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 10).await;
    let cart = vec![CartItem::simple(catalog.burger, 2)];
    let first = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "key-1").await.unwrap();
    let second = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "key-1").await.unwrap();
    assert_eq!(first.order_id, second.order_id);
    assert_eq!(first.total, second.total);
    let orders = api.db().fetch_orders(OrderQueryFilter::default()).await.unwrap();
    assert_eq!(orders.len(), 1);
    tear_down(api).await;
}

#[tokio::test]
async fn reusing_a_key_with_a_different_cart_is_refused() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 10).await;
    add_stock(api.db(), catalog.fries, 10).await;
    let cart = vec![CartItem::simple(catalog.burger, 1)];
    api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "key-2").await.unwrap();
    let other_cart = vec![CartItem::simple(catalog.fries, 1)];
    let err = api.place_order(&walk_in(), &other_cart, OrderOrigin::Pos, "key-2").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::IdempotencyKeyReuse));
    tear_down(api).await;
}

#[tokio::test]
async fn expired_idempotency_records_release_their_keys() {
    let (api, catalog) = setup().await;
    let api = api.with_idempotency_ttl(chrono::Duration::milliseconds(50));
    add_stock(api.db(), catalog.burger, 10).await;
    add_stock(api.db(), catalog.fries, 10).await;
    let cart = vec![CartItem::simple(catalog.burger, 1)];
    let first = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "key-1").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(120)).await;

    // Once the record lapses, the key is free again: no reuse complaint even with a different
    // cart, and the stale row is replaced in place by the new response.
    let other_cart = vec![CartItem::simple(catalog.fries, 1)];
    let second = api.place_order(&walk_in(), &other_cart, OrderOrigin::Pos, "key-1").await.unwrap();
    assert_ne!(first.order_id, second.order_id);

    tokio::time::sleep(std::time::Duration::from_millis(120)).await;
    let removed = api.db().idempotency_cleanup_expired().await.unwrap();
    assert_eq!(removed, 1);
    // The key is free once more, and there is nothing left for a later sweep to collect.
    let third = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "key-1").await.unwrap();
    assert_ne!(second.order_id, third.order_id);
    tear_down(api).await;
}

#[tokio::test]
async fn menus_expand_into_a_flat_priced_bundle_with_free_components() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 10).await;
    add_stock(api.db(), catalog.fries, 10).await;
    let selections: HashMap<i64, i64> =
        [(catalog.slot_main, catalog.burger), (catalog.slot_side, catalog.fries)].into_iter().collect();
    let cart = vec![CartItem::menu(catalog.combo, 2, selections)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Shop, "key-3").await.unwrap();
    assert_eq!(prep.total, Cents::from(3000));
    assert_eq!(prep.lines.len(), 3);
    assert_eq!(prep.lines[0].unit_price, Cents::from(1500));
    assert_eq!(prep.lines[1].unit_price, Cents::from(0));
    assert_eq!(prep.lines[2].unit_price, Cents::from(0));
    assert_eq!(prep.lines[1].menu_slot_name.as_deref(), Some("Main"));
    assert_eq!(prep.lines[2].menu_slot_name.as_deref(), Some("Side"));
    tear_down(api).await;
}

#[tokio::test]
async fn a_menu_without_a_full_set_of_selections_is_refused() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 10).await;
    let selections: HashMap<i64, i64> = [(catalog.slot_main, catalog.burger)].into_iter().collect();
    let cart = vec![CartItem::menu(catalog.combo, 1, selections)];
    let err = api.place_order(&walk_in(), &cart, OrderOrigin::Shop, "key-4").await.unwrap_err();
    assert!(matches!(
        err,
        OrderFlowError::Checkout(CheckoutError::MissingSlotSelection { slot_id, .. }) if slot_id == catalog.slot_side
    ));
    // An option outside the slot's eligible set fails too.
    let selections: HashMap<i64, i64> =
        [(catalog.slot_main, catalog.fries), (catalog.slot_side, catalog.soda)].into_iter().collect();
    let cart = vec![CartItem::menu(catalog.combo, 1, selections)];
    let err = api.place_order(&walk_in(), &cart, OrderOrigin::Shop, "key-5").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Checkout(CheckoutError::OptionNotEligible { .. })));
    tear_down(api).await;
}

#[tokio::test]
async fn cash_payment_deducts_stock_exactly_once() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 10).await;
    let cart = vec![CartItem::simple(catalog.burger, 3)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "order-key").await.unwrap();
    // Placing an order reserves nothing.
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 10);

    let request = PaymentRequest::Cash { amount_received: Cents::from(4000) };
    let outcome = api.pay(prep.order_id, request.clone(), "pay-key").await.unwrap();
    assert_eq!(outcome.status, OrderStatus::Paid);
    assert_eq!(outcome.change, Cents::from(400));
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 7);

    // A retry with the same key replays the outcome and deducts nothing.
    let replay = api.pay(prep.order_id, request, "pay-key").await.unwrap();
    assert_eq!(replay.change, outcome.change);
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 7);

    // A fresh attempt against the now-paid order is an illegal transition.
    let again = PaymentRequest::Cash { amount_received: Cents::from(3600) };
    let err = api.pay(prep.order_id, again, "pay-key-2").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition { from: OrderStatus::Paid, .. }));
    tear_down(api).await;
}

#[tokio::test]
async fn short_cash_is_refused_and_the_order_stays_pending() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 5).await;
    let cart = vec![CartItem::simple(catalog.burger, 1)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "k").await.unwrap();
    let err =
        api.pay(prep.order_id, PaymentRequest::Cash { amount_received: Cents::from(1000) }, "pk").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::CashShort { .. }));
    let order = api.db().order_by_id(prep.order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 5);
    tear_down(api).await;
}

#[tokio::test]
async fn an_oversold_interactive_payment_fails_and_rolls_back() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 5).await;
    let cart = vec![CartItem::simple(catalog.burger, 4)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "k1").await.unwrap();
    // A competing sale drains the stock between checkout and payment.
    add_stock(api.db(), catalog.burger, -3).await;
    let err =
        api.pay(prep.order_id, PaymentRequest::Cash { amount_received: Cents::from(4800) }, "pk1").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Oversold { requested: 4, available: 2, .. }));
    // The order is still pending and no ledger entry landed, so it can be amended and retried.
    let order = api.db().order_by_id(prep.order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 2);
    tear_down(api).await;
}

#[tokio::test]
async fn a_confirmed_webhook_deducts_even_into_negative_stock() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 2).await;
    let cart = vec![CartItem::simple(catalog.burger, 2)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Shop, "k1").await.unwrap();
    let urls = CheckoutUrls {
        success_url: "https://shop.test/ok".into(),
        failed_url: "https://shop.test/failed".into(),
        cancel_url: "https://shop.test/cancel".into(),
    };
    let checkout = api.start_wallet_payment(prep.order_id, urls).await.unwrap();
    assert_eq!(checkout.gateway_ref, format!("gw-{}", prep.order_id));
    // The stand sells out while the customer sits on the hosted checkout page.
    add_stock(api.db(), catalog.burger, -1).await;
    let notice = WebhookNotice {
        gateway_ref: checkout.gateway_ref.clone(),
        transaction_ref: "tx-900".into(),
        status: GatewayTxStatus::Confirmed,
        payer_email: Some("payer@example.com".into()),
    };
    let outcome = api.confirm_wallet_payment(notice.clone()).await.unwrap();
    assert_eq!(outcome.status, OrderStatus::Paid);
    assert_eq!(outcome.oversold, vec![catalog.burger]);
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), -1);
    let order = api.db().order_by_id(prep.order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_method, Some(PaymentMethod::Wallet));
    assert_eq!(order.gateway_tx_ref.as_deref(), Some("tx-900"));
    assert_eq!(order.contact_email.as_deref(), Some("payer@example.com"));

    // A replayed webhook is a no-op.
    let replay = api.confirm_wallet_payment(notice).await.unwrap();
    assert_eq!(replay.status, OrderStatus::Paid);
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), -1);
    tear_down(api).await;
}

#[tokio::test]
async fn concurrent_webhook_deliveries_settle_once() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 10).await;
    let cart = vec![CartItem::simple(catalog.burger, 2)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Shop, "k1").await.unwrap();
    let urls = CheckoutUrls {
        success_url: "https://shop.test/ok".into(),
        failed_url: "https://shop.test/failed".into(),
        cancel_url: "https://shop.test/cancel".into(),
    };
    let checkout = api.start_wallet_payment(prep.order_id, urls).await.unwrap();
    let notice = WebhookNotice {
        gateway_ref: checkout.gateway_ref,
        transaction_ref: "tx-905".into(),
        status: GatewayTxStatus::Confirmed,
        payer_email: None,
    };
    // Gateways redeliver; every delivery must be accepted and the stock move exactly once.
    let api = Arc::new(api);
    let mut handles = Vec::new();
    for _ in 0..4 {
        let api = api.clone();
        let notice = notice.clone();
        handles.push(tokio::spawn(async move { api.confirm_wallet_payment(notice).await }));
    }
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.status, OrderStatus::Paid);
    }
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 8);
    let api = Arc::try_unwrap(api).map_err(|_| ()).ok().unwrap();
    tear_down(api).await;
}

#[tokio::test]
async fn a_failed_webhook_leaves_the_order_pending_for_retry() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 5).await;
    let cart = vec![CartItem::simple(catalog.burger, 1)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Shop, "k1").await.unwrap();
    let urls = CheckoutUrls {
        success_url: "https://shop.test/ok".into(),
        failed_url: "https://shop.test/failed".into(),
        cancel_url: "https://shop.test/cancel".into(),
    };
    let checkout = api.start_wallet_payment(prep.order_id, urls).await.unwrap();
    let notice = WebhookNotice {
        gateway_ref: checkout.gateway_ref,
        transaction_ref: "tx-901".into(),
        status: GatewayTxStatus::Failed,
        payer_email: None,
    };
    let outcome = api.confirm_wallet_payment(notice).await.unwrap();
    assert_eq!(outcome.status, OrderStatus::Pending);
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 5);
    // The customer falls back to paying cash at the counter.
    let paid =
        api.pay(prep.order_id, PaymentRequest::Cash { amount_received: Cents::from(1200) }, "pk1").await.unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    tear_down(api).await;
}

#[tokio::test]
async fn cancel_and_refund_follow_the_state_machine() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 10).await;
    let cart = vec![CartItem::simple(catalog.burger, 2)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "k1").await.unwrap();

    // Refunding a pending order is illegal.
    let err = api.refund_order(prep.order_id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition { from: OrderStatus::Pending, .. }));

    api.pay(prep.order_id, PaymentRequest::Cash { amount_received: Cents::from(2400) }, "pk1").await.unwrap();
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 8);

    // Cancelling a paid order is illegal; it must be refunded.
    let err = api.cancel_order(prep.order_id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition { from: OrderStatus::Paid, .. }));

    let summary = api.refund_order(prep.order_id).await.unwrap();
    assert_eq!(summary.order.status, OrderStatus::Refunded);
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 10);

    // Refunds are terminal.
    let err = api.refund_order(prep.order_id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition { from: OrderStatus::Refunded, .. }));

    // Cancelling a fresh pending order leaves the ledger untouched.
    let prep2 = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "k2").await.unwrap();
    let cancelled = api.cancel_order(prep2.order_id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 10);
    tear_down(api).await;
}

#[tokio::test]
async fn club_members_spend_their_allowance_on_listed_products_only() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.soda, 20).await;
    add_stock(api.db(), catalog.burger, 20).await;

    // Burgers are not on the free list.
    let cart = vec![CartItem::simple(catalog.burger, 1)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "k1").await.unwrap();
    let request = PaymentRequest::GratisClub { member_id: "m-77".into(), member_name: "Sam".into(), quantity: 1 };
    let err = api.pay(prep.order_id, request, "pk1").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ProductNotInClubAllowance(p) if p == catalog.burger));

    // Four sodas fit inside the allowance of five.
    let cart = vec![CartItem::simple(catalog.soda, 4)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "k2").await.unwrap();
    let request = PaymentRequest::GratisClub { member_id: "m-77".into(), member_name: "Sam".into(), quantity: 4 };
    let outcome = api.pay(prep.order_id, request, "pk2").await.unwrap();
    assert_eq!(outcome.method, PaymentMethod::GratisClub);
    assert_eq!(api.db().club_redemption_total("m-77").await.unwrap(), 4);

    // Two more would overshoot it.
    let cart = vec![CartItem::simple(catalog.soda, 2)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "k3").await.unwrap();
    let request = PaymentRequest::GratisClub { member_id: "m-77".into(), member_name: "Sam".into(), quantity: 2 };
    let err = api.pay(prep.order_id, request, "pk3").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ClubAllowanceExhausted { remaining: 1, requested: 2, .. }));
    tear_down(api).await;
}

#[tokio::test]
async fn concurrent_payments_deduct_once() {
    let (api, catalog) = setup().await;
    add_stock(api.db(), catalog.burger, 10).await;
    let cart = vec![CartItem::simple(catalog.burger, 2)];
    let prep = api.place_order(&walk_in(), &cart, OrderOrigin::Pos, "k1").await.unwrap();
    let api = Arc::new(api);
    let mut handles = Vec::new();
    for i in 0..4 {
        let api = api.clone();
        let order_id = prep.order_id;
        handles.push(tokio::spawn(async move {
            let request = PaymentRequest::Cash { amount_received: Cents::from(2400) };
            api.pay(order_id, request, &format!("pay-{i}")).await
        }));
    }
    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(OrderFlowError::InvalidTransition { .. }) => {},
            Err(e) => panic!("Unexpected payment error: {e}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(api.db().current_stock(catalog.burger).await.unwrap(), 8);
    info!("🔄️ Concurrent payment test complete");
    let api = Arc::try_unwrap(api).map_err(|_| ()).ok().unwrap();
    tear_down(api).await;
}
