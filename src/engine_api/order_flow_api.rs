//! The primary fulfillment flow: idempotent order creation, payment capture, wallet-gateway
//! hand-off, cancellation and refunds.
//!
//! Stock is deducted exactly once per order, inside the transaction that commits the
//! pending → paid transition. Order creation never touches the ledger, so abandoned carts can
//! never strand stock.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use log::*;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::{timeout, Duration};

use crate::{
    db::traits::{
        CatalogManagement,
        FulfillmentDatabase,
        IdempotencyManagement,
        InventoryManagement,
        OrderManagement,
        PaidOrderSummary,
        StorageError,
    },
    db_types::{Cents, Order, OrderLine, OrderOrigin, OrderStatus, PaymentMethod},
    engine_api::{
        checkout::CheckoutComposer,
        errors::OrderFlowError,
        order_objects::{
            CartItem,
            CheckoutPreparation,
            ClubSettings,
            CustomerInfo,
            PaymentOutcome,
            PaymentRequest,
            PreparedLine,
            WalletCheckout,
        },
    },
    events::{EventProducers, InventoryHub, OrderAnnulledEvent, OrderPaidEvent, StockUpdate},
    gateway::{
        CheckoutLineItem,
        CheckoutUrls,
        CreateCheckoutRequest,
        GatewayError,
        GatewayTxStatus,
        PaymentGatewayClient,
        WebhookNotice,
    },
    helpers::{fingerprint, order_payment_scope, ORDER_CREATE_SCOPE},
};

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);
/// Cached idempotent responses outlive any realistic client retry window.
pub const DEFAULT_IDEMPOTENCY_TTL_HOURS: i64 = 24;

pub struct OrderFlowApi<B, G> {
    db: B,
    composer: CheckoutComposer<B>,
    producers: EventProducers,
    hub: Arc<InventoryHub>,
    gateway: Option<G>,
    club: ClubSettings,
    gateway_timeout: Duration,
    idempotency_ttl: ChronoDuration,
    currency: String,
}

impl<B, G> OrderFlowApi<B, G>
where
    B: FulfillmentDatabase + CatalogManagement + InventoryManagement + IdempotencyManagement + OrderManagement,
    G: PaymentGatewayClient,
{
    pub fn new(
        db: B,
        producers: EventProducers,
        hub: Arc<InventoryHub>,
        gateway: Option<G>,
        club: ClubSettings,
    ) -> Self {
        let composer = CheckoutComposer::new(db.clone());
        Self {
            db,
            composer,
            producers,
            hub,
            gateway,
            club,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            idempotency_ttl: ChronoDuration::hours(DEFAULT_IDEMPOTENCY_TTL_HOURS),
            currency: "CHF".to_string(),
        }
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_idempotency_ttl(mut self, ttl: ChronoDuration) -> Self {
        self.idempotency_ttl = ttl;
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Expands the cart and persists a pending order. Retrying with the same idempotency key
    /// returns the byte-identical first response and creates nothing new; reusing the key with a
    /// different cart is refused.
    pub async fn place_order(
        &self,
        customer: &CustomerInfo,
        cart: &[CartItem],
        origin: OrderOrigin,
        idempotency_key: &str,
    ) -> Result<CheckoutPreparation, OrderFlowError> {
        let fp = fingerprint(&(customer, cart, origin));
        if let Some(cached) = self.cached_response(ORDER_CREATE_SCOPE, idempotency_key, &fp).await? {
            debug!("🔄️ Replaying cached checkout for key '{idempotency_key}'");
            return Ok(cached);
        }
        let prepared = self.composer.prepare(customer, cart, origin).await?;
        let (order, lines) = self.db.insert_order_with_lines(prepared.order, prepared.lines).await?;
        let response = preparation_from(&order, &lines);
        let body = serde_json::to_string(&response).map_err(|e| OrderFlowError::Storage(e.to_string()))?;
        let winner = self
            .db
            .idempotency_save_if_absent(ORDER_CREATE_SCOPE, idempotency_key, &fp, &body, self.idempotency_ttl)
            .await?;
        if winner.response != body {
            // A concurrent request with the same key committed first. Our order is redundant.
            info!("🔄️ Checkout race on key '{idempotency_key}'. Discarding duplicate order #{}", order.id);
            let _ = self.db.discard_pending_order(order.id).await?;
            if winner.fingerprint != fp {
                return Err(OrderFlowError::IdempotencyKeyReuse);
            }
            return serde_json::from_str(&winner.response)
                .map_err(|e| OrderFlowError::BadCachedResponse(e.to_string()));
        }
        info!("🔄️ Order #{} placed ({} lines, total {})", order.id, response.lines.len(), response.total);
        Ok(response)
    }

    /// Captures an interactive payment (everything except the hosted wallet checkout). The
    /// deducting transaction re-validates stock; an oversold cart fails here and the order stays
    /// pending, so the operator can amend it and try again.
    pub async fn pay(
        &self,
        order_id: i64,
        request: PaymentRequest,
        idempotency_key: &str,
    ) -> Result<PaymentOutcome, OrderFlowError> {
        let scope = order_payment_scope(order_id);
        let fp = fingerprint(&request);
        if let Some(cached) = self.cached_response(&scope, idempotency_key, &fp).await? {
            debug!("🔄️ Replaying cached payment outcome for order #{order_id}");
            return Ok(cached);
        }
        let method = request.method();
        let mut change = Cents::default();
        let mut tx_ref: Option<String> = None;
        match &request {
            PaymentRequest::Cash { amount_received } => {
                let order =
                    self.db.order_by_id(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
                if *amount_received < order.total {
                    return Err(OrderFlowError::CashShort { received: *amount_received, total: order.total });
                }
                change = *amount_received - order.total;
            },
            PaymentRequest::Card { transaction_ref, .. } => {
                tx_ref = Some(transaction_ref.clone());
            },
            PaymentRequest::GratisClub { member_id, .. } => {
                self.check_club_allowance(order_id, member_id).await?;
            },
            PaymentRequest::GratisGuest | PaymentRequest::GratisVip | PaymentRequest::GratisStaff => {},
        }
        let summary = self.db.mark_order_paid(order_id, method, tx_ref.as_deref(), false).await?;
        if let PaymentRequest::GratisClub { member_id, member_name, .. } = &request {
            let units = top_level_units(&summary.lines);
            self.db.record_club_redemption(member_id, member_name, order_id, units).await?;
        }
        self.after_payment(&summary, method).await;
        let outcome = PaymentOutcome {
            order_id,
            status: summary.order.status,
            method,
            change,
            oversold: summary.oversold.clone(),
        };
        self.cache_response(&scope, idempotency_key, &fp, &outcome).await?;
        Ok(outcome)
    }

    /// Creates a hosted checkout session at the gateway and links its reference to the order.
    /// The order stays pending until the webhook lands.
    pub async fn start_wallet_payment(
        &self,
        order_id: i64,
        urls: CheckoutUrls,
    ) -> Result<WalletCheckout, OrderFlowError> {
        let gateway = self.gateway.as_ref().ok_or(GatewayError::NotConfigured)?;
        let order = self.db.order_by_id(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::Pending {
            return Err(OrderFlowError::InvalidTransition {
                order_id,
                from: order.status,
                to: OrderStatus::Paid,
            });
        }
        let lines = self.db.lines_for_order(order_id).await?;
        let request = CreateCheckoutRequest {
            order_id,
            amount: order.total,
            currency: self.currency.clone(),
            purpose: format!("Order #{order_id}"),
            customer_email: order.contact_email.clone(),
            success_url: urls.success_url,
            failed_url: urls.failed_url,
            cancel_url: urls.cancel_url,
            line_items: lines
                .iter()
                .filter(|l| l.parent_line_id.is_none())
                .map(|l| CheckoutLineItem { title: l.title.clone(), unit_price: l.unit_price, quantity: l.quantity })
                .collect(),
        };
        let checkout = match timeout(self.gateway_timeout, gateway.create_checkout(request)).await {
            Ok(result) => result?,
            Err(_) => return Err(GatewayError::Timeout.into()),
        };
        self.db.set_gateway_ref(order_id, &checkout.gateway_ref).await?;
        info!("🔄️ Order #{order_id} handed to gateway as '{}'", checkout.gateway_ref);
        Ok(WalletCheckout { order_id, gateway_ref: checkout.gateway_ref, redirect_url: checkout.redirect_url })
    }

    /// Ingests a settled-transaction webhook. Confirmations deduct stock even if it goes
    /// negative, since the customer's money has already moved; oversold products are reported
    /// for manual reconciliation. Replayed notices are no-ops.
    pub async fn confirm_wallet_payment(&self, notice: WebhookNotice) -> Result<PaymentOutcome, OrderFlowError> {
        let order = self
            .db
            .order_by_gateway_ref(&notice.gateway_ref)
            .await?
            .ok_or_else(|| OrderFlowError::GatewayRefNotFound(notice.gateway_ref.clone()))?;
        match notice.status {
            GatewayTxStatus::Confirmed => {
                if order.status == OrderStatus::Paid {
                    debug!("🔄️ Webhook replay for already-paid order #{}", order.id);
                    return Ok(settled_outcome(&order));
                }
                let summary = match self
                    .db
                    .mark_order_paid(order.id, PaymentMethod::Wallet, Some(&notice.transaction_ref), true)
                    .await
                {
                    Ok(summary) => summary,
                    // A concurrent delivery of the same notice won the transition between our
                    // status read and this update. Accept it as a replay.
                    Err(StorageError::InvalidStatusTransition { from: OrderStatus::Paid, .. }) => {
                        debug!("🔄️ Webhook replay raced the transition for order #{}", order.id);
                        let order = self
                            .db
                            .order_by_id(order.id)
                            .await?
                            .ok_or(OrderFlowError::OrderNotFound(order.id))?;
                        return Ok(settled_outcome(&order));
                    },
                    Err(e) => return Err(e.into()),
                };
                if let Some(email) = &notice.payer_email {
                    self.db.merge_contact_email(order.id, email).await?;
                }
                self.after_payment(&summary, PaymentMethod::Wallet).await;
                Ok(PaymentOutcome {
                    order_id: order.id,
                    status: summary.order.status,
                    method: PaymentMethod::Wallet,
                    change: Cents::default(),
                    oversold: summary.oversold,
                })
            },
            GatewayTxStatus::Failed | GatewayTxStatus::Cancelled => {
                // The order stays pending so the customer can retry with another method.
                // Cancellation is an explicit operator or customer action, never the gateway's.
                info!("🔄️ Gateway reported {:?} for order #{}. Order left as {}", notice.status, order.id, order.status);
                Ok(settled_outcome(&order))
            },
        }
    }

    /// Cancels a pending order. No stock was ever deducted for it, so the ledger is untouched.
    pub async fn cancel_order(&self, order_id: i64) -> Result<Order, OrderFlowError> {
        let order = self.db.cancel_pending_order(order_id).await?;
        let event = OrderAnnulledEvent::new(order.clone());
        for producer in &self.producers.order_annulled_producer {
            producer.publish_event(event.clone()).await;
        }
        Ok(order)
    }

    /// Refunds a paid order, appending compensating ledger entries that restore its stock.
    pub async fn refund_order(&self, order_id: i64) -> Result<PaidOrderSummary, OrderFlowError> {
        let summary = self.db.refund_paid_order(order_id).await?;
        self.publish_stock_changes(&summary);
        let event = OrderAnnulledEvent::new(summary.order.clone());
        for producer in &self.producers.order_annulled_producer {
            producer.publish_event(event.clone()).await;
        }
        Ok(summary)
    }

    async fn check_club_allowance(&self, order_id: i64, member_id: &str) -> Result<(), OrderFlowError> {
        let lines = self.db.lines_for_order(order_id).await?;
        if lines.is_empty() {
            return Err(OrderFlowError::OrderNotFound(order_id));
        }
        for line in lines.iter().filter(|l| l.parent_line_id.is_none()) {
            if !self.club.free_product_ids.contains(&line.product_id) {
                return Err(OrderFlowError::ProductNotInClubAllowance(line.product_id));
            }
        }
        let requested = top_level_units(&lines);
        let used = self.db.club_redemption_total(member_id).await?;
        let remaining = (self.club.max_redemptions_per_member - used).max(0);
        if requested > remaining {
            return Err(OrderFlowError::ClubAllowanceExhausted {
                member_id: member_id.to_string(),
                remaining,
                requested,
            });
        }
        Ok(())
    }

    async fn after_payment(&self, summary: &PaidOrderSummary, method: PaymentMethod) {
        self.publish_stock_changes(summary);
        let event = OrderPaidEvent::new(summary.order.clone(), method, summary.oversold.clone());
        for producer in &self.producers.order_paid_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    fn publish_stock_changes(&self, summary: &PaidOrderSummary) {
        for level in &summary.stock_changes {
            let delta: i64 = summary
                .lines
                .iter()
                .filter(|l| l.carries_stock() && l.product_id == level.product_id)
                .map(|l| match summary.order.status {
                    OrderStatus::Refunded => l.quantity,
                    _ => -l.quantity,
                })
                .sum();
            self.hub.publish(StockUpdate::new(level.product_id, level.stock, delta));
        }
    }

    async fn cached_response<T: DeserializeOwned>(
        &self,
        scope: &str,
        key: &str,
        fp: &str,
    ) -> Result<Option<T>, OrderFlowError> {
        match self.db.idempotency_get(scope, key).await? {
            None => Ok(None),
            Some(record) if record.fingerprint != fp => Err(OrderFlowError::IdempotencyKeyReuse),
            Some(record) => serde_json::from_str(&record.response)
                .map(Some)
                .map_err(|e| OrderFlowError::BadCachedResponse(e.to_string())),
        }
    }

    async fn cache_response<T: Serialize>(
        &self,
        scope: &str,
        key: &str,
        fp: &str,
        response: &T,
    ) -> Result<(), OrderFlowError> {
        let body = serde_json::to_string(response).map_err(|e| OrderFlowError::Storage(e.to_string()))?;
        let _ = self.db.idempotency_save_if_absent(scope, key, fp, &body, self.idempotency_ttl).await?;
        Ok(())
    }
}

fn preparation_from(order: &Order, lines: &[OrderLine]) -> CheckoutPreparation {
    CheckoutPreparation {
        order_id: order.id,
        total: order.total,
        lines: lines
            .iter()
            .map(|l| PreparedLine {
                line_id: l.id,
                product_id: l.product_id,
                title: l.title.clone(),
                unit_price: l.unit_price,
                quantity: l.quantity,
                menu_slot_name: l.menu_slot_name.clone(),
            })
            .collect(),
    }
}

fn settled_outcome(order: &Order) -> PaymentOutcome {
    PaymentOutcome {
        order_id: order.id,
        status: order.status,
        method: order.payment_method.unwrap_or(PaymentMethod::Wallet),
        change: Cents::default(),
        oversold: Vec::new(),
    }
}

/// Units across priced top-level lines. Components do not count; a menu counts once per bundle.
fn top_level_units(lines: &[OrderLine]) -> i64 {
    lines.iter().filter(|l| l.parent_line_id.is_none()).map(|l| l.quantity).sum()
}
