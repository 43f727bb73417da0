//! Cart expansion.
//!
//! The composer turns a raw cart into priced order lines. Simple products become one line each.
//! Menu products become a bundle line carrying the menu's flat price, followed by one zero-priced
//! component line per slot, recording the chosen option and a snapshot of the slot name. The
//! bundle line carries no stock; its components do.

use std::collections::HashMap;

use log::*;

use crate::{
    db::traits::{CatalogManagement, InventoryManagement},
    db_types::{Cents, NewOrder, NewOrderLine, OrderOrigin, Product, ProductType},
    engine_api::{
        errors::CheckoutError,
        order_objects::{CartItem, CustomerInfo, PreparedCheckout},
    },
};

#[derive(Debug, Clone)]
pub struct CheckoutComposer<B> {
    db: B,
}

impl<B> CheckoutComposer<B>
where B: CatalogManagement + InventoryManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Expands `cart` into a persistable order. Validation happens in catalog order: quantities,
    /// product existence and availability, then menu slot selections. Finishes with a soft stock
    /// check so that obviously unfillable carts are refused up front; the authoritative check
    /// happens again inside the payment transaction.
    pub async fn prepare(
        &self,
        customer: &CustomerInfo,
        cart: &[CartItem],
        origin: OrderOrigin,
    ) -> Result<PreparedCheckout, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        for item in cart {
            if item.quantity <= 0 {
                return Err(CheckoutError::InvalidQuantity { product_id: item.product_id, quantity: item.quantity });
            }
        }
        let products = self.load_referenced_products(cart).await?;
        let mut lines: Vec<NewOrderLine> = Vec::new();
        let mut total = Cents::default();
        for item in cart {
            let product = lookup(&products, item.product_id)?;
            match product.product_type {
                ProductType::Simple => {
                    lines.push(NewOrderLine::simple(product, item.quantity));
                },
                ProductType::Menu => {
                    self.expand_menu(product, item, &products, &mut lines).await?;
                },
            }
            total += product.price * item.quantity;
        }
        self.soft_stock_check(&lines).await?;
        debug!("🔄️ Cart of {} items expanded into {} lines, total {total}", cart.len(), lines.len());
        let order = NewOrder {
            customer_id: customer.customer_id.clone(),
            contact_email: customer.contact_email.clone(),
            total,
            origin,
        };
        Ok(PreparedCheckout { order, lines })
    }

    /// One catalog round trip for every product the cart mentions, options included.
    async fn load_referenced_products(&self, cart: &[CartItem]) -> Result<HashMap<i64, Product>, CheckoutError> {
        let mut ids: Vec<i64> = cart
            .iter()
            .flat_map(|item| std::iter::once(item.product_id).chain(item.selections.values().copied()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        let products = self.db.products_by_ids(&ids).await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn expand_menu(
        &self,
        menu: &Product,
        item: &CartItem,
        products: &HashMap<i64, Product>,
        lines: &mut Vec<NewOrderLine>,
    ) -> Result<(), CheckoutError> {
        let slots = self.db.slots_for_menu(menu.id).await?;
        // A selection naming a slot this menu does not have is a malformed request.
        for slot_id in item.selections.keys() {
            if !slots.iter().any(|def| def.slot.id == *slot_id) {
                return Err(CheckoutError::SlotNotOnMenu { menu_product_id: menu.id, slot_id: *slot_id });
            }
        }
        let bundle_index = lines.len();
        lines.push(NewOrderLine::bundle(menu, item.quantity));
        for def in &slots {
            let chosen = item.selections.get(&def.slot.id).copied().ok_or(CheckoutError::MissingSlotSelection {
                menu_product_id: menu.id,
                slot_id: def.slot.id,
                slot_name: def.slot.name.clone(),
            })?;
            // A slot with an empty option set makes the menu unorderable.
            if !def.option_product_ids.contains(&chosen) {
                return Err(CheckoutError::OptionNotEligible { slot_id: def.slot.id, option_product_id: chosen });
            }
            let option = lookup(products, chosen)?;
            lines.push(NewOrderLine::component(option, item.quantity, bundle_index, &def.slot));
        }
        Ok(())
    }

    /// Advisory only. A pass here does not reserve anything.
    async fn soft_stock_check(&self, lines: &[NewOrderLine]) -> Result<(), CheckoutError> {
        let mut required: HashMap<i64, i64> = HashMap::new();
        for line in lines.iter().filter(|l| l.carries_stock()) {
            *required.entry(line.product_id).or_insert(0) += line.quantity;
        }
        let ids: Vec<i64> = required.keys().copied().collect();
        let available = self.db.current_stock_batch(&ids).await?;
        for (product_id, requested) in required {
            let available = available.get(&product_id).copied().unwrap_or(0);
            if available < requested {
                info!("🔄️ Cart refused: product {product_id} has {available} in stock, cart wants {requested}");
                return Err(CheckoutError::InsufficientStock { product_id, requested, available });
            }
        }
        Ok(())
    }
}

fn lookup(products: &HashMap<i64, Product>, product_id: i64) -> Result<&Product, CheckoutError> {
    let product = products.get(&product_id).ok_or(CheckoutError::UnknownProduct(product_id))?;
    if !product.active {
        return Err(CheckoutError::InactiveProduct(product_id));
    }
    Ok(product)
}
