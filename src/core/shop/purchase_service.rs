// Purchase transaction - debit, stock decrement, inventory credit and audit
// row, all committed together or not at all.

use super::events::{EventNotifier, ShopEvent};
use super::ledger;
use super::pricing;
use super::shop_models::{BalanceChange, LogKind, LogScope, Member, NewLog};
use super::shop_store::{
    ensure_customer, require_idle_shop, require_shop_member, ShopError, ShopStore, ShopTx,
};
use std::sync::Arc;
use tracing::info;

/// What a committed purchase did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub member_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub cost: i64,
    pub currency_id: i64,
    /// Ledger the cost was taken from.
    pub scope: LogScope,
    pub balance: BalanceChange,
    /// Remaining stock, `None` for unlimited products.
    pub stock_left: Option<i64>,
}

pub struct PurchaseService<S: ShopStore> {
    store: S,
    notifier: Arc<dyn EventNotifier>,
}

impl<S: ShopStore> PurchaseService<S> {
    pub fn new(store: S, notifier: Arc<dyn EventNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Buy `quantity` units of a product for the acting customer.
    pub async fn purchase(
        &self,
        actor: &Member,
        product_id: i64,
        quantity: i64,
    ) -> Result<PurchaseReceipt, ShopError> {
        ensure_customer(actor)?;
        if quantity < 1 {
            return Err(ShopError::InvalidQuantity);
        }
        let shop_id = actor.shop_id;

        // Cheap early rejection; the authoritative check runs inside the
        // purchase transaction below.
        {
            let mut tx = self.store.begin().await?;
            require_idle_shop(&mut tx, shop_id).await?;
        }

        let mut tx = self.store.begin().await?;
        let shop = require_idle_shop(&mut tx, shop_id).await?;

        let mut product = match tx.get_product(product_id).await? {
            Some(product) if product.shop_id == shop_id => product,
            _ => return Err(ShopError::NotFound("product")),
        };
        if !product.is_active {
            return Err(ShopError::Inactive);
        }
        let (unit_price, currency) = pricing::purchasable_price(&mut tx, &product).await?;

        if product.is_limit_stock && product.stock < quantity {
            return Err(ShopError::InsufficientStock {
                requested: quantity,
                available: product.stock,
            });
        }

        let cost = unit_price
            .checked_mul(quantity)
            .ok_or_else(|| ShopError::InvalidAmount("purchase cost overflows".to_string()))?;

        // The role may have changed since the actor was resolved.
        let member = require_shop_member(&mut tx, shop_id, actor.id).await?;
        ensure_customer(&member)?;
        let owner = ledger::funding_owner(&shop, member.id);
        let balance = ledger::apply_delta(&mut tx, owner, currency.id, -cost).await?;

        let stock_left = if product.is_limit_stock {
            product.stock -= quantity;
            tx.update_product(&product).await?;
            Some(product.stock)
        } else {
            None
        };

        credit_inventory(&mut tx, member.id, &product.name, quantity).await?;

        tx.append_log(
            NewLog::new(
                shop_id,
                LogKind::Purchase,
                format!("bought {} x{} ({})", product.name, quantity, currency.name),
            )
            .actor(member.id)
            .member(member.id)
            .currency(currency.id)
            .balance(owner, -cost, balance),
        )
        .await?;
        tx.commit().await?;

        info!(
            shop_id,
            member_id = member.id,
            product_id,
            quantity,
            cost,
            scope = owner.scope().as_str(),
            "Purchase committed"
        );

        self.notifier.publish(ShopEvent::Purchase {
            shop_id,
            member_id: member.id,
            product_id,
        });
        self.notifier.publish(ShopEvent::BalancesChanged { shop_id });
        self.notifier.publish(ShopEvent::ProductStockChanged {
            shop_id,
            product_id,
        });

        Ok(PurchaseReceipt {
            member_id: member.id,
            product_id,
            quantity,
            cost,
            currency_id: currency.id,
            scope: owner.scope(),
            balance,
            stock_left,
        })
    }
}

/// Add `quantity` of an item to a member's inventory, appending a new row
/// at the end of their ordering when they do not own it yet.
pub(crate) async fn credit_inventory<T: ShopTx>(
    tx: &mut T,
    member_id: i64,
    name: &str,
    quantity: i64,
) -> Result<(), ShopError> {
    match tx.get_inventory_item(member_id, name).await? {
        Some(mut item) => {
            item.quantity = item
                .quantity
                .checked_add(quantity)
                .ok_or(ShopError::InvalidQuantity)?;
            tx.update_inventory_item(&item).await
        }
        None => {
            let sort_order = tx.max_inventory_sort(member_id).await? + 1;
            tx.insert_inventory_item(member_id, name, quantity, sort_order)
                .await
                .map(|_| ())
        }
    }
}
