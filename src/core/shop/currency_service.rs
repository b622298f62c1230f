// Currency registry - per-shop currencies and their destructive removal.
//
// Deleting a currency is two-phase: deactivation (balances zeroed, prices
// detached) is always synchronous and atomic; physical removal of the row
// happens in the same transaction or later in a background sweep, depending
// on the configured purge policy.

use super::events::{EventNotifier, ShopEvent};
use super::ledger;
use super::pricing;
use super::shop_config::{CurrencyPurgePolicy, ShopConfig};
use super::shop_models::{BalanceOwner, Currency, LogKind, Member, NewLog, Price};
use super::shop_store::{clean_name, ensure_manager, require_idle_shop, ShopError, ShopStore, ShopTx};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a currency purge removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyPurge {
    pub currency_id: i64,
    pub team_zeroed: i64,
    pub personal_zeroed: i64,
    pub products_disabled: usize,
    /// The row itself is gone (immediate policy).
    pub removed: bool,
}

pub struct CurrencyService<S: ShopStore> {
    store: S,
    notifier: Arc<dyn EventNotifier>,
    config: ShopConfig,
}

impl<S: ShopStore> CurrencyService<S> {
    pub fn new(store: S, notifier: Arc<dyn EventNotifier>, config: ShopConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Every currency of the actor's shop, active or not, ordered by id.
    pub async fn list_currencies(&self, actor: &Member) -> Result<Vec<Currency>, ShopError> {
        let mut tx = self.store.begin().await?;
        tx.list_currencies(actor.shop_id).await
    }

    pub async fn create(&self, actor: &Member, name: &str) -> Result<Currency, ShopError> {
        ensure_manager(actor)?;
        let name = clean_name(name)?;

        let mut tx = self.store.begin().await?;
        let currency = tx.insert_currency(actor.shop_id, &name).await?;
        tx.append_log(
            NewLog::new(
                actor.shop_id,
                LogKind::CurrencyCreate,
                format!("created currency {} (id {})", name, currency.id),
            )
            .actor(actor.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::CurrenciesChanged {
            shop_id: actor.shop_id,
        });
        Ok(currency)
    }

    pub async fn rename(
        &self,
        actor: &Member,
        currency_id: i64,
        name: &str,
    ) -> Result<Currency, ShopError> {
        ensure_manager(actor)?;
        let name = clean_name(name)?;

        let mut tx = self.store.begin().await?;
        let mut currency = find_currency(&mut tx, actor.shop_id, currency_id).await?;
        let old_name = std::mem::replace(&mut currency.name, name);
        tx.update_currency(&currency).await?;
        tx.append_log(
            NewLog::new(
                actor.shop_id,
                LogKind::CurrencyRename,
                format!("renamed currency {} -> {}", old_name, currency.name),
            )
            .actor(actor.id)
            .currency(currency.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::CurrenciesChanged {
            shop_id: actor.shop_id,
        });
        Ok(currency)
    }

    /// Deactivate a currency and wipe everything that depends on it.
    ///
    /// In one transaction: the currency stops being usable, the team pool and
    /// every member balance in it are zeroed, and products priced in it move
    /// to DISABLED_CURRENCY. Irreversible for balances, hence `confirm`.
    pub async fn deactivate_and_purge(
        &self,
        actor: &Member,
        currency_id: i64,
        confirm: bool,
    ) -> Result<CurrencyPurge, ShopError> {
        ensure_manager(actor)?;
        if !confirm {
            return Err(ShopError::BadRequest(
                "deleting a currency must be confirmed".to_string(),
            ));
        }
        let shop_id = actor.shop_id;

        let mut tx = self.store.begin().await?;
        // Balances must not move under a running wallet transfer.
        require_idle_shop(&mut tx, shop_id).await?;
        let mut currency = find_currency(&mut tx, shop_id, currency_id).await?;

        currency.is_active = false;
        tx.update_currency(&currency).await?;

        let team_zeroed = ledger::zero(&mut tx, BalanceOwner::Team(shop_id), currency_id).await?;
        let personal_zeroed = tx.member_balance_total(shop_id, currency_id).await?;
        tx.zero_member_balances(shop_id, currency_id).await?;

        let products_disabled =
            pricing::disable_currency_prices(&mut tx, shop_id, currency_id, Price::DisabledCurrency)
                .await?;

        let removed = self.config.currency_purge == CurrencyPurgePolicy::Immediate;
        if removed {
            remove_currency_row(&mut tx, shop_id, currency_id).await?;
        }

        let mut log = NewLog::new(
            shop_id,
            LogKind::CurrencyDelete,
            format!(
                "deleted currency {} (team pool {} and personal total {} zeroed, {} products lost their price)",
                currency.name, team_zeroed, personal_zeroed, products_disabled
            ),
        )
        .actor(actor.id);
        if !removed {
            log = log.currency(currency_id);
        }
        tx.append_log(log).await?;
        tx.commit().await?;

        info!(
            shop_id,
            currency_id,
            team_zeroed,
            personal_zeroed,
            products_disabled,
            removed,
            "Currency purged"
        );

        self.notifier.publish(ShopEvent::CurrenciesChanged { shop_id });
        self.notifier.publish(ShopEvent::BalancesChanged { shop_id });
        self.notifier.publish(ShopEvent::ProductsChanged { shop_id });

        Ok(CurrencyPurge {
            currency_id,
            team_zeroed,
            personal_zeroed,
            products_disabled,
            removed,
        })
    }

    /// Background sweep: physically remove up to one batch of inactive
    /// currencies, each in its own transaction. Failures are logged and
    /// skipped so one bad row cannot stall the sweep.
    pub async fn purge_inactive_currencies(&self) -> Result<usize, ShopError> {
        let inactive = {
            let mut tx = self.store.begin().await?;
            tx.list_inactive_currencies(self.config.currency_sweep_batch)
                .await?
        };
        if inactive.is_empty() {
            debug!("No inactive currencies to sweep");
            return Ok(0);
        }

        let mut removed = 0;
        for currency in inactive {
            match self.sweep_one(&currency).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    shop_id = currency.shop_id,
                    currency_id = currency.id,
                    "Failed to sweep inactive currency: {}",
                    e
                ),
            }
        }

        info!(removed, "Inactive currency sweep finished");
        Ok(removed)
    }

    async fn sweep_one(&self, currency: &Currency) -> Result<(), ShopError> {
        let mut tx = self.store.begin().await?;
        // A product still pointing here would block the delete.
        pricing::disable_currency_prices(&mut tx, currency.shop_id, currency.id, Price::Unpriced)
            .await?;
        remove_currency_row(&mut tx, currency.shop_id, currency.id).await?;
        tx.commit().await
    }
}

async fn find_currency<T: ShopTx>(
    tx: &mut T,
    shop_id: i64,
    currency_id: i64,
) -> Result<Currency, ShopError> {
    match tx.get_currency(currency_id).await? {
        Some(currency) if currency.shop_id == shop_id => Ok(currency),
        _ => Err(ShopError::NotFound("currency")),
    }
}

/// Drop the balance rows, detach the audit history and delete the row.
async fn remove_currency_row<T: ShopTx>(
    tx: &mut T,
    shop_id: i64,
    currency_id: i64,
) -> Result<(), ShopError> {
    tx.delete_balances_for_currency(currency_id).await?;
    tx.detach_log_currency(shop_id, currency_id).await?;
    tx.delete_currency(currency_id).await
}
