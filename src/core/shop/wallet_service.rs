// Wallet mode controller and balance adjustments.
//
// The PERSONAL <-> TEAM transfer is serialized by the shop's `is_switching`
// flag: acquired with a committed compare-and-swap, released by the transfer
// transaction itself, and force-released if that transaction fails. Every
// other balance write checks the flag inside its own transaction.

use super::events::{EventNotifier, ShopEvent};
use super::ledger;
use super::shop_models::{
    BalanceChange, BalanceOwner, LogKind, Member, NewLog, Shop, WalletMode,
};
use super::shop_store::{
    ensure_customer, ensure_manager, require_active_currency, require_customer,
    require_idle_shop, require_shop, require_shop_member, ShopError, ShopStore, ShopTx,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Which ledger a manager grant is aimed at. Checked against the shop's
/// current wallet mode; a mismatch is rejected, never redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantTarget {
    Team,
    Member(i64),
}

pub struct WalletService<S: ShopStore> {
    store: S,
    notifier: Arc<dyn EventNotifier>,
}

impl<S: ShopStore> WalletService<S> {
    pub fn new(store: S, notifier: Arc<dyn EventNotifier>) -> Self {
        Self { store, notifier }
    }

    // ------------------------------------------------------------------------
    // Mode switch
    // ------------------------------------------------------------------------

    /// Move every customer's funds between the personal and team ledgers.
    ///
    /// Returns the shop unchanged when it is already in `target` mode.
    pub async fn switch_wallet_mode(
        &self,
        actor: &Member,
        target: WalletMode,
    ) -> Result<Shop, ShopError> {
        ensure_manager(actor)?;
        let shop_id = actor.shop_id;

        {
            let mut tx = self.store.begin().await?;
            let shop = require_shop(&mut tx, shop_id).await?;
            if shop.is_switching {
                return Err(ShopError::TransitionInProgress);
            }
            if shop.wallet_mode == target {
                return Ok(shop);
            }
        }

        if !self.store.try_lock_switching(shop_id).await? {
            return Err(ShopError::TransitionInProgress);
        }

        match self.transfer(actor, target).await {
            Ok((shop, moved)) => {
                info!(
                    shop_id,
                    actor_id = actor.id,
                    mode = target.as_str(),
                    currencies_moved = moved,
                    "Wallet mode switched"
                );
                self.notifier.publish(ShopEvent::WalletModeChanged {
                    shop_id,
                    mode: target,
                });
                self.notifier.publish(ShopEvent::BalancesChanged { shop_id });
                Ok(shop)
            }
            Err(e) => {
                // The transaction is already rolled back; only the flag remains.
                if let Err(unlock_err) = self.store.unlock_switching(shop_id).await {
                    warn!(
                        shop_id,
                        "Failed to release wallet switch lock: {}", unlock_err
                    );
                }
                Err(e)
            }
        }
    }

    /// The transfer transaction. Returns the updated shop and how many
    /// currencies had funds moved.
    async fn transfer(&self, actor: &Member, target: WalletMode) -> Result<(Shop, usize), ShopError> {
        let mut tx = self.store.begin().await?;
        let mut shop = require_shop(&mut tx, actor.shop_id).await?;
        let from = shop.wallet_mode;

        let customers: Vec<Member> = tx
            .list_members(shop.id)
            .await?
            .into_iter()
            .filter(Member::is_active_customer)
            .collect();
        if customers.is_empty() {
            return Err(ShopError::NoCustomers);
        }

        let currencies = tx.list_currencies(shop.id).await?;
        let mut moved = 0;
        for currency in &currencies {
            let transferred = match target {
                WalletMode::Team => pool_into_team(&mut tx, shop.id, currency.id, &customers).await?,
                WalletMode::Personal => {
                    split_team_pool(&mut tx, shop.id, currency.id, &customers).await?
                }
            };
            if transferred {
                moved += 1;
            }
        }

        shop.wallet_mode = target;
        shop.is_switching = false;
        tx.update_shop(&shop).await?;
        tx.append_log(
            NewLog::new(
                shop.id,
                LogKind::WalletMode,
                format!("wallet mode {} -> {}", from.as_str(), target.as_str()),
            )
            .actor(actor.id),
        )
        .await?;
        tx.commit().await?;

        Ok((shop, moved))
    }

    // ------------------------------------------------------------------------
    // Grants and self-adjustments
    // ------------------------------------------------------------------------

    /// Manager credit or debit on a customer's personal balance or the team pool.
    pub async fn grant(
        &self,
        actor: &Member,
        target: GrantTarget,
        currency_id: i64,
        amount: i64,
    ) -> Result<BalanceChange, ShopError> {
        ensure_manager(actor)?;
        let shop_id = actor.shop_id;

        let mut tx = self.store.begin().await?;
        let shop = require_idle_shop(&mut tx, shop_id).await?;
        let currency = require_active_currency(&mut tx, shop_id, currency_id).await?;

        let (owner, kind) = match (target, shop.wallet_mode) {
            (GrantTarget::Team, WalletMode::Team) => (BalanceOwner::Team(shop_id), LogKind::GrantTeam),
            (GrantTarget::Member(member_id), WalletMode::Personal) => {
                require_customer(&mut tx, shop_id, member_id).await?;
                (BalanceOwner::Member(member_id), LogKind::GrantPersonal)
            }
            (GrantTarget::Team, WalletMode::Personal) => {
                return Err(ShopError::BadRequest(
                    "the shop is not in team wallet mode".to_string(),
                ))
            }
            (GrantTarget::Member(_), WalletMode::Team) => {
                return Err(ShopError::BadRequest(
                    "personal balances cannot be adjusted in team wallet mode".to_string(),
                ))
            }
        };

        let change = ledger::apply_delta(&mut tx, owner, currency_id, amount).await?;
        let mut log = NewLog::new(
            shop_id,
            kind,
            format!("{} balance adjusted by {} ({})", owner.scope().as_str(), amount, currency.name),
        )
        .actor(actor.id)
        .currency(currency_id)
        .balance(owner, amount, change);
        if let BalanceOwner::Member(member_id) = owner {
            log = log.member(member_id);
        }
        tx.append_log(log).await?;
        tx.commit().await?;

        info!(shop_id, actor_id = actor.id, currency_id, amount, "Balance granted");
        self.notifier.publish(ShopEvent::BalancesChanged { shop_id });
        Ok(change)
    }

    /// Customer self-service adjustment, gated by the shop's allow switches.
    /// The funding ledger follows the shop's wallet mode. A zero amount is a
    /// no-op and returns `None`.
    pub async fn self_adjust(
        &self,
        actor: &Member,
        currency_id: i64,
        amount: i64,
    ) -> Result<Option<BalanceChange>, ShopError> {
        ensure_customer(actor)?;
        let shop_id = actor.shop_id;

        let mut tx = self.store.begin().await?;
        let shop = require_idle_shop(&mut tx, shop_id).await?;
        let currency = require_active_currency(&mut tx, shop_id, currency_id).await?;

        if amount > 0 && !shop.allow_customer_inc {
            return Err(ShopError::Forbidden("customers may not increase balances"));
        }
        if amount < 0 && !shop.allow_customer_dec {
            return Err(ShopError::Forbidden("customers may not decrease balances"));
        }
        if amount == 0 {
            return Ok(None);
        }

        let member = require_shop_member(&mut tx, shop_id, actor.id).await?;
        let owner = ledger::funding_owner(&shop, member.id);
        let kind = match owner {
            BalanceOwner::Member(_) => LogKind::SelfAdjustPersonal,
            BalanceOwner::Team(_) => LogKind::SelfAdjustTeam,
        };

        let change = ledger::apply_delta(&mut tx, owner, currency_id, amount).await?;
        tx.append_log(
            NewLog::new(
                shop_id,
                kind,
                format!(
                    "customer adjusted {} balance by {} ({})",
                    owner.scope().as_str(),
                    amount,
                    currency.name
                ),
            )
            .actor(member.id)
            .member(member.id)
            .currency(currency_id)
            .balance(owner, amount, change),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::BalancesChanged { shop_id });
        Ok(Some(change))
    }

    /// Toggle whether customers may raise or lower their own balances.
    /// `None` leaves a switch as it is.
    pub async fn set_customer_adjust(
        &self,
        actor: &Member,
        allow_inc: Option<bool>,
        allow_dec: Option<bool>,
    ) -> Result<Shop, ShopError> {
        ensure_manager(actor)?;

        let mut tx = self.store.begin().await?;
        let mut shop = require_shop(&mut tx, actor.shop_id).await?;
        if let Some(allow) = allow_inc {
            shop.allow_customer_inc = allow;
        }
        if let Some(allow) = allow_dec {
            shop.allow_customer_dec = allow;
        }
        tx.update_shop(&shop).await?;
        tx.append_log(
            NewLog::new(
                shop.id,
                LogKind::CustomerAdjust,
                format!(
                    "customer self-adjust: increase {}, decrease {}",
                    on_off(shop.allow_customer_inc),
                    on_off(shop.allow_customer_dec)
                ),
            )
            .actor(actor.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::ShopUpdated { shop_id: shop.id });
        Ok(shop)
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Sum the customers' personal balances into the team pool.
/// Returns whether anything moved.
async fn pool_into_team<T: ShopTx>(
    tx: &mut T,
    shop_id: i64,
    currency_id: i64,
    customers: &[Member],
) -> Result<bool, ShopError> {
    let mut total: i64 = 0;
    for customer in customers {
        let amount = ledger::zero(tx, BalanceOwner::Member(customer.id), currency_id).await?;
        total = total
            .checked_add(amount)
            .ok_or_else(|| ShopError::InvalidAmount("pooled balance overflows".to_string()))?;
    }
    if total == 0 {
        return Ok(false);
    }
    ledger::apply_delta(tx, BalanceOwner::Team(shop_id), currency_id, total).await?;
    Ok(true)
}

/// Split the team pool evenly across customers (ordered by id ascending).
/// The remainder goes to the last customer so the total is conserved.
async fn split_team_pool<T: ShopTx>(
    tx: &mut T,
    shop_id: i64,
    currency_id: i64,
    customers: &[Member],
) -> Result<bool, ShopError> {
    let total = ledger::zero(tx, BalanceOwner::Team(shop_id), currency_id).await?;
    if total == 0 {
        return Ok(false);
    }

    let shares = split_evenly(total, customers.len() as i64);
    for (customer, share) in customers.iter().zip(shares) {
        if share != 0 {
            ledger::apply_delta(tx, BalanceOwner::Member(customer.id), currency_id, share).await?;
        }
    }
    Ok(true)
}

/// `n` shares of `total`: `total / n` each, the last one also takes the remainder.
fn split_evenly(total: i64, n: i64) -> Vec<i64> {
    let base = total.div_euclid(n);
    let remainder = total.rem_euclid(n);
    let mut shares = vec![base; n as usize];
    if let Some(last) = shares.last_mut() {
        *last += remainder;
    }
    shares
}
