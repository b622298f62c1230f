// Shops and their members.
//
// `require_member` turns an authenticated user into the `Member` every
// other service takes as its actor.

use super::events::{EventNotifier, ShopEvent};
use super::shop_config::ShopConfig;
use super::shop_models::{
    Balance, BalanceOwner, Currency, LogKind, Member, MemberRole, NewLog, Shop,
};
use super::shop_store::{
    clean_name, ensure_customer, ensure_manager, require_idle_shop, require_shop,
    require_shop_member, ShopError, ShopStore, ShopTx,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// What a member sees when opening a shop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopSummary {
    pub shop: Shop,
    pub member: Member,
    pub currencies: Vec<Currency>,
    /// The caller's own balances; empty for managers.
    pub personal_balances: Vec<Balance>,
    pub team_balances: Vec<Balance>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopStats {
    pub members: usize,
    pub customers: usize,
    pub stalls: usize,
    pub products: usize,
    pub currencies: usize,
    pub inventory_items: usize,
}

pub struct MembershipService<S: ShopStore> {
    store: S,
    notifier: Arc<dyn EventNotifier>,
    config: ShopConfig,
}

impl<S: ShopStore> MembershipService<S> {
    pub fn new(store: S, notifier: Arc<dyn EventNotifier>, config: ShopConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    // ------------------------------------------------------------------------
    // Shops
    // ------------------------------------------------------------------------

    /// Create a shop with its owner member and the default currencies.
    pub async fn create_shop(&self, user_id: i64, name: &str) -> Result<(Shop, Member), ShopError> {
        let name = clean_name(name)?;

        let mut tx = self.store.begin().await?;
        let shop = tx.insert_shop(&name, user_id).await?;
        let owner = tx
            .insert_member(
                shop.id,
                Some(user_id),
                &self.config.owner_char_name,
                MemberRole::Owner,
            )
            .await?;
        for currency in &self.config.default_currencies {
            tx.insert_currency(shop.id, currency).await?;
        }
        tx.commit().await?;

        info!(shop_id = shop.id, user_id, "Shop created");
        Ok((shop, owner))
    }

    /// The caller's active membership, or `Forbidden`.
    pub async fn require_member(&self, shop_id: i64, user_id: i64) -> Result<Member, ShopError> {
        let mut tx = self.store.begin().await?;
        match tx.find_member(shop_id, user_id).await? {
            Some(member) if member.is_active => Ok(member),
            _ => Err(ShopError::Forbidden("not a member of this shop")),
        }
    }

    pub async fn update_shop(&self, actor: &Member, name: &str) -> Result<Shop, ShopError> {
        ensure_manager(actor)?;
        let name = clean_name(name)?;

        let mut tx = self.store.begin().await?;
        let mut shop = require_shop(&mut tx, actor.shop_id).await?;
        shop.name = name;
        tx.update_shop(&shop).await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::ShopUpdated { shop_id: shop.id });
        Ok(shop)
    }

    /// Delete the shop and everything it owns. Owner only.
    pub async fn delete_shop(&self, actor: &Member) -> Result<(), ShopError> {
        if actor.role != MemberRole::Owner {
            return Err(ShopError::Forbidden("only the owner may delete the shop"));
        }

        let mut tx = self.store.begin().await?;
        let shop = require_shop(&mut tx, actor.shop_id).await?;
        tx.delete_shop(shop.id).await?;
        tx.commit().await?;

        info!(shop_id = shop.id, "Shop deleted");
        self.notifier.publish(ShopEvent::ShopDeleted { shop_id: shop.id });
        Ok(())
    }

    pub async fn shop_summary(&self, actor: &Member) -> Result<ShopSummary, ShopError> {
        let mut tx = self.store.begin().await?;
        let shop = require_shop(&mut tx, actor.shop_id).await?;
        let currencies = tx.list_currencies(shop.id).await?;
        let personal_balances = if actor.role == MemberRole::Customer {
            tx.balances(BalanceOwner::Member(actor.id)).await?
        } else {
            Vec::new()
        };
        let team_balances = tx.balances(BalanceOwner::Team(shop.id)).await?;

        Ok(ShopSummary {
            shop,
            member: actor.clone(),
            currencies,
            personal_balances,
            team_balances,
        })
    }

    pub async fn shop_stats(&self, actor: &Member) -> Result<ShopStats, ShopError> {
        ensure_manager(actor)?;

        let mut tx = self.store.begin().await?;
        let shop = require_shop(&mut tx, actor.shop_id).await?;
        let members: Vec<Member> = tx
            .list_members(shop.id)
            .await?
            .into_iter()
            .filter(|m| m.is_active)
            .collect();
        let stalls = tx.list_stalls(shop.id).await?;

        let mut stats = ShopStats {
            members: members.len(),
            customers: members.iter().filter(|m| m.role == MemberRole::Customer).count(),
            stalls: stalls.len(),
            currencies: tx.list_currencies(shop.id).await?.len(),
            ..ShopStats::default()
        };
        for stall in &stalls {
            stats.products += tx.list_products(stall.id).await?.len();
        }
        for member in &members {
            stats.inventory_items += tx.list_inventory(member.id).await?.len();
        }
        Ok(stats)
    }

    // ------------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------------

    /// Join through an invite code. An existing active membership is
    /// returned as is; an inactive one is reactivated as a customer.
    pub async fn join_shop(
        &self,
        invite_code: &str,
        user_id: i64,
        char_name: &str,
    ) -> Result<Member, ShopError> {
        let char_name = clean_name(char_name)?;

        let mut tx = self.store.begin().await?;
        let invite = match tx.find_invite(invite_code.trim()).await? {
            Some(invite) if invite.is_usable(Utc::now()) => invite,
            _ => return Err(ShopError::NotFound("invite")),
        };
        let shop = require_shop(&mut tx, invite.shop_id).await?;

        let member = match tx.find_member(shop.id, user_id).await? {
            Some(member) if member.is_active => return Ok(member),
            Some(mut member) => {
                member.is_active = true;
                member.role = MemberRole::Customer;
                member.char_name = char_name;
                tx.update_member(&member).await?;
                member
            }
            None => {
                tx.insert_member(shop.id, Some(user_id), &char_name, MemberRole::Customer)
                    .await?
            }
        };
        tx.commit().await?;

        info!(shop_id = shop.id, member_id = member.id, "Member joined");
        self.notifier.publish(ShopEvent::MemberJoined { shop_id: shop.id });
        Ok(member)
    }

    /// Customers may leave; their balances and inventory stay for a rejoin.
    pub async fn leave_shop(&self, actor: &Member) -> Result<(), ShopError> {
        ensure_customer(actor)?;

        let mut tx = self.store.begin().await?;
        let mut member = require_shop_member(&mut tx, actor.shop_id, actor.id).await?;
        member.is_active = false;
        tx.update_member(&member).await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::MemberLeft {
            shop_id: actor.shop_id,
        });
        Ok(())
    }

    /// Active members ordered by id.
    pub async fn list_members(&self, actor: &Member) -> Result<Vec<Member>, ShopError> {
        let mut tx = self.store.begin().await?;
        Ok(tx
            .list_members(actor.shop_id)
            .await?
            .into_iter()
            .filter(|m| m.is_active)
            .collect())
    }

    /// Appoint or demote a clerk. Owner only; the owner row cannot change.
    pub async fn set_member_role(
        &self,
        actor: &Member,
        member_id: i64,
        role: MemberRole,
    ) -> Result<Member, ShopError> {
        if actor.role != MemberRole::Owner {
            return Err(ShopError::Forbidden("only the owner may change roles"));
        }
        if role == MemberRole::Owner {
            return Err(ShopError::BadRequest(
                "ownership cannot be assigned".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let mut target = require_shop_member(&mut tx, actor.shop_id, member_id).await?;
        if target.role == MemberRole::Owner {
            return Err(ShopError::BadRequest("the owner's role cannot change".to_string()));
        }
        target.role = role;
        tx.update_member(&target).await?;
        tx.append_log(
            NewLog::new(
                actor.shop_id,
                LogKind::MemberRole,
                format!("role set to {}", role.as_str()),
            )
            .actor(actor.id)
            .member(target.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::MemberRoleChanged {
            shop_id: actor.shop_id,
            member_id: target.id,
        });
        Ok(target)
    }

    /// Deactivate another member. Nobody kicks the owner or themselves, and
    /// clerks may only kick customers.
    pub async fn kick_member(&self, actor: &Member, member_id: i64) -> Result<(), ShopError> {
        ensure_manager(actor)?;
        if actor.id == member_id {
            return Err(ShopError::BadRequest("you cannot kick yourself".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let mut target = require_shop_member(&mut tx, actor.shop_id, member_id).await?;
        if target.role == MemberRole::Owner {
            return Err(ShopError::BadRequest("the owner cannot be kicked".to_string()));
        }
        if actor.role == MemberRole::Clerk && target.role != MemberRole::Customer {
            return Err(ShopError::Forbidden("clerks may only kick customers"));
        }
        target.is_active = false;
        tx.update_member(&target).await?;
        tx.append_log(
            NewLog::new(
                actor.shop_id,
                LogKind::MemberKick,
                format!("kicked member {}", target.id),
            )
            .actor(actor.id)
            .member(target.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::MemberKicked {
            shop_id: actor.shop_id,
            member_id: target.id,
        });
        Ok(())
    }

    pub async fn update_char_name(&self, actor: &Member, char_name: &str) -> Result<Member, ShopError> {
        let char_name = clean_name(char_name)?;

        let mut tx = self.store.begin().await?;
        require_idle_shop(&mut tx, actor.shop_id).await?;
        let mut member = require_shop_member(&mut tx, actor.shop_id, actor.id).await?;
        member.char_name = char_name;
        tx.update_member(&member).await?;
        tx.append_log(
            NewLog::new(
                actor.shop_id,
                LogKind::CharName,
                format!("character name changed to {}", member.char_name),
            )
            .actor(member.id)
            .member(member.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::MemberUpdated {
            shop_id: actor.shop_id,
            member_id: member.id,
        });
        Ok(member)
    }
}
