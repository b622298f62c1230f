// Service wiring shared by the binary and the end-to-end tests.

use crate::core::shop::{
    AuditService, CatalogService, CurrencyService, EventNotifier, InventoryService, InviteService,
    MembershipService, PurchaseService, ShopConfig, ShopStore, WalletService,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Every shop service over one store and one notifier.
pub struct ShopServices<S: ShopStore> {
    pub membership: MembershipService<S>,
    pub currencies: CurrencyService<S>,
    pub wallet: WalletService<S>,
    pub catalog: CatalogService<S>,
    pub purchases: PurchaseService<S>,
    pub inventory: InventoryService<S>,
    pub invites: InviteService<S>,
    pub audit: AuditService<S>,
}

impl<S: ShopStore> ShopServices<S> {
    pub fn new(store: S, notifier: Arc<dyn EventNotifier>, config: ShopConfig) -> Self {
        Self {
            membership: MembershipService::new(store.clone(), notifier.clone(), config.clone()),
            currencies: CurrencyService::new(store.clone(), notifier.clone(), config.clone()),
            wallet: WalletService::new(store.clone(), notifier.clone()),
            catalog: CatalogService::new(store.clone(), notifier.clone()),
            purchases: PurchaseService::new(store.clone(), notifier.clone()),
            inventory: InventoryService::new(store.clone(), notifier.clone()),
            invites: InviteService::new(store.clone(), notifier, config.clone()),
            audit: AuditService::new(store, config),
        }
    }
}

/// Periodically delete expired and deactivated invites.
pub fn spawn_invite_cleanup<S: ShopStore>(
    services: Arc<ShopServices<S>>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tracing::debug!("Invite cleanup tick");
            if let Err(e) = services.invites.cleanup_invites(Utc::now()).await {
                tracing::warn!("Invite cleanup failed: {}", e);
            }
            sleep(every).await;
        }
    })
}

/// Periodically remove currencies left inactive by a deferred purge.
pub fn spawn_currency_sweep<S: ShopStore>(
    services: Arc<ShopServices<S>>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tracing::debug!("Currency sweep tick");
            match services.currencies.purge_inactive_currencies().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Swept inactive currencies"),
                Err(e) => tracing::warn!("Currency sweep failed: {}", e),
            }
            sleep(every).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shop::{
        GrantTarget, Price, ProductDraft, ShopError, ShopEvent, WalletMode,
    };
    use crate::infra::notify::SubscriberHub;
    use crate::infra::shop::InMemoryShopStore;

    #[tokio::test]
    async fn invite_join_fund_and_buy() {
        let hub = Arc::new(SubscriberHub::new());
        let services = ShopServices::new(
            InMemoryShopStore::new(),
            hub.clone(),
            ShopConfig::default(),
        );

        let (shop, owner) = services.membership.create_shop(10, "Bazaar").await.unwrap();
        let mut events = hub.subscribe(shop.id);

        let invite = services.invites.create_invite(&owner, None).await.unwrap();
        let alice = services
            .membership
            .join_shop(&invite.code, 20, "Alice")
            .await
            .unwrap();
        let bob = services.membership.join_shop(&invite.code, 30, "Bob").await.unwrap();

        let gold = services.currencies.list_currencies(&owner).await.unwrap()[0].id;
        services
            .wallet
            .grant(&owner, GrantTarget::Member(alice.id), gold, 9)
            .await
            .unwrap();
        services
            .wallet
            .grant(&owner, GrantTarget::Member(bob.id), gold, 4)
            .await
            .unwrap();

        let stall = services.catalog.create_stall(&owner, "Front", None).await.unwrap();
        let rope = services
            .catalog
            .create_product(
                &owner,
                stall.id,
                ProductDraft::new("Rope", 3).priced(Price::Priced {
                    amount: 3,
                    currency_id: gold,
                }),
            )
            .await
            .unwrap();

        let receipt = services.purchases.purchase(&alice, rope.id, 2).await.unwrap();
        assert_eq!(receipt.cost, 6);
        assert_eq!(receipt.balance.after, 3);
        assert!(matches!(
            services.purchases.purchase(&bob, rope.id, 2).await,
            Err(ShopError::InsufficientStock { requested: 2, available: 1 })
        ));

        services
            .wallet
            .switch_wallet_mode(&owner, WalletMode::Team)
            .await
            .unwrap();
        let summary = services.membership.shop_summary(&owner).await.unwrap();
        let pooled = summary
            .team_balances
            .iter()
            .find(|b| b.currency_id == gold)
            .map(|b| b.amount);
        assert_eq!(pooled, Some(7));

        let inventory = services.inventory.list_inventory(&alice, None).await.unwrap();
        assert_eq!(inventory[0].quantity, 2);
        assert!(!services.audit.list_logs(&owner, None).await.unwrap().is_empty());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&ShopEvent::Purchase {
            shop_id: shop.id,
            member_id: alice.id,
            product_id: rope.id,
        }));
        assert!(seen.contains(&ShopEvent::WalletModeChanged {
            shop_id: shop.id,
            mode: WalletMode::Team,
        }));
    }
}
