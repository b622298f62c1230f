// Customer inventories - quantities per item name, ordered by the customer.

use super::events::{EventNotifier, ShopEvent};
use super::shop_models::{InventoryItem, LogKind, Member, MemberRole, NewLog};
use super::shop_store::{
    clean_name, ensure_customer, ensure_manager, ensure_permutation, require_customer,
    require_idle_shop, ShopError, ShopStore, ShopTx,
};
use std::sync::Arc;

pub struct InventoryService<S: ShopStore> {
    store: S,
    notifier: Arc<dyn EventNotifier>,
}

impl<S: ShopStore> InventoryService<S> {
    pub fn new(store: S, notifier: Arc<dyn EventNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Customers see their own inventory; managers must name a customer.
    pub async fn list_inventory(
        &self,
        actor: &Member,
        member_id: Option<i64>,
    ) -> Result<Vec<InventoryItem>, ShopError> {
        let mut tx = self.store.begin().await?;
        let target = self.resolve_target(&mut tx, actor, member_id).await?;
        tx.list_inventory(target).await
    }

    /// Manager adjustment of a customer's item. Returns the row as it is
    /// afterwards, `None` once the quantity dropped to zero or below.
    pub async fn adjust(
        &self,
        actor: &Member,
        member_id: i64,
        name: &str,
        delta: i64,
    ) -> Result<Option<InventoryItem>, ShopError> {
        ensure_manager(actor)?;
        let name = clean_name(name)?;

        let mut tx = self.store.begin().await?;
        require_customer(&mut tx, actor.shop_id, member_id).await?;
        self.apply(tx, actor, member_id, &name, delta, LogKind::InventoryAdjust)
            .await
    }

    /// Customer adjustment of their own item. Zero is a no-op.
    pub async fn self_adjust(
        &self,
        actor: &Member,
        name: &str,
        delta: i64,
    ) -> Result<Option<InventoryItem>, ShopError> {
        ensure_customer(actor)?;
        let name = clean_name(name)?;

        let mut tx = self.store.begin().await?;
        require_idle_shop(&mut tx, actor.shop_id).await?;
        if delta == 0 {
            return tx.get_inventory_item(actor.id, &name).await;
        }
        self.apply(tx, actor, actor.id, &name, delta, LogKind::SelfInventoryAdjust)
            .await
    }

    async fn apply(
        &self,
        mut tx: S::Tx,
        actor: &Member,
        member_id: i64,
        name: &str,
        delta: i64,
        kind: LogKind,
    ) -> Result<Option<InventoryItem>, ShopError> {
        let existing = tx.get_inventory_item(member_id, name).await?;
        let before = existing.as_ref().map_or(0, |item| item.quantity);
        let after = before
            .checked_add(delta)
            .ok_or(ShopError::InvalidQuantity)?;

        let item = match existing {
            Some(item) if after <= 0 => {
                tx.delete_inventory_item(item.id).await?;
                None
            }
            Some(mut item) => {
                item.quantity = after;
                tx.update_inventory_item(&item).await?;
                Some(item)
            }
            None if after <= 0 => None,
            None => {
                let sort_order = tx.max_inventory_sort(member_id).await? + 1;
                Some(
                    tx.insert_inventory_item(member_id, name, after, sort_order)
                        .await?,
                )
            }
        };

        tx.append_log(
            NewLog::new(
                actor.shop_id,
                kind,
                format!(
                    "inventory {} quantity {} -> {} ({:+})",
                    name,
                    before,
                    after.max(0),
                    delta
                ),
            )
            .actor(actor.id)
            .member(member_id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::InventoryChanged {
            shop_id: actor.shop_id,
            member_id,
        });
        Ok(item)
    }

    /// Rename an item. When the new name already exists the two rows merge:
    /// quantities are added and the old row disappears.
    pub async fn rename(
        &self,
        actor: &Member,
        member_id: Option<i64>,
        old_name: &str,
        new_name: &str,
    ) -> Result<InventoryItem, ShopError> {
        let old_name = clean_name(old_name)?;
        let new_name = clean_name(new_name)?;

        let mut tx = self.store.begin().await?;
        require_idle_shop(&mut tx, actor.shop_id).await?;
        let target = self.resolve_target(&mut tx, actor, member_id).await?;

        let mut from = tx
            .get_inventory_item(target, &old_name)
            .await?
            .ok_or(ShopError::NotFound("inventory item"))?;
        if old_name == new_name {
            return Ok(from);
        }

        let renamed = match tx.get_inventory_item(target, &new_name).await? {
            Some(mut into) => {
                into.quantity = into
                    .quantity
                    .checked_add(from.quantity)
                    .ok_or(ShopError::InvalidQuantity)?;
                tx.update_inventory_item(&into).await?;
                tx.delete_inventory_item(from.id).await?;
                into
            }
            None => {
                from.name = new_name.clone();
                tx.update_inventory_item(&from).await?;
                from
            }
        };

        let kind = if actor.role == MemberRole::Customer {
            LogKind::SelfInventoryRename
        } else {
            LogKind::InventoryRename
        };
        tx.append_log(
            NewLog::new(
                actor.shop_id,
                kind,
                format!("inventory item renamed {} -> {}", old_name, new_name),
            )
            .actor(actor.id)
            .member(target),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::InventoryChanged {
            shop_id: actor.shop_id,
            member_id: target,
        });
        Ok(renamed)
    }

    /// Customer reorders their own inventory. `item_ids` must list every item once.
    pub async fn reorder(&self, actor: &Member, item_ids: &[i64]) -> Result<(), ShopError> {
        ensure_customer(actor)?;

        let mut tx = self.store.begin().await?;
        require_idle_shop(&mut tx, actor.shop_id).await?;
        let items = tx.list_inventory(actor.id).await?;
        if items.is_empty() {
            return Ok(());
        }
        let existing: Vec<i64> = items.iter().map(|item| item.id).collect();
        ensure_permutation(item_ids, &existing)?;

        for mut item in items {
            if let Some(pos) = item_ids.iter().position(|id| *id == item.id) {
                item.sort_order = pos as i64 + 1;
                tx.update_inventory_item(&item).await?;
            }
        }
        tx.append_log(
            NewLog::new(actor.shop_id, LogKind::SelfInventoryReorder, "inventory reordered")
                .actor(actor.id)
                .member(actor.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::InventoryChanged {
            shop_id: actor.shop_id,
            member_id: actor.id,
        });
        Ok(())
    }

    async fn resolve_target(
        &self,
        tx: &mut S::Tx,
        actor: &Member,
        member_id: Option<i64>,
    ) -> Result<i64, ShopError> {
        if actor.role == MemberRole::Customer {
            return Ok(actor.id);
        }
        ensure_manager(actor)?;
        let member_id = member_id
            .ok_or_else(|| ShopError::BadRequest("choose a customer".to_string()))?;
        Ok(require_customer(tx, actor.shop_id, member_id).await?.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shop::test_support::{seed_shop, RecordingNotifier};
    use crate::infra::shop::InMemoryShopStore;

    fn service(store: &InMemoryShopStore) -> InventoryService<InMemoryShopStore> {
        InventoryService::new(store.clone(), RecordingNotifier::new())
    }

    async fn quantities(store: &InMemoryShopStore, member_id: i64) -> Vec<(String, i64)> {
        let mut tx = store.begin().await.unwrap();
        tx.list_inventory(member_id)
            .await
            .unwrap()
            .into_iter()
            .map(|item| (item.name, item.quantity))
            .collect()
    }

    #[tokio::test]
    async fn adjust_creates_updates_and_deletes() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);
        let customer = fx.customers[0].id;

        let item = svc.adjust(&fx.clerk, customer, "Herb", 3).await.unwrap();
        assert_eq!(item.map(|i| i.quantity), Some(3));
        svc.adjust(&fx.clerk, customer, "Herb", -1).await.unwrap();
        assert_eq!(quantities(&store, customer).await, vec![("Herb".to_string(), 2)]);

        assert_eq!(svc.adjust(&fx.clerk, customer, "Herb", -5).await, Ok(None));
        assert!(quantities(&store, customer).await.is_empty());

        // Removing something that is not there writes nothing.
        assert_eq!(svc.adjust(&fx.clerk, customer, "Ghost", -1).await, Ok(None));
        assert!(quantities(&store, customer).await.is_empty());
    }

    #[tokio::test]
    async fn rename_merges_into_existing_item() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);
        let customer = &fx.customers[0];

        svc.adjust(&fx.owner, customer.id, "Apple", 2).await.unwrap();
        svc.adjust(&fx.owner, customer.id, "Pear", 5).await.unwrap();

        let merged = svc.rename(customer, None, "Apple", "Pear").await.unwrap();
        assert_eq!(merged.quantity, 7);
        assert_eq!(quantities(&store, customer.id).await, vec![("Pear".to_string(), 7)]);

        let renamed = svc
            .rename(&fx.owner, Some(customer.id), "Pear", "Fruit")
            .await
            .unwrap();
        assert_eq!((renamed.name.as_str(), renamed.quantity), ("Fruit", 7));

        assert_eq!(
            svc.rename(customer, None, "Apple", "Pear").await,
            Err(ShopError::NotFound("inventory item"))
        );

        let mut tx = store.begin().await.unwrap();
        let logs = tx.list_logs(fx.shop.id, None, 1).await.unwrap();
        assert_eq!(logs[0].kind, LogKind::InventoryRename);
    }

    #[tokio::test]
    async fn overflowing_merge_keeps_both_items() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);
        let customer = &fx.customers[0];

        svc.adjust(&fx.owner, customer.id, "Apple", 1).await.unwrap();
        svc.adjust(&fx.owner, customer.id, "Pear", i64::MAX).await.unwrap();

        assert_eq!(
            svc.rename(customer, None, "Apple", "Pear").await,
            Err(ShopError::InvalidQuantity)
        );
        assert_eq!(
            quantities(&store, customer.id).await,
            vec![("Apple".to_string(), 1), ("Pear".to_string(), i64::MAX)]
        );
    }

    #[tokio::test]
    async fn managers_must_pick_a_customer() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);

        assert!(matches!(
            svc.list_inventory(&fx.owner, None).await,
            Err(ShopError::BadRequest(_))
        ));
        assert!(matches!(
            svc.list_inventory(&fx.owner, Some(fx.clerk.id)).await,
            Err(ShopError::BadRequest(_))
        ));
        assert!(svc
            .list_inventory(&fx.owner, Some(fx.customers[0].id))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn reorder_requires_full_permutation() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);
        let customer = &fx.customers[0];

        let a = svc.adjust(&fx.owner, customer.id, "A", 1).await.unwrap().unwrap();
        let b = svc.adjust(&fx.owner, customer.id, "B", 1).await.unwrap().unwrap();
        let c = svc.adjust(&fx.owner, customer.id, "C", 1).await.unwrap().unwrap();

        assert!(svc.reorder(customer, &[c.id, a.id]).await.is_err());
        svc.reorder(customer, &[c.id, a.id, b.id]).await.unwrap();

        let names: Vec<String> = quantities(&store, customer.id)
            .await
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn self_adjust_is_blocked_while_switching() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);
        assert!(store.try_lock_switching(fx.shop.id).await.unwrap());

        assert_eq!(
            svc.self_adjust(&fx.customers[0], "Herb", 1).await,
            Err(ShopError::ModeSwitching)
        );
    }
}
