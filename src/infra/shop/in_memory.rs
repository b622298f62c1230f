// In-memory implementation of ShopStore.
//
// A transaction holds the store's async mutex for its whole lifetime and
// works on a copy of the tables; `commit` swaps the copy in. Transactions are
// therefore fully serialized, which is the strongest isolation the core can ask for.

use crate::core::shop::{
    Balance, BalanceOwner, Currency, InventoryItem, Invite, LogEntry, Member, MemberRole, NewLog,
    NewProduct, Product, Shop, ShopError, ShopStore, ShopTx, Stall, WalletMode,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: i64,
    shops: BTreeMap<i64, Shop>,
    members: BTreeMap<i64, Member>,
    currencies: BTreeMap<i64, Currency>,
    // (member_id, currency_id) -> amount
    member_balances: BTreeMap<(i64, i64), i64>,
    // (shop_id, currency_id) -> amount
    team_balances: BTreeMap<(i64, i64), i64>,
    stalls: BTreeMap<i64, Stall>,
    products: BTreeMap<i64, Product>,
    inventory: BTreeMap<i64, InventoryItem>,
    logs: BTreeMap<i64, LogEntry>,
    invites: BTreeMap<i64, Invite>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn member_ids_of(&self, shop_id: i64) -> Vec<i64> {
        self.members
            .values()
            .filter(|m| m.shop_id == shop_id)
            .map(|m| m.id)
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct InMemoryShopStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryShopStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl ShopStore for InMemoryShopStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, ShopError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTx { guard, working })
    }

    async fn try_lock_switching(&self, shop_id: i64) -> Result<bool, ShopError> {
        let mut tables = self.tables.lock().await;
        match tables.shops.get_mut(&shop_id) {
            Some(shop) if !shop.is_switching => {
                shop.is_switching = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unlock_switching(&self, shop_id: i64) -> Result<(), ShopError> {
        let mut tables = self.tables.lock().await;
        if let Some(shop) = tables.shops.get_mut(&shop_id) {
            shop.is_switching = false;
        }
        Ok(())
    }
}

#[async_trait]
impl ShopTx for InMemoryTx {
    async fn commit(mut self) -> Result<(), ShopError> {
        *self.guard = self.working;
        Ok(())
    }

    // --- shops ---

    async fn get_shop(&mut self, shop_id: i64) -> Result<Option<Shop>, ShopError> {
        Ok(self.working.shops.get(&shop_id).cloned())
    }

    async fn insert_shop(&mut self, name: &str, owner_user_id: i64) -> Result<Shop, ShopError> {
        let shop = Shop {
            id: self.working.allocate_id(),
            name: name.to_string(),
            owner_user_id,
            wallet_mode: WalletMode::Personal,
            is_switching: false,
            allow_customer_inc: false,
            allow_customer_dec: false,
            created_at: Utc::now(),
        };
        self.working.shops.insert(shop.id, shop.clone());
        Ok(shop)
    }

    async fn update_shop(&mut self, shop: &Shop) -> Result<(), ShopError> {
        let row = self
            .working
            .shops
            .get_mut(&shop.id)
            .ok_or(ShopError::NotFound("shop"))?;
        row.name = shop.name.clone();
        row.wallet_mode = shop.wallet_mode;
        row.is_switching = shop.is_switching;
        row.allow_customer_inc = shop.allow_customer_inc;
        row.allow_customer_dec = shop.allow_customer_dec;
        Ok(())
    }

    async fn delete_shop(&mut self, shop_id: i64) -> Result<(), ShopError> {
        let t = &mut self.working;
        let member_ids = t.member_ids_of(shop_id);
        let stall_ids: Vec<i64> = t
            .stalls
            .values()
            .filter(|s| s.shop_id == shop_id)
            .map(|s| s.id)
            .collect();

        t.logs.retain(|_, l| l.shop_id != shop_id);
        t.inventory.retain(|_, i| !member_ids.contains(&i.member_id));
        t.member_balances
            .retain(|(member_id, _), _| !member_ids.contains(member_id));
        t.team_balances.retain(|(sid, _), _| *sid != shop_id);
        t.members.retain(|_, m| m.shop_id != shop_id);
        t.products.retain(|_, p| !stall_ids.contains(&p.stall_id));
        t.stalls.retain(|_, s| s.shop_id != shop_id);
        t.invites.retain(|_, i| i.shop_id != shop_id);
        t.currencies.retain(|_, c| c.shop_id != shop_id);
        t.shops.remove(&shop_id);
        Ok(())
    }

    // --- members ---

    async fn get_member(&mut self, member_id: i64) -> Result<Option<Member>, ShopError> {
        Ok(self.working.members.get(&member_id).cloned())
    }

    async fn find_member(
        &mut self,
        shop_id: i64,
        user_id: i64,
    ) -> Result<Option<Member>, ShopError> {
        Ok(self
            .working
            .members
            .values()
            .find(|m| m.shop_id == shop_id && m.user_id == Some(user_id))
            .cloned())
    }

    async fn insert_member(
        &mut self,
        shop_id: i64,
        user_id: Option<i64>,
        char_name: &str,
        role: MemberRole,
    ) -> Result<Member, ShopError> {
        if let Some(user_id) = user_id {
            if self.find_member(shop_id, user_id).await?.is_some() {
                return Err(ShopError::Conflict(
                    "user is already a member of this shop".to_string(),
                ));
            }
        }
        let member = Member {
            id: self.working.allocate_id(),
            shop_id,
            user_id,
            char_name: char_name.to_string(),
            role,
            is_active: true,
        };
        self.working.members.insert(member.id, member.clone());
        Ok(member)
    }

    async fn update_member(&mut self, member: &Member) -> Result<(), ShopError> {
        let row = self
            .working
            .members
            .get_mut(&member.id)
            .ok_or(ShopError::NotFound("member"))?;
        row.char_name = member.char_name.clone();
        row.role = member.role;
        row.is_active = member.is_active;
        Ok(())
    }

    async fn list_members(&mut self, shop_id: i64) -> Result<Vec<Member>, ShopError> {
        Ok(self
            .working
            .members
            .values()
            .filter(|m| m.shop_id == shop_id)
            .cloned()
            .collect())
    }

    // --- currencies ---

    async fn get_currency(&mut self, currency_id: i64) -> Result<Option<Currency>, ShopError> {
        Ok(self.working.currencies.get(&currency_id).cloned())
    }

    async fn list_currencies(&mut self, shop_id: i64) -> Result<Vec<Currency>, ShopError> {
        Ok(self
            .working
            .currencies
            .values()
            .filter(|c| c.shop_id == shop_id)
            .cloned()
            .collect())
    }

    async fn insert_currency(&mut self, shop_id: i64, name: &str) -> Result<Currency, ShopError> {
        let currency = Currency {
            id: self.working.allocate_id(),
            shop_id,
            name: name.to_string(),
            is_active: true,
        };
        self.working.currencies.insert(currency.id, currency.clone());
        Ok(currency)
    }

    async fn update_currency(&mut self, currency: &Currency) -> Result<(), ShopError> {
        let row = self
            .working
            .currencies
            .get_mut(&currency.id)
            .ok_or(ShopError::NotFound("currency"))?;
        row.name = currency.name.clone();
        row.is_active = currency.is_active;
        Ok(())
    }

    async fn delete_currency(&mut self, currency_id: i64) -> Result<(), ShopError> {
        self.working.currencies.remove(&currency_id);
        Ok(())
    }

    async fn list_inactive_currencies(
        &mut self,
        limit: usize,
    ) -> Result<Vec<Currency>, ShopError> {
        Ok(self
            .working
            .currencies
            .values()
            .filter(|c| !c.is_active)
            .take(limit)
            .cloned()
            .collect())
    }

    // --- balances ---

    async fn balance(
        &mut self,
        owner: BalanceOwner,
        currency_id: i64,
    ) -> Result<Option<i64>, ShopError> {
        Ok(match owner {
            BalanceOwner::Member(id) => self.working.member_balances.get(&(id, currency_id)),
            BalanceOwner::Team(id) => self.working.team_balances.get(&(id, currency_id)),
        }
        .copied())
    }

    async fn set_balance(
        &mut self,
        owner: BalanceOwner,
        currency_id: i64,
        amount: i64,
    ) -> Result<(), ShopError> {
        match owner {
            BalanceOwner::Member(id) => self.working.member_balances.insert((id, currency_id), amount),
            BalanceOwner::Team(id) => self.working.team_balances.insert((id, currency_id), amount),
        };
        Ok(())
    }

    async fn balances(&mut self, owner: BalanceOwner) -> Result<Vec<Balance>, ShopError> {
        let (rows, key) = match owner {
            BalanceOwner::Member(id) => (&self.working.member_balances, id),
            BalanceOwner::Team(id) => (&self.working.team_balances, id),
        };
        Ok(rows
            .iter()
            .filter(|((owner_id, _), _)| *owner_id == key)
            .map(|((_, currency_id), amount)| Balance {
                currency_id: *currency_id,
                amount: *amount,
            })
            .collect())
    }

    async fn member_balance_total(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<i64, ShopError> {
        let member_ids = self.working.member_ids_of(shop_id);
        Ok(self
            .working
            .member_balances
            .iter()
            .filter(|((member_id, cid), _)| *cid == currency_id && member_ids.contains(member_id))
            .map(|(_, amount)| *amount)
            .sum())
    }

    async fn zero_member_balances(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<u64, ShopError> {
        let member_ids = self.working.member_ids_of(shop_id);
        let mut touched = 0;
        for ((member_id, cid), amount) in self.working.member_balances.iter_mut() {
            if *cid == currency_id && member_ids.contains(member_id) {
                *amount = 0;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn delete_balances_for_currency(&mut self, currency_id: i64) -> Result<u64, ShopError> {
        let before = self.working.member_balances.len() + self.working.team_balances.len();
        self.working
            .member_balances
            .retain(|(_, cid), _| *cid != currency_id);
        self.working
            .team_balances
            .retain(|(_, cid), _| *cid != currency_id);
        let after = self.working.member_balances.len() + self.working.team_balances.len();
        Ok((before - after) as u64)
    }

    // --- stalls ---

    async fn get_stall(&mut self, stall_id: i64) -> Result<Option<Stall>, ShopError> {
        Ok(self.working.stalls.get(&stall_id).cloned())
    }

    async fn list_stalls(&mut self, shop_id: i64) -> Result<Vec<Stall>, ShopError> {
        Ok(self
            .working
            .stalls
            .values()
            .filter(|s| s.shop_id == shop_id)
            .cloned()
            .collect())
    }

    async fn insert_stall(
        &mut self,
        shop_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Stall, ShopError> {
        let stall = Stall {
            id: self.working.allocate_id(),
            shop_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            is_active: true,
        };
        self.working.stalls.insert(stall.id, stall.clone());
        Ok(stall)
    }

    async fn update_stall(&mut self, stall: &Stall) -> Result<(), ShopError> {
        let row = self
            .working
            .stalls
            .get_mut(&stall.id)
            .ok_or(ShopError::NotFound("stall"))?;
        row.name = stall.name.clone();
        row.description = stall.description.clone();
        row.is_active = stall.is_active;
        Ok(())
    }

    async fn delete_stall(&mut self, stall_id: i64) -> Result<(), ShopError> {
        self.working.products.retain(|_, p| p.stall_id != stall_id);
        self.working.stalls.remove(&stall_id);
        Ok(())
    }

    // --- products ---

    async fn get_product(&mut self, product_id: i64) -> Result<Option<Product>, ShopError> {
        Ok(self.working.products.get(&product_id).cloned())
    }

    async fn list_products(&mut self, stall_id: i64) -> Result<Vec<Product>, ShopError> {
        let mut products: Vec<Product> = self
            .working
            .products
            .values()
            .filter(|p| p.stall_id == stall_id)
            .cloned()
            .collect();
        products.sort_by_key(|p| (p.sort_order, p.id));
        Ok(products)
    }

    async fn products_priced_in(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<Vec<Product>, ShopError> {
        Ok(self
            .working
            .products
            .values()
            .filter(|p| p.shop_id == shop_id && p.price.currency_id() == Some(currency_id))
            .cloned()
            .collect())
    }

    async fn max_product_sort(&mut self, stall_id: i64) -> Result<i64, ShopError> {
        Ok(self
            .working
            .products
            .values()
            .filter(|p| p.stall_id == stall_id)
            .map(|p| p.sort_order)
            .max()
            .unwrap_or(0))
    }

    async fn insert_product(&mut self, product: NewProduct) -> Result<Product, ShopError> {
        let shop_id = self
            .working
            .stalls
            .get(&product.stall_id)
            .map(|s| s.shop_id)
            .ok_or(ShopError::NotFound("stall"))?;
        let row = Product {
            id: self.working.allocate_id(),
            stall_id: product.stall_id,
            shop_id,
            name: product.name,
            description: product.description,
            price: product.price,
            stock: product.stock,
            is_limit_stock: product.is_limit_stock,
            is_active: true,
            sort_order: product.sort_order,
        };
        self.working.products.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), ShopError> {
        let row = self
            .working
            .products
            .get_mut(&product.id)
            .ok_or(ShopError::NotFound("product"))?;
        *row = product.clone();
        Ok(())
    }

    // --- inventory ---

    async fn get_inventory_item(
        &mut self,
        member_id: i64,
        name: &str,
    ) -> Result<Option<InventoryItem>, ShopError> {
        Ok(self
            .working
            .inventory
            .values()
            .find(|i| i.member_id == member_id && i.name == name)
            .cloned())
    }

    async fn list_inventory(&mut self, member_id: i64) -> Result<Vec<InventoryItem>, ShopError> {
        let mut items: Vec<InventoryItem> = self
            .working
            .inventory
            .values()
            .filter(|i| i.member_id == member_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.sort_order, i.id));
        Ok(items)
    }

    async fn max_inventory_sort(&mut self, member_id: i64) -> Result<i64, ShopError> {
        Ok(self
            .working
            .inventory
            .values()
            .filter(|i| i.member_id == member_id)
            .map(|i| i.sort_order)
            .max()
            .unwrap_or(0))
    }

    async fn insert_inventory_item(
        &mut self,
        member_id: i64,
        name: &str,
        quantity: i64,
        sort_order: i64,
    ) -> Result<InventoryItem, ShopError> {
        if self.get_inventory_item(member_id, name).await?.is_some() {
            return Err(ShopError::Conflict(format!("item {name} already exists")));
        }
        let item = InventoryItem {
            id: self.working.allocate_id(),
            member_id,
            name: name.to_string(),
            quantity,
            sort_order,
        };
        self.working.inventory.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_inventory_item(&mut self, item: &InventoryItem) -> Result<(), ShopError> {
        let row = self
            .working
            .inventory
            .get_mut(&item.id)
            .ok_or(ShopError::NotFound("inventory item"))?;
        *row = item.clone();
        Ok(())
    }

    async fn delete_inventory_item(&mut self, item_id: i64) -> Result<(), ShopError> {
        self.working.inventory.remove(&item_id);
        Ok(())
    }

    // --- audit log ---

    async fn append_log(&mut self, log: NewLog) -> Result<i64, ShopError> {
        let id = self.working.allocate_id();
        self.working.logs.insert(
            id,
            LogEntry {
                id,
                shop_id: log.shop_id,
                member_id: log.member_id,
                actor_id: log.actor_id,
                currency_id: log.currency_id,
                kind: log.kind,
                scope: log.scope,
                content: log.content,
                amount: log.amount,
                before_amount: log.before_amount,
                after_amount: log.after_amount,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn list_logs(
        &mut self,
        shop_id: i64,
        involving: Option<i64>,
        limit: usize,
    ) -> Result<Vec<LogEntry>, ShopError> {
        Ok(self
            .working
            .logs
            .values()
            .rev()
            .filter(|l| l.shop_id == shop_id)
            .filter(|l| match involving {
                Some(member_id) => {
                    l.member_id == Some(member_id) || l.actor_id == Some(member_id)
                }
                None => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn detach_log_currency(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<u64, ShopError> {
        let mut touched = 0;
        for log in self.working.logs.values_mut() {
            if log.shop_id == shop_id && log.currency_id == Some(currency_id) {
                log.currency_id = None;
                touched += 1;
            }
        }
        Ok(touched)
    }

    // --- invites ---

    async fn insert_invite(
        &mut self,
        shop_id: i64,
        code: &str,
        expires_at: DateTime<Utc>,
        created_by: i64,
    ) -> Result<Invite, ShopError> {
        if self.find_invite(code).await?.is_some() {
            return Err(ShopError::Conflict(format!("invite code {code} is taken")));
        }
        let invite = Invite {
            id: self.working.allocate_id(),
            shop_id,
            code: code.to_string(),
            expires_at,
            is_active: true,
            created_by,
        };
        self.working.invites.insert(invite.id, invite.clone());
        Ok(invite)
    }

    async fn get_invite(&mut self, invite_id: i64) -> Result<Option<Invite>, ShopError> {
        Ok(self.working.invites.get(&invite_id).cloned())
    }

    async fn find_invite(&mut self, code: &str) -> Result<Option<Invite>, ShopError> {
        Ok(self
            .working
            .invites
            .values()
            .find(|i| i.code == code)
            .cloned())
    }

    async fn list_invites(&mut self, shop_id: i64) -> Result<Vec<Invite>, ShopError> {
        Ok(self
            .working
            .invites
            .values()
            .rev()
            .filter(|i| i.shop_id == shop_id)
            .cloned()
            .collect())
    }

    async fn update_invite(&mut self, invite: &Invite) -> Result<(), ShopError> {
        let row = self
            .working
            .invites
            .get_mut(&invite.id)
            .ok_or(ShopError::NotFound("invite"))?;
        *row = invite.clone();
        Ok(())
    }

    async fn delete_stale_invites(&mut self, now: DateTime<Utc>) -> Result<u64, ShopError> {
        let before = self.working.invites.len();
        self.working
            .invites
            .retain(|_, i| i.is_active && i.expires_at >= now);
        Ok((before - self.working.invites.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryShopStore::new();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_shop("Ghost", 1).await.unwrap();
            // dropped without commit
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_shop(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = InMemoryShopStore::new();

        let mut tx = store.begin().await.unwrap();
        let shop = tx.insert_shop("Market", 1).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.get_shop(shop.id).await.unwrap().unwrap().name, "Market");
    }

    #[tokio::test]
    async fn switching_lock_is_compare_and_swap() {
        let store = InMemoryShopStore::new();
        let mut tx = store.begin().await.unwrap();
        let shop = tx.insert_shop("Market", 1).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.try_lock_switching(shop.id).await.unwrap());
        assert!(!store.try_lock_switching(shop.id).await.unwrap());
        store.unlock_switching(shop.id).await.unwrap();
        assert!(store.try_lock_switching(shop.id).await.unwrap());

        // Unknown shops cannot be locked.
        assert!(!store.try_lock_switching(999).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_invite_code_is_a_conflict() {
        let store = InMemoryShopStore::new();
        let mut tx = store.begin().await.unwrap();
        let expires = Utc::now() + chrono::Duration::minutes(5);
        tx.insert_invite(1, "ABC123", expires, 1).await.unwrap();
        let err = tx.insert_invite(1, "ABC123", expires, 1).await.unwrap_err();
        assert!(matches!(err, ShopError::Conflict(_)));
    }
}
