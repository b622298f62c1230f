// Storage port for the shop domain.
//
// The core says WHAT it needs from a relational store; infra decides HOW.
// Every balance-affecting operation runs inside one `ShopTx`, and the
// wallet-mode transition lock is a committed compare-and-swap on the shop row.

use super::shop_models::{
    Balance, BalanceOwner, Currency, InventoryItem, Invite, LogEntry, Member, MemberRole,
    NewLog, NewProduct, Product, Shop, Stall,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShopError {
    // --- validation ---
    #[error("Name must not be empty")]
    InvalidName,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // --- state conflicts ---
    #[error("Wallet mode switch in progress, try again later")]
    ModeSwitching,

    #[error("Another wallet mode transition is already running")]
    TransitionInProgress,

    #[error("Shop has no active customers")]
    NoCustomers,

    #[error("Currency is missing or has been deleted")]
    CurrencyUnavailable,

    #[error("Product is not priced")]
    NotPriced,

    #[error("Product is delisted")]
    Inactive,

    // --- resource conflicts ---
    #[error("Insufficient funds: need {required}, but only {available} available")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Insufficient stock: requested {requested}, but only {available} left")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    // --- lookup / authorization ---
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

/// Entry point to the persistent store.
///
/// Implementations must be cheap to clone (a pool handle or an `Arc`), so each
/// service can own its own copy.
#[async_trait]
pub trait ShopStore: Clone + Send + Sync + 'static {
    type Tx: ShopTx;

    /// Start an atomic unit of work. Dropping the returned transaction without
    /// calling `commit` rolls it back.
    async fn begin(&self) -> Result<Self::Tx, ShopError>;

    /// Flip `is_switching` from false to true and commit immediately.
    /// Returns false when the flag was already set (or the shop is gone).
    async fn try_lock_switching(&self, shop_id: i64) -> Result<bool, ShopError>;

    /// Force `is_switching` back to false, committed immediately.
    async fn unlock_switching(&self, shop_id: i64) -> Result<(), ShopError>;
}

/// Operations available inside one transaction.
#[async_trait]
pub trait ShopTx: Send {
    async fn commit(self) -> Result<(), ShopError>;

    // --- shops ---
    async fn get_shop(&mut self, shop_id: i64) -> Result<Option<Shop>, ShopError>;
    async fn insert_shop(&mut self, name: &str, owner_user_id: i64) -> Result<Shop, ShopError>;
    /// Persist name, wallet mode, switching flag and customer-adjust switches.
    async fn update_shop(&mut self, shop: &Shop) -> Result<(), ShopError>;
    /// Delete the shop and every row it owns.
    async fn delete_shop(&mut self, shop_id: i64) -> Result<(), ShopError>;

    // --- members ---
    async fn get_member(&mut self, member_id: i64) -> Result<Option<Member>, ShopError>;
    async fn find_member(&mut self, shop_id: i64, user_id: i64)
        -> Result<Option<Member>, ShopError>;
    async fn insert_member(
        &mut self,
        shop_id: i64,
        user_id: Option<i64>,
        char_name: &str,
        role: MemberRole,
    ) -> Result<Member, ShopError>;
    async fn update_member(&mut self, member: &Member) -> Result<(), ShopError>;
    /// All members of a shop (active or not), ordered by id ascending.
    async fn list_members(&mut self, shop_id: i64) -> Result<Vec<Member>, ShopError>;

    // --- currencies ---
    async fn get_currency(&mut self, currency_id: i64) -> Result<Option<Currency>, ShopError>;
    async fn list_currencies(&mut self, shop_id: i64) -> Result<Vec<Currency>, ShopError>;
    async fn insert_currency(&mut self, shop_id: i64, name: &str) -> Result<Currency, ShopError>;
    async fn update_currency(&mut self, currency: &Currency) -> Result<(), ShopError>;
    async fn delete_currency(&mut self, currency_id: i64) -> Result<(), ShopError>;
    /// Inactive currencies across all shops, oldest first.
    async fn list_inactive_currencies(&mut self, limit: usize)
        -> Result<Vec<Currency>, ShopError>;

    // --- balances ---
    async fn balance(
        &mut self,
        owner: BalanceOwner,
        currency_id: i64,
    ) -> Result<Option<i64>, ShopError>;
    /// Upsert a balance row.
    async fn set_balance(
        &mut self,
        owner: BalanceOwner,
        currency_id: i64,
        amount: i64,
    ) -> Result<(), ShopError>;
    /// Every balance row of one owner, ordered by currency id.
    async fn balances(&mut self, owner: BalanceOwner) -> Result<Vec<Balance>, ShopError>;
    /// Sum of all member balances of a shop for one currency.
    async fn member_balance_total(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<i64, ShopError>;
    /// Set every member balance of a shop for one currency to zero.
    async fn zero_member_balances(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<u64, ShopError>;
    /// Remove member and team balance rows that reference a currency.
    async fn delete_balances_for_currency(&mut self, currency_id: i64) -> Result<u64, ShopError>;

    // --- stalls ---
    async fn get_stall(&mut self, stall_id: i64) -> Result<Option<Stall>, ShopError>;
    async fn list_stalls(&mut self, shop_id: i64) -> Result<Vec<Stall>, ShopError>;
    async fn insert_stall(
        &mut self,
        shop_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Stall, ShopError>;
    async fn update_stall(&mut self, stall: &Stall) -> Result<(), ShopError>;
    /// Delete a stall and its products.
    async fn delete_stall(&mut self, stall_id: i64) -> Result<(), ShopError>;

    // --- products ---
    async fn get_product(&mut self, product_id: i64) -> Result<Option<Product>, ShopError>;
    /// Products of one stall, ordered by sort order then id.
    async fn list_products(&mut self, stall_id: i64) -> Result<Vec<Product>, ShopError>;
    /// PRICED products of a shop whose price uses the given currency.
    async fn products_priced_in(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<Vec<Product>, ShopError>;
    async fn max_product_sort(&mut self, stall_id: i64) -> Result<i64, ShopError>;
    async fn insert_product(&mut self, product: NewProduct) -> Result<Product, ShopError>;
    async fn update_product(&mut self, product: &Product) -> Result<(), ShopError>;

    // --- inventory ---
    async fn get_inventory_item(
        &mut self,
        member_id: i64,
        name: &str,
    ) -> Result<Option<InventoryItem>, ShopError>;
    /// Items of one member, ordered by sort order then id.
    async fn list_inventory(&mut self, member_id: i64) -> Result<Vec<InventoryItem>, ShopError>;
    async fn max_inventory_sort(&mut self, member_id: i64) -> Result<i64, ShopError>;
    async fn insert_inventory_item(
        &mut self,
        member_id: i64,
        name: &str,
        quantity: i64,
        sort_order: i64,
    ) -> Result<InventoryItem, ShopError>;
    async fn update_inventory_item(&mut self, item: &InventoryItem) -> Result<(), ShopError>;
    async fn delete_inventory_item(&mut self, item_id: i64) -> Result<(), ShopError>;

    // --- audit log ---
    async fn append_log(&mut self, log: NewLog) -> Result<i64, ShopError>;
    /// Newest first. `involving` keeps only rows where the member is the
    /// subject or the actor.
    async fn list_logs(
        &mut self,
        shop_id: i64,
        involving: Option<i64>,
        limit: usize,
    ) -> Result<Vec<LogEntry>, ShopError>;
    /// Null out `currency_id` on historical rows.
    async fn detach_log_currency(&mut self, shop_id: i64, currency_id: i64)
        -> Result<u64, ShopError>;

    // --- invites ---
    /// Fails with `ShopError::Conflict` when the code is already taken.
    async fn insert_invite(
        &mut self,
        shop_id: i64,
        code: &str,
        expires_at: DateTime<Utc>,
        created_by: i64,
    ) -> Result<Invite, ShopError>;
    async fn get_invite(&mut self, invite_id: i64) -> Result<Option<Invite>, ShopError>;
    async fn find_invite(&mut self, code: &str) -> Result<Option<Invite>, ShopError>;
    /// Newest first.
    async fn list_invites(&mut self, shop_id: i64) -> Result<Vec<Invite>, ShopError>;
    async fn update_invite(&mut self, invite: &Invite) -> Result<(), ShopError>;
    /// Delete invites that expired before `now` or were deactivated.
    async fn delete_stale_invites(&mut self, now: DateTime<Utc>) -> Result<u64, ShopError>;
}

// ============================================================================
// CONTEXT HELPERS
// ============================================================================
// Small lookups shared by every service.

pub async fn require_shop<T: ShopTx>(tx: &mut T, shop_id: i64) -> Result<Shop, ShopError> {
    tx.get_shop(shop_id).await?.ok_or(ShopError::NotFound("shop"))
}

/// Fail with `ModeSwitching` while a wallet-mode transition holds the shop.
pub async fn require_idle_shop<T: ShopTx>(tx: &mut T, shop_id: i64) -> Result<Shop, ShopError> {
    let shop = require_shop(tx, shop_id).await?;
    if shop.is_switching {
        return Err(ShopError::ModeSwitching);
    }
    Ok(shop)
}

/// An active member of the given shop.
pub async fn require_shop_member<T: ShopTx>(
    tx: &mut T,
    shop_id: i64,
    member_id: i64,
) -> Result<Member, ShopError> {
    match tx.get_member(member_id).await? {
        Some(member) if member.shop_id == shop_id && member.is_active => Ok(member),
        _ => Err(ShopError::NotFound("member")),
    }
}

/// An active customer of the given shop (the only role that owns wallets
/// and inventories).
pub async fn require_customer<T: ShopTx>(
    tx: &mut T,
    shop_id: i64,
    member_id: i64,
) -> Result<Member, ShopError> {
    let member = require_shop_member(tx, shop_id, member_id).await?;
    if member.role != MemberRole::Customer {
        return Err(ShopError::BadRequest(
            "only customers hold balances and inventories".to_string(),
        ));
    }
    Ok(member)
}

/// An active currency of the given shop.
pub async fn require_active_currency<T: ShopTx>(
    tx: &mut T,
    shop_id: i64,
    currency_id: i64,
) -> Result<Currency, ShopError> {
    match tx.get_currency(currency_id).await? {
        Some(currency) if currency.shop_id == shop_id && currency.is_active => Ok(currency),
        _ => Err(ShopError::CurrencyUnavailable),
    }
}

pub fn ensure_manager(member: &Member) -> Result<(), ShopError> {
    if member.role.is_manager() {
        Ok(())
    } else {
        Err(ShopError::Forbidden("only the owner or clerks may do this"))
    }
}

pub fn ensure_customer(member: &Member) -> Result<(), ShopError> {
    if member.role == MemberRole::Customer {
        Ok(())
    } else {
        Err(ShopError::Forbidden("only customers may do this"))
    }
}

/// Trim a user-supplied name, rejecting blanks.
pub fn clean_name(raw: &str) -> Result<String, ShopError> {
    let name = raw.trim();
    if name.is_empty() {
        Err(ShopError::InvalidName)
    } else {
        Ok(name.to_string())
    }
}

/// A reorder request must name every existing row exactly once.
pub fn ensure_permutation(requested: &[i64], existing: &[i64]) -> Result<(), ShopError> {
    let wanted: HashSet<i64> = requested.iter().copied().collect();
    if wanted.len() != requested.len() {
        return Err(ShopError::BadRequest("ordering contains duplicate ids".to_string()));
    }
    let have: HashSet<i64> = existing.iter().copied().collect();
    if wanted != have {
        return Err(ShopError::BadRequest(
            "ordering is stale, refresh and try again".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutation_must_match_exactly() {
        assert!(ensure_permutation(&[3, 1, 2], &[1, 2, 3]).is_ok());
        assert!(ensure_permutation(&[1, 1, 2], &[1, 2, 3]).is_err());
        assert!(ensure_permutation(&[1, 2], &[1, 2, 3]).is_err());
        assert!(ensure_permutation(&[1, 2, 4], &[1, 2, 3]).is_err());
    }

    #[test]
    fn clean_name_trims_and_rejects_blank() {
        assert_eq!(clean_name("  Gold ").unwrap(), "Gold");
        assert_eq!(clean_name("   "), Err(ShopError::InvalidName));
    }

    #[test]
    fn shop_error_messages_are_descriptive() {
        let err = ShopError::InsufficientFunds {
            required: 10,
            available: 5,
        };
        assert!(err.to_string().contains("need 10"));
        assert_eq!(ShopError::NotFound("product").to_string(), "product not found");
    }
}
