// Shop domain models
//
// Plain data shared by every shop service. Enums that are persisted carry
// an `as_str`/`from_str` pair so the storage layer never has to guess.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENUMS
// ============================================================================

/// Which ledger a shop's customers spend from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletMode {
    /// Every customer has an individual balance per currency.
    Personal,
    /// All customers share one pool per currency.
    Team,
}

impl WalletMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletMode::Personal => "PERSONAL",
            WalletMode::Team => "TEAM",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PERSONAL" => Some(WalletMode::Personal),
            "TEAM" => Some(WalletMode::Team),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Owner,
    Clerk,
    Customer,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "OWNER",
            MemberRole::Clerk => "CLERK",
            MemberRole::Customer => "CUSTOMER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OWNER" => Some(MemberRole::Owner),
            "CLERK" => Some(MemberRole::Clerk),
            "CUSTOMER" => Some(MemberRole::Customer),
            _ => None,
        }
    }

    /// Owners and clerks run the shop; customers only spend.
    pub fn is_manager(&self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Clerk)
    }
}

/// Which ledger a log row's amounts refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogScope {
    Personal,
    Team,
}

impl LogScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogScope::Personal => "PERSONAL",
            LogScope::Team => "TEAM",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PERSONAL" => Some(LogScope::Personal),
            "TEAM" => Some(LogScope::Team),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceState {
    Priced,
    Unpriced,
    /// Set by the system when the product's currency is deleted.
    DisabledCurrency,
}

impl PriceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceState::Priced => "PRICED",
            PriceState::Unpriced => "UNPRICED",
            PriceState::DisabledCurrency => "DISABLED_CURRENCY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PRICED" => Some(PriceState::Priced),
            "UNPRICED" => Some(PriceState::Unpriced),
            "DISABLED_CURRENCY" => Some(PriceState::DisabledCurrency),
            _ => None,
        }
    }
}

/// Audit log row types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    GrantPersonal,
    GrantTeam,
    SelfAdjustPersonal,
    SelfAdjustTeam,
    WalletMode,
    CustomerAdjust,
    Purchase,
    CurrencyCreate,
    CurrencyRename,
    CurrencyDelete,
    StallUpdate,
    StallDelete,
    ProductUpdate,
    ProductReorder,
    InventoryAdjust,
    SelfInventoryAdjust,
    InventoryRename,
    SelfInventoryRename,
    SelfInventoryReorder,
    CharName,
    MemberRole,
    MemberKick,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::GrantPersonal => "grant_personal",
            LogKind::GrantTeam => "grant_team",
            LogKind::SelfAdjustPersonal => "self_adjust_personal",
            LogKind::SelfAdjustTeam => "self_adjust_team",
            LogKind::WalletMode => "wallet_mode",
            LogKind::CustomerAdjust => "customer_adjust",
            LogKind::Purchase => "purchase",
            LogKind::CurrencyCreate => "currency_create",
            LogKind::CurrencyRename => "currency_rename",
            LogKind::CurrencyDelete => "currency_delete",
            LogKind::StallUpdate => "stall_update",
            LogKind::StallDelete => "stall_delete",
            LogKind::ProductUpdate => "product_update",
            LogKind::ProductReorder => "product_reorder",
            LogKind::InventoryAdjust => "inventory_adjust",
            LogKind::SelfInventoryAdjust => "self_inventory_adjust",
            LogKind::InventoryRename => "inventory_rename",
            LogKind::SelfInventoryRename => "self_inventory_rename",
            LogKind::SelfInventoryReorder => "self_inventory_reorder",
            LogKind::CharName => "char_name",
            LogKind::MemberRole => "member_role",
            LogKind::MemberKick => "member_kick",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|kind| kind.as_str() == s)
    }

    pub fn all() -> Vec<LogKind> {
        vec![
            LogKind::GrantPersonal,
            LogKind::GrantTeam,
            LogKind::SelfAdjustPersonal,
            LogKind::SelfAdjustTeam,
            LogKind::WalletMode,
            LogKind::CustomerAdjust,
            LogKind::Purchase,
            LogKind::CurrencyCreate,
            LogKind::CurrencyRename,
            LogKind::CurrencyDelete,
            LogKind::StallUpdate,
            LogKind::StallDelete,
            LogKind::ProductUpdate,
            LogKind::ProductReorder,
            LogKind::InventoryAdjust,
            LogKind::SelfInventoryAdjust,
            LogKind::InventoryRename,
            LogKind::SelfInventoryRename,
            LogKind::SelfInventoryReorder,
            LogKind::CharName,
            LogKind::MemberRole,
            LogKind::MemberKick,
        ]
    }
}

// ============================================================================
// PRICING
// ============================================================================

/// A product's price. PRICED always carries both the amount and the currency,
/// so the "priced but missing a column" state cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Price {
    Unpriced,
    Priced { amount: i64, currency_id: i64 },
    DisabledCurrency,
}

impl Price {
    pub fn state(&self) -> PriceState {
        match self {
            Price::Unpriced => PriceState::Unpriced,
            Price::Priced { .. } => PriceState::Priced,
            Price::DisabledCurrency => PriceState::DisabledCurrency,
        }
    }

    pub fn amount(&self) -> Option<i64> {
        match self {
            Price::Priced { amount, .. } => Some(*amount),
            _ => None,
        }
    }

    pub fn currency_id(&self) -> Option<i64> {
        match self {
            Price::Priced { currency_id, .. } => Some(*currency_id),
            _ => None,
        }
    }

    /// Rebuild a price from its three storage columns.
    /// A PRICED row with a missing column is read back as UNPRICED.
    pub fn from_columns(state: PriceState, amount: Option<i64>, currency_id: Option<i64>) -> Self {
        match (state, amount, currency_id) {
            (PriceState::Priced, Some(amount), Some(currency_id)) => Price::Priced {
                amount,
                currency_id,
            },
            (PriceState::DisabledCurrency, _, _) => Price::DisabledCurrency,
            _ => Price::Unpriced,
        }
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub owner_user_id: i64,
    pub wallet_mode: WalletMode,
    /// Transition lock for wallet mode switches.
    pub is_switching: bool,
    pub allow_customer_inc: bool,
    pub allow_customer_dec: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    pub shop_id: i64,
    pub user_id: Option<i64>,
    pub char_name: String,
    pub role: MemberRole,
    pub is_active: bool,
}

impl Member {
    pub fn is_active_customer(&self) -> bool {
        self.is_active && self.role == MemberRole::Customer
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub id: i64,
    pub shop_id: i64,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stall {
    pub id: i64,
    pub shop_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub stall_id: i64,
    /// Denormalized from the owning stall.
    pub shop_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub stock: i64,
    pub is_limit_stock: bool,
    pub is_active: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub stall_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub stock: i64,
    pub is_limit_stock: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: i64,
    pub member_id: i64,
    pub name: String,
    pub quantity: i64,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: i64,
    pub shop_id: i64,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_by: i64,
}

impl Invite {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

// ============================================================================
// LEDGER
// ============================================================================

/// Key space of a balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalanceOwner {
    /// A member's personal balance.
    Member(i64),
    /// A shop's team pool.
    Team(i64),
}

impl BalanceOwner {
    pub fn scope(&self) -> LogScope {
        match self {
            BalanceOwner::Member(_) => LogScope::Personal,
            BalanceOwner::Team(_) => LogScope::Team,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub currency_id: i64,
    pub amount: i64,
}

/// Result of applying a delta to one balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: i64,
    pub after: i64,
}

// ============================================================================
// AUDIT LOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: i64,
    pub shop_id: i64,
    pub member_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub currency_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub scope: Option<LogScope>,
    pub content: String,
    pub amount: i64,
    pub before_amount: Option<i64>,
    pub after_amount: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A log row waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLog {
    pub shop_id: i64,
    pub member_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub currency_id: Option<i64>,
    pub kind: LogKind,
    pub scope: Option<LogScope>,
    pub content: String,
    pub amount: i64,
    pub before_amount: Option<i64>,
    pub after_amount: Option<i64>,
}

impl NewLog {
    pub fn new(shop_id: i64, kind: LogKind, content: impl Into<String>) -> Self {
        Self {
            shop_id,
            member_id: None,
            actor_id: None,
            currency_id: None,
            kind,
            scope: None,
            content: content.into(),
            amount: 0,
            before_amount: None,
            after_amount: None,
        }
    }

    pub fn actor(mut self, actor_id: i64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn member(mut self, member_id: i64) -> Self {
        self.member_id = Some(member_id);
        self
    }

    pub fn currency(mut self, currency_id: i64) -> Self {
        self.currency_id = Some(currency_id);
        self
    }

    /// Record a balance movement on the given ledger.
    pub fn balance(mut self, owner: BalanceOwner, amount: i64, change: BalanceChange) -> Self {
        self.scope = Some(owner.scope());
        self.amount = amount;
        self.before_amount = Some(change.before);
        self.after_amount = Some(change.after);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_storage_names_round_trip() {
        for mode in [WalletMode::Personal, WalletMode::Team] {
            assert_eq!(WalletMode::from_str(mode.as_str()), Some(mode));
        }
        for kind in LogKind::all() {
            assert_eq!(LogKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(PriceState::from_str("DISABLED_CURRENCY"), Some(PriceState::DisabledCurrency));
        assert_eq!(MemberRole::from_str("ADMIN"), None);
    }

    #[test]
    fn priced_row_missing_a_column_reads_as_unpriced() {
        assert_eq!(
            Price::from_columns(PriceState::Priced, Some(10), None),
            Price::Unpriced
        );
        assert_eq!(
            Price::from_columns(PriceState::Priced, Some(10), Some(3)),
            Price::Priced {
                amount: 10,
                currency_id: 3
            }
        );
        assert_eq!(
            Price::from_columns(PriceState::DisabledCurrency, None, None),
            Price::DisabledCurrency
        );
    }

    #[test]
    fn new_log_records_balance_movement() {
        let entry = NewLog::new(1, LogKind::Purchase, "bought")
            .actor(2)
            .member(2)
            .currency(5)
            .balance(
                BalanceOwner::Team(1),
                -10,
                BalanceChange {
                    before: 30,
                    after: 20,
                },
            );
        assert_eq!(entry.scope, Some(LogScope::Team));
        assert_eq!(entry.before_amount, Some(30));
        assert_eq!(entry.after_amount, Some(20));
        assert_eq!(entry.amount, -10);
    }
}
