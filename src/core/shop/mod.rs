// Shop domain - wallets, catalog, purchases and the audit trail of a
// multi-tenant virtual shop. Platform-agnostic: every service is generic
// over the `ShopStore` port and publishes through `EventNotifier`.

mod audit_service;
mod catalog_service;
mod currency_service;
pub mod events;
mod inventory_service;
mod invite_service;
pub mod ledger;
mod membership_service;
pub mod pricing;
mod purchase_service;
mod shop_config;
mod shop_models;
mod shop_store;
mod wallet_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use audit_service::{AuditService, LogView};
pub use catalog_service::{CatalogService, ProductDraft, ProductPatch, StallListing, StallPatch};
pub use currency_service::{CurrencyPurge, CurrencyService};
pub use events::{EventNotifier, ShopEvent};
pub use inventory_service::InventoryService;
pub use invite_service::{generate_invite_code, InviteService};
pub use membership_service::{MembershipService, ShopStats, ShopSummary};
pub use purchase_service::{PurchaseReceipt, PurchaseService};
pub use shop_config::{CurrencyPurgePolicy, ShopConfig};
pub use shop_models::{
    Balance, BalanceChange, BalanceOwner, Currency, InventoryItem, Invite, LogEntry, LogKind,
    LogScope, Member, MemberRole, NewLog, NewProduct, Price, PriceState, Product, Shop, Stall,
    WalletMode,
};
pub use shop_store::{ShopError, ShopStore, ShopTx};
pub use wallet_service::{GrantTarget, WalletService};
