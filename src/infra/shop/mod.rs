// Storage backends for the shop domain.

pub mod in_memory;
pub mod sqlite_shop_store;

pub use in_memory::{InMemoryShopStore, InMemoryTx};
pub use sqlite_shop_store::{SqliteShopStore, SqliteShopTx};
