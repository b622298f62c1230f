// Multi-tenant virtual shop.
//
// - `core/` = Business logic (storage-agnostic services over the `ShopStore` port)
// - `infra/` = Implementations of core traits (SQLite, in-memory, event fan-out)

#[path = "core/core_layer.rs"]
pub mod core;
#[path = "infra/infra_layer.rs"]
pub mod infra;

pub mod app;
