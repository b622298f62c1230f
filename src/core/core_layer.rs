// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "shop/mod.rs"]
pub mod shop;
