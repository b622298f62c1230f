// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "shop/mod.rs"]
pub mod shop;

#[path = "notify/mod.rs"]
pub mod notify;
