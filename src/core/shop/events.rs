// Change notifications pushed to viewers of a shop.
//
// Services publish after their transaction commits. Delivery is best-effort:
// a lost notification only means a client refreshes later.

use super::shop_models::WalletMode;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ShopEvent {
    ShopUpdated { shop_id: i64 },
    ShopDeleted { shop_id: i64 },
    MemberJoined { shop_id: i64 },
    MemberLeft { shop_id: i64 },
    MemberUpdated { shop_id: i64, member_id: i64 },
    MemberRoleChanged { shop_id: i64, member_id: i64 },
    MemberKicked { shop_id: i64, member_id: i64 },
    CurrenciesChanged { shop_id: i64 },
    BalancesChanged { shop_id: i64 },
    WalletModeChanged { shop_id: i64, mode: WalletMode },
    Purchase { shop_id: i64, member_id: i64, product_id: i64 },
    ProductStockChanged { shop_id: i64, product_id: i64 },
    ProductsChanged { shop_id: i64 },
    ProductCreated { shop_id: i64, stall_id: i64, product_id: i64 },
    ProductUpdated { shop_id: i64, stall_id: i64, product_id: i64 },
    ProductsReordered { shop_id: i64, stall_id: i64 },
    StallCreated { shop_id: i64, stall_id: i64 },
    StallUpdated { shop_id: i64, stall_id: i64 },
    StallDeleted { shop_id: i64, stall_id: i64 },
    InventoryChanged { shop_id: i64, member_id: i64 },
    InviteCreated { shop_id: i64 },
    InviteDeleted { shop_id: i64 },
}

impl ShopEvent {
    /// The shop whose subscribers receive this event.
    pub fn shop_id(&self) -> i64 {
        match self {
            ShopEvent::ShopUpdated { shop_id }
            | ShopEvent::ShopDeleted { shop_id }
            | ShopEvent::MemberJoined { shop_id }
            | ShopEvent::MemberLeft { shop_id }
            | ShopEvent::MemberUpdated { shop_id, .. }
            | ShopEvent::MemberRoleChanged { shop_id, .. }
            | ShopEvent::MemberKicked { shop_id, .. }
            | ShopEvent::CurrenciesChanged { shop_id }
            | ShopEvent::BalancesChanged { shop_id }
            | ShopEvent::WalletModeChanged { shop_id, .. }
            | ShopEvent::Purchase { shop_id, .. }
            | ShopEvent::ProductStockChanged { shop_id, .. }
            | ShopEvent::ProductsChanged { shop_id }
            | ShopEvent::ProductCreated { shop_id, .. }
            | ShopEvent::ProductUpdated { shop_id, .. }
            | ShopEvent::ProductsReordered { shop_id, .. }
            | ShopEvent::StallCreated { shop_id, .. }
            | ShopEvent::StallUpdated { shop_id, .. }
            | ShopEvent::StallDeleted { shop_id, .. }
            | ShopEvent::InventoryChanged { shop_id, .. }
            | ShopEvent::InviteCreated { shop_id }
            | ShopEvent::InviteDeleted { shop_id } => *shop_id,
        }
    }

    /// Wire form sent to subscribers.
    pub fn to_json(&self) -> String {
        // Serializing a plain enum of integers and strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Fan-out of change notifications to subscribers of a shop.
pub trait EventNotifier: Send + Sync {
    fn publish(&self, event: ShopEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_as_tagged_objects() {
        let json = ShopEvent::WalletModeChanged {
            shop_id: 7,
            mode: WalletMode::Team,
        }
        .to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "wallet_mode_changed");
        assert_eq!(value["shopId"], 7);
        assert_eq!(value["mode"], "TEAM");
    }

    #[test]
    fn shop_id_is_extracted_from_every_shape() {
        let purchase = ShopEvent::Purchase {
            shop_id: 3,
            member_id: 4,
            product_id: 5,
        };
        assert_eq!(purchase.shop_id(), 3);
        assert_eq!(ShopEvent::BalancesChanged { shop_id: 9 }.shop_id(), 9);
    }
}
