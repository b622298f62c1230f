// Fixtures shared by the shop service tests.

use super::events::{EventNotifier, ShopEvent};
use super::shop_models::{
    BalanceOwner, Currency, Member, MemberRole, NewProduct, Price, Product, Shop, Stall,
};
use super::shop_store::{ShopStore, ShopTx};
use std::sync::{Arc, Mutex};

pub const OWNER_USER: i64 = 1;
pub const CLERK_USER: i64 = 2;

/// A shop with an owner, a clerk, `n` customers, three currencies and one stall.
pub struct Fixture {
    pub shop: Shop,
    pub owner: Member,
    pub clerk: Member,
    pub customers: Vec<Member>,
    pub currencies: Vec<Currency>,
    pub stall: Stall,
}

pub fn customer_user(i: usize) -> i64 {
    100 + i as i64
}

pub async fn seed_shop<S: ShopStore>(store: &S, customers: usize) -> Fixture {
    let mut tx = store.begin().await.unwrap();
    let shop = tx.insert_shop("Test Shop", OWNER_USER).await.unwrap();
    let owner = tx
        .insert_member(shop.id, Some(OWNER_USER), "Owner", MemberRole::Owner)
        .await
        .unwrap();
    let clerk = tx
        .insert_member(shop.id, Some(CLERK_USER), "Clerk", MemberRole::Clerk)
        .await
        .unwrap();

    let mut members = Vec::new();
    for i in 0..customers {
        let name = format!("Customer{i}");
        members.push(
            tx.insert_member(shop.id, Some(customer_user(i)), &name, MemberRole::Customer)
                .await
                .unwrap(),
        );
    }

    let mut currencies = Vec::new();
    for name in ["Gold", "Silver", "Copper"] {
        currencies.push(tx.insert_currency(shop.id, name).await.unwrap());
    }
    let stall = tx.insert_stall(shop.id, "Main", None).await.unwrap();
    tx.commit().await.unwrap();

    Fixture {
        shop,
        owner,
        clerk,
        customers: members,
        currencies,
        stall,
    }
}

/// Limited-stock product in the fixture's stall.
pub async fn stock_product<S: ShopStore>(
    store: &S,
    fx: &Fixture,
    name: &str,
    price: Price,
    stock: i64,
) -> Product {
    let mut tx = store.begin().await.unwrap();
    let sort_order = tx.max_product_sort(fx.stall.id).await.unwrap() + 1;
    let product = tx
        .insert_product(NewProduct {
            stall_id: fx.stall.id,
            name: name.to_string(),
            description: None,
            price,
            stock,
            is_limit_stock: true,
            sort_order,
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();
    product
}

pub async fn fund<S: ShopStore>(store: &S, owner: BalanceOwner, currency_id: i64, amount: i64) {
    let mut tx = store.begin().await.unwrap();
    tx.set_balance(owner, currency_id, amount).await.unwrap();
    tx.commit().await.unwrap();
}

pub async fn balance_of<S: ShopStore>(store: &S, owner: BalanceOwner, currency_id: i64) -> i64 {
    let mut tx = store.begin().await.unwrap();
    tx.balance(owner, currency_id).await.unwrap().unwrap_or(0)
}

pub async fn reload_shop<S: ShopStore>(store: &S, shop_id: i64) -> Shop {
    let mut tx = store.begin().await.unwrap();
    tx.get_shop(shop_id).await.unwrap().unwrap()
}

/// Notifier that keeps every published event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ShopEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ShopEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventNotifier for RecordingNotifier {
    fn publish(&self, event: ShopEvent) {
        self.events.lock().unwrap().push(event);
    }
}
