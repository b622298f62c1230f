// Catalog - stalls and the products they sell.

use super::events::{EventNotifier, ShopEvent};
use super::pricing;
use super::shop_models::{LogKind, Member, MemberRole, NewLog, NewProduct, Price, Product, Stall};
use super::shop_store::{
    clean_name, ensure_manager, ensure_permutation, ShopError, ShopStore, ShopTx,
};
use serde::Serialize;
use std::sync::Arc;

/// A stall together with its products in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StallListing {
    #[serde(flatten)]
    pub stall: Stall,
    pub products: Vec<Product>,
}

/// Fields of a product supplied at creation.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub stock: i64,
    pub is_limit_stock: bool,
}

impl ProductDraft {
    pub fn new(name: impl Into<String>, stock: i64) -> Self {
        Self {
            name: name.into(),
            description: None,
            price: Price::Unpriced,
            stock,
            is_limit_stock: true,
        }
    }

    pub fn priced(mut self, price: Price) -> Self {
        self.price = price;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct StallPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Partial product update; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub stock: Option<i64>,
    pub is_limit_stock: Option<bool>,
    pub is_active: Option<bool>,
}

pub struct CatalogService<S: ShopStore> {
    store: S,
    notifier: Arc<dyn EventNotifier>,
}

impl<S: ShopStore> CatalogService<S> {
    pub fn new(store: S, notifier: Arc<dyn EventNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Stalls ordered by id. Customers only see what is active.
    pub async fn list_stalls(&self, actor: &Member) -> Result<Vec<StallListing>, ShopError> {
        let customer_view = actor.role == MemberRole::Customer;
        let mut tx = self.store.begin().await?;

        let mut listings = Vec::new();
        for stall in tx.list_stalls(actor.shop_id).await? {
            if customer_view && !stall.is_active {
                continue;
            }
            let products = tx
                .list_products(stall.id)
                .await?
                .into_iter()
                .filter(|p| !customer_view || p.is_active)
                .collect();
            listings.push(StallListing { stall, products });
        }
        Ok(listings)
    }

    // ------------------------------------------------------------------------
    // Stalls
    // ------------------------------------------------------------------------

    pub async fn create_stall(
        &self,
        actor: &Member,
        name: &str,
        description: Option<&str>,
    ) -> Result<Stall, ShopError> {
        ensure_manager(actor)?;
        let name = clean_name(name)?;

        let mut tx = self.store.begin().await?;
        let stall = tx.insert_stall(actor.shop_id, &name, description).await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::StallCreated {
            shop_id: actor.shop_id,
            stall_id: stall.id,
        });
        Ok(stall)
    }

    pub async fn update_stall(
        &self,
        actor: &Member,
        stall_id: i64,
        patch: StallPatch,
    ) -> Result<Stall, ShopError> {
        ensure_manager(actor)?;

        let mut tx = self.store.begin().await?;
        let mut stall = find_stall(&mut tx, actor.shop_id, stall_id).await?;
        if let Some(name) = patch.name {
            stall.name = clean_name(&name)?;
        }
        if let Some(description) = patch.description {
            stall.description = Some(description);
        }
        if let Some(is_active) = patch.is_active {
            stall.is_active = is_active;
        }
        tx.update_stall(&stall).await?;
        tx.append_log(
            NewLog::new(actor.shop_id, LogKind::StallUpdate, format!("updated stall {}", stall.id))
                .actor(actor.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::StallUpdated {
            shop_id: actor.shop_id,
            stall_id,
        });
        Ok(stall)
    }

    /// Delete a stall and every product in it.
    pub async fn delete_stall(&self, actor: &Member, stall_id: i64) -> Result<(), ShopError> {
        ensure_manager(actor)?;

        let mut tx = self.store.begin().await?;
        let stall = find_stall(&mut tx, actor.shop_id, stall_id).await?;
        tx.delete_stall(stall.id).await?;
        tx.append_log(
            NewLog::new(
                actor.shop_id,
                LogKind::StallDelete,
                format!("deleted stall {} ({})", stall.id, stall.name),
            )
            .actor(actor.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::StallDeleted {
            shop_id: actor.shop_id,
            stall_id,
        });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------------

    pub async fn create_product(
        &self,
        actor: &Member,
        stall_id: i64,
        draft: ProductDraft,
    ) -> Result<Product, ShopError> {
        ensure_manager(actor)?;
        let name = clean_name(&draft.name)?;
        ensure_stock(draft.stock)?;

        let mut tx = self.store.begin().await?;
        let stall = find_stall(&mut tx, actor.shop_id, stall_id).await?;
        let price = pricing::validate_requested_price(&mut tx, actor.shop_id, draft.price).await?;
        let sort_order = tx.max_product_sort(stall.id).await? + 1;
        let product = tx
            .insert_product(NewProduct {
                stall_id: stall.id,
                name,
                description: draft.description,
                price,
                stock: draft.stock,
                is_limit_stock: draft.is_limit_stock,
                sort_order,
            })
            .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::ProductCreated {
            shop_id: actor.shop_id,
            stall_id: stall.id,
            product_id: product.id,
        });
        Ok(product)
    }

    pub async fn update_product(
        &self,
        actor: &Member,
        product_id: i64,
        patch: ProductPatch,
    ) -> Result<Product, ShopError> {
        ensure_manager(actor)?;

        let mut tx = self.store.begin().await?;
        let mut product = match tx.get_product(product_id).await? {
            Some(product) if product.shop_id == actor.shop_id => product,
            _ => return Err(ShopError::NotFound("product")),
        };

        if let Some(price) = patch.price {
            product.price = pricing::validate_requested_price(&mut tx, actor.shop_id, price).await?;
        }
        if let Some(name) = patch.name {
            product.name = clean_name(&name)?;
        }
        if let Some(description) = patch.description {
            product.description = Some(description);
        }
        if let Some(stock) = patch.stock {
            ensure_stock(stock)?;
            product.stock = stock;
        }
        if let Some(is_limit_stock) = patch.is_limit_stock {
            product.is_limit_stock = is_limit_stock;
        }
        if let Some(is_active) = patch.is_active {
            product.is_active = is_active;
        }

        tx.update_product(&product).await?;
        tx.append_log(
            NewLog::new(
                actor.shop_id,
                LogKind::ProductUpdate,
                format!("updated product {}", product.id),
            )
            .actor(actor.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::ProductUpdated {
            shop_id: actor.shop_id,
            stall_id: product.stall_id,
            product_id,
        });
        Ok(product)
    }

    /// Set the display order of a stall's products. `product_ids` must list
    /// every product of the stall exactly once.
    pub async fn reorder_products(
        &self,
        actor: &Member,
        stall_id: i64,
        product_ids: &[i64],
    ) -> Result<(), ShopError> {
        ensure_manager(actor)?;

        let mut tx = self.store.begin().await?;
        let stall = find_stall(&mut tx, actor.shop_id, stall_id).await?;
        let products = tx.list_products(stall.id).await?;
        if products.is_empty() {
            return Ok(());
        }
        let existing: Vec<i64> = products.iter().map(|p| p.id).collect();
        ensure_permutation(product_ids, &existing)?;

        for mut product in products {
            if let Some(pos) = product_ids.iter().position(|id| *id == product.id) {
                product.sort_order = pos as i64 + 1;
                tx.update_product(&product).await?;
            }
        }
        tx.append_log(
            NewLog::new(
                actor.shop_id,
                LogKind::ProductReorder,
                format!("reordered products of stall {}", stall.id),
            )
            .actor(actor.id),
        )
        .await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::ProductsReordered {
            shop_id: actor.shop_id,
            stall_id,
        });
        Ok(())
    }
}

async fn find_stall<T: ShopTx>(tx: &mut T, shop_id: i64, stall_id: i64) -> Result<Stall, ShopError> {
    match tx.get_stall(stall_id).await? {
        Some(stall) if stall.shop_id == shop_id => Ok(stall),
        _ => Err(ShopError::NotFound("stall")),
    }
}

fn ensure_stock(stock: i64) -> Result<(), ShopError> {
    if stock < 0 {
        Err(ShopError::InvalidAmount(format!(
            "stock must not be negative, got {stock}"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shop::test_support::{seed_shop, RecordingNotifier};
    use crate::core::shop::PriceState;
    use crate::infra::shop::InMemoryShopStore;

    fn service(store: &InMemoryShopStore) -> CatalogService<InMemoryShopStore> {
        CatalogService::new(store.clone(), RecordingNotifier::new())
    }

    #[tokio::test]
    async fn products_append_to_the_end_of_their_stall() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);

        let first = svc
            .create_product(&fx.owner, fx.stall.id, ProductDraft::new("Bread", 3))
            .await
            .unwrap();
        let second = svc
            .create_product(&fx.owner, fx.stall.id, ProductDraft::new("Milk", 3))
            .await
            .unwrap();
        assert_eq!((first.sort_order, second.sort_order), (1, 2));
        assert_eq!(first.price.state(), PriceState::Unpriced);
        assert!(first.is_limit_stock);
    }

    #[tokio::test]
    async fn product_prices_go_through_the_pricing_rules() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);
        let gold = fx.currencies[0].id;

        let product = svc
            .create_product(&fx.clerk, fx.stall.id, ProductDraft::new("Bow", 1))
            .await
            .unwrap();

        let priced = svc
            .update_product(
                &fx.clerk,
                product.id,
                ProductPatch {
                    price: Some(Price::Priced {
                        amount: 12,
                        currency_id: gold,
                    }),
                    ..ProductPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(priced.price.amount(), Some(12));

        let err = svc
            .update_product(
                &fx.clerk,
                product.id,
                ProductPatch {
                    price: Some(Price::DisabledCurrency),
                    ..ProductPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Forbidden(_)));

        let err = svc
            .update_product(
                &fx.clerk,
                product.id,
                ProductPatch {
                    stock: Some(-1),
                    ..ProductPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn customers_only_see_active_listings() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);

        let hidden = svc
            .create_product(&fx.owner, fx.stall.id, ProductDraft::new("Secret", 1))
            .await
            .unwrap();
        svc.create_product(&fx.owner, fx.stall.id, ProductDraft::new("Public", 1))
            .await
            .unwrap();
        svc.update_product(
            &fx.owner,
            hidden.id,
            ProductPatch {
                is_active: Some(false),
                ..ProductPatch::default()
            },
        )
        .await
        .unwrap();
        let closed = svc.create_stall(&fx.owner, "Closed", None).await.unwrap();
        svc.update_stall(
            &fx.owner,
            closed.id,
            StallPatch {
                is_active: Some(false),
                ..StallPatch::default()
            },
        )
        .await
        .unwrap();

        let customer_view = svc.list_stalls(&fx.customers[0]).await.unwrap();
        assert_eq!(customer_view.len(), 1);
        assert_eq!(customer_view[0].products.len(), 1);
        assert_eq!(customer_view[0].products[0].name, "Public");

        let manager_view = svc.list_stalls(&fx.clerk).await.unwrap();
        assert_eq!(manager_view.len(), 2);
        assert_eq!(manager_view[0].products.len(), 2);
    }

    #[tokio::test]
    async fn reorder_and_delete_stall() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);

        let a = svc
            .create_product(&fx.owner, fx.stall.id, ProductDraft::new("A", 1))
            .await
            .unwrap();
        let b = svc
            .create_product(&fx.owner, fx.stall.id, ProductDraft::new("B", 1))
            .await
            .unwrap();

        assert!(matches!(
            svc.reorder_products(&fx.owner, fx.stall.id, &[b.id]).await,
            Err(ShopError::BadRequest(_))
        ));
        svc.reorder_products(&fx.owner, fx.stall.id, &[b.id, a.id])
            .await
            .unwrap();
        let listing = svc.list_stalls(&fx.owner).await.unwrap();
        let names: Vec<&str> = listing[0].products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);

        svc.delete_stall(&fx.owner, fx.stall.id).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_product(a.id).await.unwrap().is_none());
        assert!(tx.list_stalls(fx.shop.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn customers_cannot_edit_the_catalog() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);

        assert!(matches!(
            svc.create_stall(&fx.customers[0], "Mine", None).await,
            Err(ShopError::Forbidden(_))
        ));
    }
}
