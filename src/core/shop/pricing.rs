// Pricing engine - the PRICED / UNPRICED / DISABLED_CURRENCY state machine.

use super::shop_models::{Currency, Price, Product};
use super::shop_store::{require_active_currency, ShopError, ShopTx};

/// Validate a price a manager wants to put on a product.
///
/// DISABLED_CURRENCY is only ever set by currency deletion, so asking for it
/// directly is forbidden.
pub async fn validate_requested_price<T: ShopTx>(
    tx: &mut T,
    shop_id: i64,
    requested: Price,
) -> Result<Price, ShopError> {
    match requested {
        Price::Unpriced => Ok(Price::Unpriced),
        Price::DisabledCurrency => Err(ShopError::Forbidden(
            "the disabled-currency state is maintained by the system",
        )),
        Price::Priced {
            amount,
            currency_id,
        } => {
            if amount < 0 {
                return Err(ShopError::InvalidAmount(format!(
                    "price must not be negative, got {amount}"
                )));
            }
            require_active_currency(tx, shop_id, currency_id).await?;
            Ok(requested)
        }
    }
}

/// Unit price and currency of a product that can be bought right now.
pub async fn purchasable_price<T: ShopTx>(
    tx: &mut T,
    product: &Product,
) -> Result<(i64, Currency), ShopError> {
    let Price::Priced {
        amount,
        currency_id,
    } = product.price
    else {
        return Err(ShopError::NotPriced);
    };
    let currency = require_active_currency(tx, product.shop_id, currency_id).await?;
    Ok((amount, currency))
}

/// Force every product priced in `currency_id` out of the PRICED state.
/// Returns the number of products touched.
pub async fn disable_currency_prices<T: ShopTx>(
    tx: &mut T,
    shop_id: i64,
    currency_id: i64,
    fallback: Price,
) -> Result<usize, ShopError> {
    let products = tx.products_priced_in(shop_id, currency_id).await?;
    for mut product in products.iter().cloned() {
        product.price = fallback;
        tx.update_product(&product).await?;
    }
    Ok(products.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shop::test_support::{seed_shop, stock_product};
    use crate::core::shop::ShopStore;
    use crate::infra::shop::InMemoryShopStore;

    #[tokio::test]
    async fn disabled_currency_cannot_be_requested() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let mut tx = store.begin().await.unwrap();

        let err = validate_requested_price(&mut tx, fx.shop.id, Price::DisabledCurrency)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Forbidden(_)));
    }

    #[tokio::test]
    async fn priced_needs_active_currency_and_non_negative_amount() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let gold = fx.currencies[0].id;
        let mut tx = store.begin().await.unwrap();

        let negative = Price::Priced {
            amount: -1,
            currency_id: gold,
        };
        assert!(matches!(
            validate_requested_price(&mut tx, fx.shop.id, negative).await,
            Err(ShopError::InvalidAmount(_))
        ));

        let unknown = Price::Priced {
            amount: 5,
            currency_id: 9999,
        };
        assert_eq!(
            validate_requested_price(&mut tx, fx.shop.id, unknown).await,
            Err(ShopError::CurrencyUnavailable)
        );

        let ok = Price::Priced {
            amount: 0,
            currency_id: gold,
        };
        assert_eq!(validate_requested_price(&mut tx, fx.shop.id, ok).await, Ok(ok));
    }

    #[tokio::test]
    async fn only_priced_products_are_purchasable() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let gold = fx.currencies[0].id;
        let product = stock_product(&store, &fx, "Potion", Price::Unpriced, 5).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            purchasable_price(&mut tx, &product).await,
            Err(ShopError::NotPriced)
        );

        let mut priced = product.clone();
        priced.price = Price::Priced {
            amount: 3,
            currency_id: gold,
        };
        let (amount, currency) = purchasable_price(&mut tx, &priced).await.unwrap();
        assert_eq!((amount, currency.id), (3, gold));
    }

    #[tokio::test]
    async fn disabling_a_currency_moves_products_out_of_priced() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let gold = fx.currencies[0].id;
        let silver = fx.currencies[1].id;
        let in_gold = stock_product(
            &store,
            &fx,
            "Sword",
            Price::Priced {
                amount: 10,
                currency_id: gold,
            },
            1,
        )
        .await;
        let in_silver = stock_product(
            &store,
            &fx,
            "Shield",
            Price::Priced {
                amount: 4,
                currency_id: silver,
            },
            1,
        )
        .await;

        let mut tx = store.begin().await.unwrap();
        let touched = disable_currency_prices(&mut tx, fx.shop.id, gold, Price::DisabledCurrency)
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let sword = tx.get_product(in_gold.id).await.unwrap().unwrap();
        let shield = tx.get_product(in_silver.id).await.unwrap().unwrap();
        assert_eq!(sword.price, Price::DisabledCurrency);
        assert_eq!(shield.price, in_silver.price);
    }
}
