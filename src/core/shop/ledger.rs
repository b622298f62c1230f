// Ledger store - balance rows for members and team pools.
//
// All reads and writes go through the caller's transaction, so the
// before/after values a caller logs are the ones that commit.

use super::shop_models::{BalanceChange, BalanceOwner, Shop, WalletMode};
use super::shop_store::{ShopError, ShopTx};

/// Current balance, 0 when no row exists.
pub async fn balance<T: ShopTx>(
    tx: &mut T,
    owner: BalanceOwner,
    currency_id: i64,
) -> Result<i64, ShopError> {
    Ok(tx.balance(owner, currency_id).await?.unwrap_or(0))
}

/// Add `delta` to a balance.
///
/// Fails with `InsufficientFunds` (and writes nothing) when the result would
/// be negative. There is no dedup key: retrying a failed transaction is the
/// caller's decision.
pub async fn apply_delta<T: ShopTx>(
    tx: &mut T,
    owner: BalanceOwner,
    currency_id: i64,
    delta: i64,
) -> Result<BalanceChange, ShopError> {
    let before = balance(tx, owner, currency_id).await?;
    let after = before
        .checked_add(delta)
        .ok_or_else(|| ShopError::InvalidAmount(format!("{delta} overflows the balance")))?;
    if after < 0 {
        return Err(ShopError::InsufficientFunds {
            required: -delta,
            available: before,
        });
    }
    tx.set_balance(owner, currency_id, after).await?;
    Ok(BalanceChange { before, after })
}

/// Set a balance to zero, returning what it held.
pub async fn zero<T: ShopTx>(
    tx: &mut T,
    owner: BalanceOwner,
    currency_id: i64,
) -> Result<i64, ShopError> {
    let before = balance(tx, owner, currency_id).await?;
    if before != 0 {
        tx.set_balance(owner, currency_id, 0).await?;
    }
    Ok(before)
}

/// The ledger a customer spends from, decided by the shop's wallet mode.
pub fn funding_owner(shop: &Shop, member_id: i64) -> BalanceOwner {
    match shop.wallet_mode {
        WalletMode::Personal => BalanceOwner::Member(member_id),
        WalletMode::Team => BalanceOwner::Team(shop.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::shop::InMemoryShopStore;
    use crate::core::shop::ShopStore;

    #[tokio::test]
    async fn missing_row_reads_as_zero() {
        let store = InMemoryShopStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(balance(&mut tx, BalanceOwner::Member(1), 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn apply_delta_reports_before_and_after() {
        let store = InMemoryShopStore::new();
        let mut tx = store.begin().await.unwrap();
        let owner = BalanceOwner::Team(4);

        let change = apply_delta(&mut tx, owner, 2, 25).await.unwrap();
        assert_eq!(change, BalanceChange { before: 0, after: 25 });

        let change = apply_delta(&mut tx, owner, 2, -10).await.unwrap();
        assert_eq!(change, BalanceChange { before: 25, after: 15 });
    }

    #[tokio::test]
    async fn balance_never_goes_negative() {
        let store = InMemoryShopStore::new();
        let mut tx = store.begin().await.unwrap();
        let owner = BalanceOwner::Member(9);

        // A mixed sequence of credits and debits; rejected debits leave no trace.
        let deltas = [5, -3, -4, 10, -12, -8, 1, -1, -1];
        let mut expected = 0i64;
        for delta in deltas {
            match apply_delta(&mut tx, owner, 1, delta).await {
                Ok(change) => {
                    expected += delta;
                    assert_eq!(change.after, expected);
                }
                Err(ShopError::InsufficientFunds { available, .. }) => {
                    assert_eq!(available, expected);
                    assert!(expected + delta < 0);
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
            assert!(balance(&mut tx, owner, 1).await.unwrap() >= 0);
        }
        assert_eq!(balance(&mut tx, owner, 1).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn zero_returns_previous_amount() {
        let store = InMemoryShopStore::new();
        let mut tx = store.begin().await.unwrap();
        let owner = BalanceOwner::Member(3);
        apply_delta(&mut tx, owner, 1, 42).await.unwrap();

        assert_eq!(zero(&mut tx, owner, 1).await.unwrap(), 42);
        assert_eq!(balance(&mut tx, owner, 1).await.unwrap(), 0);
    }
}
