// Invite codes for joining a shop.

use super::events::{EventNotifier, ShopEvent};
use super::shop_config::ShopConfig;
use super::shop_models::{Invite, Member};
use super::shop_store::{ensure_manager, ShopError, ShopStore, ShopTx};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 6;

/// Six random uppercase letters and digits.
pub fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

type CodeSource = Box<dyn Fn() -> String + Send + Sync>;

pub struct InviteService<S: ShopStore> {
    store: S,
    notifier: Arc<dyn EventNotifier>,
    config: ShopConfig,
    codes: CodeSource,
}

impl<S: ShopStore> InviteService<S> {
    pub fn new(store: S, notifier: Arc<dyn EventNotifier>, config: ShopConfig) -> Self {
        Self {
            store,
            notifier,
            config,
            codes: Box::new(generate_invite_code),
        }
    }

    pub fn with_code_source(mut self, codes: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.codes = Box::new(codes);
        self
    }

    /// Create an invite valid for `ttl_minutes` (default and bounds from config).
    /// A code collision is retried with a fresh code a bounded number of times.
    pub async fn create_invite(
        &self,
        actor: &Member,
        ttl_minutes: Option<i64>,
    ) -> Result<Invite, ShopError> {
        ensure_manager(actor)?;
        let ttl = ttl_minutes
            .unwrap_or(self.config.invite_ttl_default_minutes)
            .clamp(1, self.config.invite_ttl_max_minutes);
        let expires_at = Utc::now() + Duration::minutes(ttl);

        for attempt in 1..=self.config.invite_code_attempts {
            let code = (self.codes)();
            let mut tx = self.store.begin().await?;
            match tx.insert_invite(actor.shop_id, &code, expires_at, actor.id).await {
                Ok(invite) => {
                    tx.commit().await?;
                    self.notifier.publish(ShopEvent::InviteCreated {
                        shop_id: actor.shop_id,
                    });
                    return Ok(invite);
                }
                Err(ShopError::Conflict(_)) => {
                    debug!(attempt, "Invite code collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ShopError::Conflict(
            "could not generate a unique invite code, try again".to_string(),
        ))
    }

    /// Usable invites, newest first.
    pub async fn list_invites(&self, actor: &Member) -> Result<Vec<Invite>, ShopError> {
        ensure_manager(actor)?;
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        Ok(tx
            .list_invites(actor.shop_id)
            .await?
            .into_iter()
            .filter(|invite| invite.is_usable(now))
            .collect())
    }

    /// Deactivate an invite; the cleanup sweep removes the row later.
    pub async fn delete_invite(&self, actor: &Member, invite_id: i64) -> Result<(), ShopError> {
        ensure_manager(actor)?;

        let mut tx = self.store.begin().await?;
        let mut invite = match tx.get_invite(invite_id).await? {
            Some(invite) if invite.shop_id == actor.shop_id => invite,
            _ => return Err(ShopError::NotFound("invite")),
        };
        invite.is_active = false;
        tx.update_invite(&invite).await?;
        tx.commit().await?;

        self.notifier.publish(ShopEvent::InviteDeleted {
            shop_id: actor.shop_id,
        });
        Ok(())
    }

    /// Maintenance sweep: delete expired and deactivated invites.
    pub async fn cleanup_invites(&self, now: DateTime<Utc>) -> Result<u64, ShopError> {
        let mut tx = self.store.begin().await?;
        let removed = tx.delete_stale_invites(now).await?;
        tx.commit().await?;
        if removed > 0 {
            info!(removed, "Removed stale invites");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shop::test_support::{seed_shop, RecordingNotifier};
    use crate::infra::shop::InMemoryShopStore;

    fn service(store: &InMemoryShopStore) -> InviteService<InMemoryShopStore> {
        InviteService::new(store.clone(), RecordingNotifier::new(), ShopConfig::default())
    }

    #[test]
    fn codes_are_six_uppercase_alphanumerics() {
        for _ in 0..50 {
            let code = generate_invite_code();
            assert_eq!(code.len(), 6);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn ttl_is_clamped() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 0).await;
        let svc = service(&store);

        let before = Utc::now();
        let invite = svc.create_invite(&fx.owner, Some(600)).await.unwrap();
        assert!(invite.expires_at <= before + Duration::minutes(61));
        assert!(invite.expires_at >= before + Duration::minutes(59));

        let invite = svc.create_invite(&fx.owner, Some(0)).await.unwrap();
        assert!(invite.expires_at <= Utc::now() + Duration::minutes(1));
    }

    #[tokio::test]
    async fn collisions_give_up_after_bounded_attempts() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 0).await;
        let svc = service(&store).with_code_source(|| "SAME01".to_string());

        svc.create_invite(&fx.owner, None).await.unwrap();
        assert!(matches!(
            svc.create_invite(&fx.owner, None).await,
            Err(ShopError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn deleted_and_expired_invites_are_swept() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 0).await;
        let svc = service(&store);

        let keep = svc.create_invite(&fx.clerk, None).await.unwrap();
        let drop_me = svc.create_invite(&fx.clerk, None).await.unwrap();
        svc.delete_invite(&fx.clerk, drop_me.id).await.unwrap();

        let listed = svc.list_invites(&fx.owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep.id);

        assert_eq!(svc.cleanup_invites(Utc::now()).await.unwrap(), 1);
        // Everything is expired an hour from now.
        assert_eq!(
            svc.cleanup_invites(Utc::now() + Duration::hours(2)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn customers_cannot_manage_invites() {
        let store = InMemoryShopStore::new();
        let fx = seed_shop(&store, 1).await;
        let svc = service(&store);

        assert!(matches!(
            svc.create_invite(&fx.customers[0], None).await,
            Err(ShopError::Forbidden(_))
        ));
    }
}
