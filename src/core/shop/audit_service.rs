// Audit log read path.
//
// Rows are written by the services inside their own transactions; this
// module only decides who sees which rows and resolves member names.

use super::shop_config::ShopConfig;
use super::shop_models::{LogEntry, Member, MemberRole, WalletMode};
use super::shop_store::{require_shop, ShopError, ShopStore, ShopTx};
use serde::Serialize;
use std::collections::HashMap;

/// A log row with the names of the members it mentions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogView {
    #[serde(flatten)]
    pub entry: LogEntry,
    pub actor_name: Option<String>,
    pub actor_role: Option<MemberRole>,
    pub member_name: Option<String>,
    pub member_role: Option<MemberRole>,
}

pub struct AuditService<S: ShopStore> {
    store: S,
    config: ShopConfig,
}

impl<S: ShopStore> AuditService<S> {
    pub fn new(store: S, config: ShopConfig) -> Self {
        Self { store, config }
    }

    /// Newest rows first, at most `limit` (capped by the configured maximum).
    ///
    /// History is shared by the whole shop unless customer logs are
    /// restricted, in which case a customer only sees rows about themselves
    /// while the shop is not in TEAM mode.
    pub async fn list_logs(
        &self,
        actor: &Member,
        limit: Option<usize>,
    ) -> Result<Vec<LogView>, ShopError> {
        let cap = self.config.log_shared_limit.max(1);
        let limit = limit.unwrap_or(cap).clamp(1, cap);

        let mut tx = self.store.begin().await?;
        let shop = require_shop(&mut tx, actor.shop_id).await?;

        let involving = if self.config.restrict_customer_logs
            && actor.role == MemberRole::Customer
            && shop.wallet_mode != WalletMode::Team
        {
            Some(actor.id)
        } else {
            None
        };

        let entries = tx.list_logs(shop.id, involving, limit).await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let members: HashMap<i64, Member> = tx
            .list_members(shop.id)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        let lookup = |id: Option<i64>| id.and_then(|id| members.get(&id));

        Ok(entries
            .into_iter()
            .map(|entry| {
                let actor = lookup(entry.actor_id);
                let member = lookup(entry.member_id);
                LogView {
                    actor_name: actor.map(|m| m.char_name.clone()),
                    actor_role: actor.map(|m| m.role),
                    member_name: member.map(|m| m.char_name.clone()),
                    member_role: member.map(|m| m.role),
                    entry,
                }
            })
            .collect())
    }
}
