// Configuration for the shop core.

/// How a deleted currency's row is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencyPurgePolicy {
    /// Delete the row (and detach log references) inside the purge transaction.
    Immediate,
    /// Leave an inactive row for the background sweep to remove.
    Deferred,
}

impl CurrencyPurgePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Some(CurrencyPurgePolicy::Immediate),
            "deferred" => Some(CurrencyPurgePolicy::Deferred),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShopConfig {
    /// Upper bound on rows returned by the audit log read path.
    pub log_shared_limit: usize,

    /// Customers only see their own log rows unless the shop is in TEAM mode.
    pub restrict_customer_logs: bool,

    pub currency_purge: CurrencyPurgePolicy,

    /// How many inactive currencies one sweep pass removes.
    pub currency_sweep_batch: usize,

    /// Currencies every new shop starts with.
    pub default_currencies: Vec<String>,

    /// Character name given to a shop's owner member.
    pub owner_char_name: String,

    pub invite_ttl_default_minutes: i64,
    pub invite_ttl_max_minutes: i64,

    /// Attempts at generating an unused invite code before giving up.
    pub invite_code_attempts: usize,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            log_shared_limit: 200,
            restrict_customer_logs: false,
            currency_purge: CurrencyPurgePolicy::Deferred,
            currency_sweep_batch: 50,
            default_currencies: vec![
                "Gold".to_string(),
                "Silver".to_string(),
                "Copper".to_string(),
            ],
            owner_char_name: "Owner".to_string(),
            invite_ttl_default_minutes: 10,
            invite_ttl_max_minutes: 60,
            invite_code_attempts: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_policy_parses_case_insensitively() {
        assert_eq!(
            CurrencyPurgePolicy::from_str(" Immediate"),
            Some(CurrencyPurgePolicy::Immediate)
        );
        assert_eq!(
            CurrencyPurgePolicy::from_str("deferred"),
            Some(CurrencyPurgePolicy::Deferred)
        );
        assert_eq!(CurrencyPurgePolicy::from_str("later"), None);
    }
}
