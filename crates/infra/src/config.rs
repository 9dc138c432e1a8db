//! Settlement configuration, read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `PAYOUT_DUE_DAYS` | 7 |
//! | `MAX_DISPATCH_ATTEMPTS` | 8 |
//! | `ORDER_NUMBER_ATTEMPTS` | 5 |
//! | `CANCELLATION_STOCK_POLICY` | `retain` (`retain` \| `restore`) |

use core::str::FromStr;

use thiserror::Error;

/// What happens to an order's reserved stock when it is cancelled.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CancellationStockPolicy {
    /// Stock stays consumed. Only an admin rejection gives it back.
    #[default]
    Retain,
    /// Cancelling releases the order's reservation.
    Restore,
}

impl FromStr for CancellationStockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "restore" => Ok(Self::Restore),
            other => Err(format!("expected 'retain' or 'restore', got '{other}'")),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Default payout due date offset from creation.
    pub payout_due_days: i64,
    /// Load/decide/append attempts before a conflict is surfaced.
    pub max_dispatch_attempts: u32,
    /// Order number generations before placement gives up.
    pub order_number_attempts: u32,
    pub cancellation_stock_policy: CancellationStockPolicy,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            payout_due_days: 7,
            max_dispatch_attempts: 8,
            order_number_attempts: 5,
            cancellation_stock_policy: CancellationStockPolicy::Retain,
        }
    }
}

impl SettlementConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or empty keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let payout_due_days = match get("PAYOUT_DUE_DAYS") {
            Some(v) => parse::<i64>("PAYOUT_DUE_DAYS", &v).and_then(|d| {
                if d < 0 {
                    Err(invalid("PAYOUT_DUE_DAYS", &v, "must not be negative"))
                } else {
                    Ok(d)
                }
            })?,
            None => defaults.payout_due_days,
        };

        let max_dispatch_attempts = match get("MAX_DISPATCH_ATTEMPTS") {
            Some(v) => at_least_one("MAX_DISPATCH_ATTEMPTS", &v)?,
            None => defaults.max_dispatch_attempts,
        };

        let order_number_attempts = match get("ORDER_NUMBER_ATTEMPTS") {
            Some(v) => at_least_one("ORDER_NUMBER_ATTEMPTS", &v)?,
            None => defaults.order_number_attempts,
        };

        let cancellation_stock_policy = match get("CANCELLATION_STOCK_POLICY") {
            Some(v) => v
                .parse()
                .map_err(|reason| invalid("CANCELLATION_STOCK_POLICY", &v, reason))?,
            None => defaults.cancellation_stock_policy,
        };

        Ok(Self {
            payout_due_days,
            max_dispatch_attempts,
            order_number_attempts,
            cancellation_stock_policy,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| invalid(key, value, e.to_string()))
}

fn at_least_one(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    match parse::<u32>(key, value)? {
        0 => Err(invalid(key, value, "must be at least 1")),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_keys_fall_back_to_defaults() {
        let cfg = SettlementConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, SettlementConfig::default());
        assert_eq!(cfg.payout_due_days, 7);
        assert_eq!(cfg.cancellation_stock_policy, CancellationStockPolicy::Retain);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = SettlementConfig::from_lookup(lookup(&[
            ("PAYOUT_DUE_DAYS", "14"),
            ("MAX_DISPATCH_ATTEMPTS", "3"),
            ("CANCELLATION_STOCK_POLICY", "Restore"),
        ]))
        .unwrap();
        assert_eq!(cfg.payout_due_days, 14);
        assert_eq!(cfg.max_dispatch_attempts, 3);
        assert_eq!(cfg.order_number_attempts, 5);
        assert_eq!(cfg.cancellation_stock_policy, CancellationStockPolicy::Restore);
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let err = SettlementConfig::from_lookup(lookup(&[("MAX_DISPATCH_ATTEMPTS", "0")])).unwrap_err();
        match err {
            ConfigError::Invalid { key, .. } => assert_eq!(key, "MAX_DISPATCH_ATTEMPTS"),
        }
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(SettlementConfig::from_lookup(lookup(&[("CANCELLATION_STOCK_POLICY", "refund")])).is_err());
    }
}
