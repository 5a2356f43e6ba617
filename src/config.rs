use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::error::{EngineError, Result};
use crate::retry::RetryPolicy;

pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub utc_offset: FixedOffset,
    pub retry: RetryPolicy,
    pub fetch_concurrency: usize,
    pub cache_ttl: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            retry: RetryPolicy::default(),
            fetch_concurrency: 8,
            cache_ttl: chrono::Duration::seconds(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RawSettings {
    pub utc_offset_minutes: i32,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub max_backoff_ms: u64,
    pub fetch_concurrency: usize,
    pub cache_ttl_secs: i64,
}

impl EngineConfig {
    pub fn from_settings(raw: RawSettings) -> Result<Self> {
        let utc_offset = FixedOffset::east_opt(raw.utc_offset_minutes * 60).ok_or_else(|| {
            EngineError::InvalidInput(format!(
                "utc offset of {} minutes is out of range",
                raw.utc_offset_minutes
            ))
        })?;

        if !(1..=10).contains(&raw.max_attempts) {
            return Err(EngineError::InvalidInput(format!(
                "max attempts must be between 1 and 10, got {}",
                raw.max_attempts
            )));
        }

        if raw.fetch_concurrency == 0 {
            return Err(EngineError::InvalidInput(
                "fetch concurrency must be positive".to_string(),
            ));
        }

        if raw.cache_ttl_secs < 0 {
            return Err(EngineError::InvalidInput(
                "cache ttl cannot be negative".to_string(),
            ));
        }

        Ok(Self {
            utc_offset,
            retry: RetryPolicy {
                max_attempts: raw.max_attempts,
                base_delay: Duration::from_millis(raw.backoff_base_ms),
                max_delay: Duration::from_millis(raw.max_backoff_ms.max(raw.backoff_base_ms)),
            },
            fetch_concurrency: raw.fetch_concurrency,
            cache_ttl: chrono::Duration::seconds(raw.cache_ttl_secs),
        })
    }
}

pub fn validate_lookback(days: i64) -> Result<i64> {
    if days <= 0 {
        return Err(EngineError::InvalidInput(format!(
            "lookback window must be at least one day, got {days}"
        )));
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawSettings {
        RawSettings {
            utc_offset_minutes: 330,
            max_attempts: 3,
            backoff_base_ms: 100,
            max_backoff_ms: 50,
            fetch_concurrency: 4,
            cache_ttl_secs: 60,
        }
    }

    #[test]
    fn builds_config_from_settings() {
        let config = EngineConfig::from_settings(raw()).unwrap();
        assert_eq!(config.utc_offset.local_minus_utc(), 330 * 60);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_delay, Duration::from_millis(100));
        assert_eq!(config.fetch_concurrency, 4);
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let mut bad = raw();
        bad.max_attempts = 0;
        assert!(EngineConfig::from_settings(bad).is_err());

        let mut bad = raw();
        bad.fetch_concurrency = 0;
        assert!(EngineConfig::from_settings(bad).is_err());

        let mut bad = raw();
        bad.utc_offset_minutes = 24 * 60;
        assert!(EngineConfig::from_settings(bad).is_err());
    }

    #[test]
    fn lookback_must_be_positive() {
        assert_eq!(validate_lookback(7).unwrap(), 7);
        assert!(matches!(validate_lookback(0), Err(EngineError::InvalidInput(_))));
        assert!(validate_lookback(-3).is_err());
    }
}
