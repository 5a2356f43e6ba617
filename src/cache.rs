use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::models::{RiskRow, RosterFilter};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RiskListKey {
    pub filter: RosterFilter,
    pub lookback_days: i64,
    pub today: NaiveDate,
}

struct CachedList {
    rows: Vec<RiskRow>,
    stored_at: DateTime<Utc>,
}

/// TTL cache over computed at-risk lists.
pub struct RiskListCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<RiskListKey, CachedList>>,
}

impl RiskListCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &RiskListKey) -> Option<Vec<RiskRow>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(cached) if now - cached.stored_at < self.ttl => {
                debug!("Risk list cache hit for {:?}", key);
                Some(cached.rows.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: RiskListKey, rows: Vec<RiskRow>) {
        let stored_at = self.clock.now();
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, CachedList { rows, stored_at });
        }
    }

    pub fn invalidate(&self, key: &RiskListKey) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
