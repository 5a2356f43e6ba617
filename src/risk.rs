use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::{RiskListCache, RiskListKey};
use crate::clock::{self, Clock};
use crate::config::{validate_lookback, EngineConfig};
use crate::error::Result;
use crate::models::{RiskRow, RosterEntry, RosterFilter};
use crate::retry::{with_retry, RetryPolicy};
use crate::scanner::{ScanResult, SubmissionScanner};
use crate::store::{ActivityStore, ClassDirectory};

/// Builds one row per inactive student, most overdue first.
///
/// Students keep their first matching roster entry. Students with no roster
/// entry passing `filter` are left out entirely.
pub fn classify_missing_homework(
    roster: &[RosterEntry],
    filter: &RosterFilter,
    scan: &ScanResult,
    today: NaiveDate,
) -> Vec<RiskRow> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for entry in roster.iter().filter(|entry| filter.matches(entry)) {
        if !seen.insert(entry.student_id.as_str()) || scan.is_active(&entry.student_id) {
            continue;
        }

        let last_submission_date = scan.last_submission(&entry.student_id);
        rows.push(RiskRow {
            student_id: entry.student_id.clone(),
            student_name: entry.student_name.clone(),
            student_email: entry.student_email.clone(),
            class_id: entry.class_id.clone(),
            class_name: entry.class_name.clone(),
            teacher_id: entry.teacher_id.clone(),
            last_submission_date,
            days_since_last_submission: last_submission_date.map(|date| (today - date).num_days()),
        });
    }

    rows.sort_by(|a, b| {
        compare_severity(a.days_since_last_submission, b.days_since_last_submission)
    });
    rows
}

/// Never-submitted sorts first, then longer gaps first.
pub fn compare_severity(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(&x),
    }
}

pub struct MissingHomeworkService {
    directory: Arc<dyn ClassDirectory>,
    scanner: SubmissionScanner,
    cache: RiskListCache,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
    retry: RetryPolicy,
}

impl MissingHomeworkService {
    pub fn new(
        directory: Arc<dyn ClassDirectory>,
        activity: Arc<dyn ActivityStore>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            directory,
            scanner: SubmissionScanner::new(activity, config.retry, config.fetch_concurrency),
            cache: RiskListCache::new(config.cache_ttl, Arc::clone(&clock)),
            clock,
            utc_offset: config.utc_offset,
            retry: config.retry,
        }
    }

    pub fn today(&self) -> NaiveDate {
        clock::today(self.clock.as_ref(), self.utc_offset)
    }

    pub fn cache(&self) -> &RiskListCache {
        &self.cache
    }

    pub async fn at_risk_students(
        &self,
        filter: &RosterFilter,
        lookback_days: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<RiskRow>> {
        let lookback_days = validate_lookback(lookback_days)?;
        let today = self.today();
        let key = RiskListKey {
            filter: filter.clone(),
            lookback_days,
            today,
        };

        if let Some(rows) = self.cache.get(&key) {
            return Ok(rows);
        }

        let directory = &self.directory;
        let roster = with_retry(&self.retry, "fetch_class_roster", || {
            directory.fetch_class_roster(filter)
        })
        .await?;

        let student_ids: Vec<String> = roster
            .iter()
            .filter(|entry| filter.matches(entry))
            .map(|entry| entry.student_id.clone())
            .collect();

        let scan = self
            .scanner
            .scan(&student_ids, today, lookback_days, cancel)
            .await?;
        let rows = classify_missing_homework(&roster, filter, &scan, today);

        info!(
            "{} of {} rostered students missing homework over {} days",
            rows.len(),
            scan.active.len() + rows.len(),
            lookback_days
        );

        self.cache.insert(key, rows.clone());
        Ok(rows)
    }
}
