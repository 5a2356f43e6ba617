//! Submission ledger scan.
//!
//! Pass one issues a single bounded query over the lookback window and marks
//! every student with a valid submission in it as active. Pass two fetches
//! full history only for the remaining students, to find their most recent
//! valid submission.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::models::ActivityRecord;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::ActivityStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub active: HashSet<String>,
    /// Absent key means the student never submitted
    pub last_submission: HashMap<String, NaiveDate>,
}

impl ScanResult {
    pub fn is_active(&self, student_id: &str) -> bool {
        self.active.contains(student_id)
    }

    pub fn last_submission(&self, student_id: &str) -> Option<NaiveDate> {
        self.last_submission.get(student_id).copied()
    }
}

/// First day of the window; the window runs through `today` inclusive.
/// Windows reaching past the earliest representable date start there.
pub fn window_start(today: NaiveDate, lookback_days: i64) -> NaiveDate {
    Duration::try_days(lookback_days)
        .and_then(|span| today.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}

/// Most recent date up to `today` carrying at least one valid submission.
pub fn last_valid_submission(records: &[ActivityRecord], today: NaiveDate) -> Option<NaiveDate> {
    let mut newest_first: Vec<&ActivityRecord> =
        records.iter().filter(|record| record.date <= today).collect();
    newest_first.sort_by(|a, b| b.date.cmp(&a.date));
    newest_first
        .into_iter()
        .find(|record| record.has_valid_submission())
        .map(|record| record.date)
}

pub struct SubmissionScanner {
    store: Arc<dyn ActivityStore>,
    retry: RetryPolicy,
    concurrency: usize,
}

impl SubmissionScanner {
    pub fn new(store: Arc<dyn ActivityStore>, retry: RetryPolicy, concurrency: usize) -> Self {
        Self {
            store,
            retry,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn scan(
        &self,
        student_ids: &[String],
        today: NaiveDate,
        lookback_days: i64,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut unique = Vec::with_capacity(student_ids.len());
        let mut seen = HashSet::new();
        for id in student_ids {
            if seen.insert(id.as_str()) {
                unique.push(id.clone());
            }
        }

        let mut result = ScanResult::default();
        if unique.is_empty() {
            return Ok(result);
        }

        let since = window_start(today, lookback_days);
        let store = &self.store;
        let recent = with_retry(&self.retry, "fetch_activity_since", || {
            store.fetch_activity_since(&unique, since)
        })
        .await?;

        for record in recent.iter() {
            if record.date < since || record.date > today || !record.has_valid_submission() {
                continue;
            }
            if !seen.contains(record.student_id.as_str()) {
                continue;
            }
            result.active.insert(record.student_id.clone());
            let latest = result
                .last_submission
                .entry(record.student_id.clone())
                .or_insert(record.date);
            if record.date > *latest {
                *latest = record.date;
            }
        }

        let pending: Vec<String> = unique
            .into_iter()
            .filter(|id| !result.active.contains(id))
            .collect();

        debug!(
            "Window scan since {} found {} active students, {} need full history",
            since,
            result.active.len(),
            pending.len()
        );

        let history = self.fetch_last_submissions(pending, today, cancel).await?;
        result.last_submission.extend(history);

        Ok(result)
    }

    async fn fetch_last_submissions(
        &self,
        pending: Vec<String>,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, NaiveDate>> {
        let mut queue = pending.into_iter();
        let mut tasks = JoinSet::new();
        let mut found = HashMap::new();

        loop {
            while tasks.len() < self.concurrency {
                let Some(student_id) = queue.next() else {
                    break;
                };
                let store = Arc::clone(&self.store);
                let policy = self.retry;
                tasks.spawn(async move {
                    let records = with_retry(&policy, "fetch_activity_records", || {
                        store.fetch_activity_records(&student_id)
                    })
                    .await?;
                    Ok::<_, EngineError>((student_id, last_valid_submission(&records, today)))
                });
            }

            let joined = tokio::select! {
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(EngineError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            let outcome = joined.map_err(|e| {
                EngineError::SourceUnavailable(format!("history fetch task failed: {e}"))
            })?;
            // JoinSet drop aborts the remaining fetches on early return.
            let (student_id, last) = outcome?;
            if let Some(date) = last {
                found.insert(student_id, date);
            }
        }

        Ok(found)
    }
}
