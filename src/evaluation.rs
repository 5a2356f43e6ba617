use std::sync::Arc;

use chrono::FixedOffset;
use tracing::info;
use uuid::Uuid;

use crate::attendance::{attendance_rate, homework_completion_rate};
use crate::clock::{self, Clock};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{EvaluationRecord, StoredEvaluation};
use crate::responsibility::{classify, ResponsibilityInput, Thresholds};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{ActivityStore, AttendanceStore, EvaluationStore};
use crate::trend::{daily_completion_counts, progress_improved};

pub struct Evaluator {
    attendance: Arc<dyn AttendanceStore>,
    activity: Arc<dyn ActivityStore>,
    evaluations: Arc<dyn EvaluationStore>,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
    thresholds: Thresholds,
    retry: RetryPolicy,
}

impl Evaluator {
    pub fn new(
        attendance: Arc<dyn AttendanceStore>,
        activity: Arc<dyn ActivityStore>,
        evaluations: Arc<dyn EvaluationStore>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            attendance,
            activity,
            evaluations,
            clock,
            utc_offset: config.utc_offset,
            thresholds: Thresholds::default(),
            retry: config.retry,
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Computes and appends a new evaluation for the student in the support
    /// class. Nothing is written unless every read succeeded.
    pub async fn evaluate(
        &self,
        student_id: &str,
        support_class_id: &str,
        notes: Option<String>,
    ) -> Result<StoredEvaluation> {
        let attendance_store = &self.attendance;
        let sessions = with_retry(&self.retry, "fetch_attendance_records", || {
            attendance_store.fetch_attendance_records(support_class_id)
        })
        .await?;

        let activity_store = &self.activity;
        let history = with_retry(&self.retry, "fetch_activity_records", || {
            activity_store.fetch_activity_records(student_id)
        })
        .await?;

        let input = ResponsibilityInput {
            attendance_rate: attendance_rate(&sessions, student_id),
            homework_completion_rate: homework_completion_rate(&history),
            progress_improved: progress_improved(&daily_completion_counts(&history)),
        };

        let record = EvaluationRecord {
            student_id: student_id.to_string(),
            support_class_id: support_class_id.to_string(),
            date: clock::today(self.clock.as_ref(), self.utc_offset),
            attendance_rate: input.attendance_rate,
            homework_completion_rate: input.homework_completion_rate,
            progress_improved: input.progress_improved,
            responsibility: classify(&input, &self.thresholds),
            notes,
        };

        // Appends are not idempotent, so the write is attempted once.
        let id = self.evaluations.persist_evaluation(&record).await?;
        info!(
            "Evaluated {} in {}: attendance {:.2}, completion {:.2}, improved {}, responsibility {}",
            student_id,
            support_class_id,
            record.attendance_rate,
            record.homework_completion_rate,
            record.progress_improved,
            record.responsibility.as_str()
        );

        Ok(StoredEvaluation { id, record })
    }

    pub async fn update_notes(&self, evaluation_id: Uuid, notes: Option<&str>) -> Result<()> {
        let store = &self.evaluations;
        with_retry(&self.retry, "update_evaluation_notes", || {
            store.update_evaluation_notes(evaluation_id, notes)
        })
        .await
    }

    pub async fn history(&self, student_id: &str) -> Result<Vec<StoredEvaluation>> {
        let store = &self.evaluations;
        with_retry(&self.retry, "list_evaluations", || {
            store.list_evaluations(student_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::clock::testing::FixedClock;
    use crate::error::EngineError;
    use crate::memory_store::MemoryStore;
    use crate::models::{AttendanceEntry, AttendanceRecord, AttendanceStatus, Responsibility};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 20).unwrap()
    }

    fn evaluator(store: Arc<MemoryStore>) -> Evaluator {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 5, 20, 8, 0, 0).unwrap(),
        ));
        let mut config = EngineConfig::default();
        config.retry.base_delay = std::time::Duration::from_millis(1);
        config.retry.max_delay = std::time::Duration::from_millis(2);
        Evaluator::new(store.clone(), store.clone(), store, clock, &config)
    }

    fn sessions(statuses: &[AttendanceStatus]) -> Vec<AttendanceRecord> {
        statuses
            .iter()
            .enumerate()
            .map(|(n, status)| AttendanceRecord {
                class_id: "support-1".to_string(),
                date: today() - Duration::days(n as i64 + 1),
                entries: vec![AttendanceEntry {
                    student_id: "s1".to_string(),
                    status: *status,
                }],
            })
            .collect()
    }

    #[tokio::test]
    async fn engaged_student_without_progress_points_at_teacher() {
        use AttendanceStatus::*;
        let store = Arc::new(MemoryStore::new());
        store.add_support_class(
            "support-1",
            sessions(&[
                Present, Present, Late, Excused, Present, Present, Present, Present, Present,
                Absent,
            ]),
        );
        for offset in 1..=4 {
            let date = today() - Duration::days(offset);
            store.submit("s1", date, Some("https://x/1"));
            store.submit("s1", date, Some("https://x/2"));
        }
        let evaluator = evaluator(store.clone());

        let stored = evaluator.evaluate("s1", "support-1", None).await.unwrap();

        assert!((stored.record.attendance_rate - 0.9).abs() < 1e-9);
        assert_eq!(stored.record.homework_completion_rate, 1.0);
        assert!(!stored.record.progress_improved);
        assert_eq!(stored.record.responsibility, Responsibility::Teacher);
        assert_eq!(stored.record.date, today());
    }

    #[tokio::test]
    async fn no_sessions_rates_zero_and_blames_engagement() {
        let store = Arc::new(MemoryStore::new());
        store.add_support_class("support-1", Vec::new());
        let evaluator = evaluator(store);

        let stored = evaluator.evaluate("s1", "support-1", None).await.unwrap();

        assert_eq!(stored.record.attendance_rate, 0.0);
        assert_eq!(stored.record.homework_completion_rate, 0.0);
        assert_eq!(stored.record.responsibility, Responsibility::Student);
    }

    #[tokio::test]
    async fn unknown_support_class_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let evaluator = evaluator(store.clone());

        let result = evaluator.evaluate("s1", "missing", None).await;

        assert!(matches!(result, Err(EngineError::NotFound(_))));
        assert_eq!(store.evaluation_count(), 0);
    }

    #[tokio::test]
    async fn read_failure_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.add_support_class("support-1", sessions(&[AttendanceStatus::Present]));
        store.fail_next_reads(3);
        let evaluator = evaluator(store.clone());

        let result = evaluator.evaluate("s1", "support-1", None).await;

        assert!(matches!(result, Err(EngineError::SourceUnavailable(_))));
        assert_eq!(store.evaluation_count(), 0);
    }

    #[tokio::test]
    async fn evaluations_append_and_notes_are_editable() {
        let store = Arc::new(MemoryStore::new());
        store.add_support_class("support-1", sessions(&[AttendanceStatus::Present]));
        let evaluator = evaluator(store);

        let first = evaluator
            .evaluate("s1", "support-1", Some("initial".to_string()))
            .await
            .unwrap();
        let second = evaluator.evaluate("s1", "support-1", None).await.unwrap();
        evaluator
            .update_notes(first.id, Some("met with family"))
            .await
            .unwrap();

        let history = evaluator.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].record.notes.as_deref(), Some("met with family"));

        let missing = evaluator.update_notes(Uuid::new_v4(), None).await;
        assert!(matches!(missing, Err(EngineError::NotFound(_))));
    }
}
