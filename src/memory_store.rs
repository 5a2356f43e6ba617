//! In-process store used by the unit tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{
    ActivityRecord, AttendanceRecord, EvaluationRecord, FollowState, RosterEntry, RosterFilter,
    StoredEvaluation, SubmissionEntry,
};
use crate::store::{ActivityStore, AttendanceStore, ClassDirectory, EvaluationStore, FollowStore};

#[derive(Default)]
struct Inner {
    roster: Vec<RosterEntry>,
    activity: HashMap<String, Vec<ActivityRecord>>,
    follow: HashMap<String, FollowState>,
    support_classes: HashMap<String, Vec<AttendanceRecord>>,
    evaluations: Vec<StoredEvaluation>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Number of upcoming reads that fail with `SourceUnavailable`
    failing_reads: AtomicU32,
    failing_writes: AtomicU32,
    pub history_fetches: AtomicUsize,
    pub window_fetches: AtomicUsize,
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn add_student(&self, student_id: &str, class_id: &str, teacher_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.roster.push(RosterEntry {
            student_id: student_id.to_string(),
            student_name: format!("Student {student_id}"),
            student_email: format!("{student_id}@example.com"),
            class_id: class_id.to_string(),
            class_name: format!("Class {class_id}"),
            teacher_id: teacher_id.to_string(),
        });
        inner.activity.entry(student_id.to_string()).or_default();
    }

    /// Appends one submission to the (student, date) record, creating it if needed.
    pub fn submit(&self, student_id: &str, date: NaiveDate, link: Option<&str>) {
        let mut inner = self.inner.lock().unwrap();
        let records = inner.activity.entry(student_id.to_string()).or_default();
        let entry = SubmissionEntry {
            submission_type: "homework".to_string(),
            question_number: 1,
            link: link.map(str::to_string),
            feedback: None,
        };
        match records.iter_mut().find(|record| record.date == date) {
            Some(record) => record.submissions.push(entry),
            None => {
                records.push(ActivityRecord {
                    student_id: student_id.to_string(),
                    date,
                    submissions: vec![entry],
                });
                records.sort_by_key(|record| record.date);
            }
        }
    }

    pub fn add_support_class(&self, class_id: &str, records: Vec<AttendanceRecord>) {
        let mut inner = self.inner.lock().unwrap();
        inner.support_classes.insert(class_id.to_string(), records);
    }

    pub fn evaluation_count(&self) -> usize {
        self.inner.lock().unwrap().evaluations.len()
    }

    fn check_read(&self) -> Result<()> {
        if take_failure(&self.failing_reads) {
            return Err(EngineError::SourceUnavailable("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if take_failure(&self.failing_writes) {
            return Err(EngineError::SourceUnavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn fetch_activity_records(&self, student_id: &str) -> Result<Vec<ActivityRecord>> {
        self.history_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.activity.get(student_id).cloned().unwrap_or_default())
    }

    async fn fetch_activity_since(
        &self,
        student_ids: &[String],
        since: NaiveDate,
    ) -> Result<Vec<ActivityRecord>> {
        self.window_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        let inner = self.inner.lock().unwrap();
        Ok(student_ids
            .iter()
            .filter_map(|id| inner.activity.get(id))
            .flatten()
            .filter(|record| record.date >= since)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ClassDirectory for MemoryStore {
    async fn fetch_class_roster(&self, filter: &RosterFilter) -> Result<Vec<RosterEntry>> {
        self.check_read()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .roster
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FollowStore for MemoryStore {
    async fn get_follow_state(&self, user_id: &str) -> Result<FollowState> {
        self.check_read()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.follow.get(user_id).cloned().unwrap_or_default())
    }

    async fn initialize_follow(
        &self,
        user_id: &str,
        candidates: &BTreeSet<String>,
    ) -> Result<bool> {
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        let state = inner.follow.entry(user_id.to_string()).or_default();
        if state.missing_homework_follow_initialized {
            return Ok(false);
        }
        state.following_student_ids = candidates.clone();
        state.missing_homework_follow_initialized = true;
        Ok(true)
    }

    async fn set_following(&self, user_id: &str, student_id: &str, following: bool) -> Result<()> {
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        let state = inner.follow.entry(user_id.to_string()).or_default();
        if following {
            state.following_student_ids.insert(student_id.to_string());
        } else {
            state.following_student_ids.remove(student_id);
        }
        Ok(())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn fetch_attendance_records(
        &self,
        support_class_id: &str,
    ) -> Result<Vec<AttendanceRecord>> {
        self.check_read()?;
        let inner = self.inner.lock().unwrap();
        inner
            .support_classes
            .get(support_class_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("support class {support_class_id}")))
    }
}

#[async_trait]
impl EvaluationStore for MemoryStore {
    async fn persist_evaluation(&self, record: &EvaluationRecord) -> Result<Uuid> {
        self.check_write()?;
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().unwrap();
        inner.evaluations.push(StoredEvaluation {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    async fn update_evaluation_notes(&self, id: Uuid, notes: Option<&str>) -> Result<()> {
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .evaluations
            .iter_mut()
            .find(|stored| stored.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("evaluation {id}")))?;
        stored.record.notes = notes.map(str::to_string);
        Ok(())
    }

    async fn list_evaluations(&self, student_id: &str) -> Result<Vec<StoredEvaluation>> {
        self.check_read()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .evaluations
            .iter()
            .rev()
            .filter(|stored| stored.record.student_id == student_id)
            .cloned()
            .collect())
    }
}
