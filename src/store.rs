//! Boundaries to the surrounding application's stores.
//!
//! Every method reports store failures as errors; none of them may answer
//! a failed read with an empty or default value.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ActivityRecord, AttendanceRecord, EvaluationRecord, FollowState, RosterEntry, RosterFilter,
    StoredEvaluation,
};

#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Full history for one student, ascending by date
    async fn fetch_activity_records(&self, student_id: &str) -> Result<Vec<ActivityRecord>>;

    /// Records on or after `since` for any of `student_ids`
    async fn fetch_activity_since(
        &self,
        student_ids: &[String],
        since: NaiveDate,
    ) -> Result<Vec<ActivityRecord>>;
}

#[async_trait]
pub trait ClassDirectory: Send + Sync {
    async fn fetch_class_roster(&self, filter: &RosterFilter) -> Result<Vec<RosterEntry>>;
}

#[async_trait]
pub trait FollowStore: Send + Sync {
    /// Users without stored state get `FollowState::default()`
    async fn get_follow_state(&self, user_id: &str) -> Result<FollowState>;

    /// Seeds the follow set and sets the initialized flag in one atomic
    /// unit, only if the flag is still unset. Returns whether this call
    /// performed the seed.
    async fn initialize_follow(&self, user_id: &str, candidates: &BTreeSet<String>)
        -> Result<bool>;

    /// Idempotent add or remove of one student
    async fn set_following(&self, user_id: &str, student_id: &str, following: bool)
        -> Result<()>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// `NotFound` when the support class does not exist
    async fn fetch_attendance_records(&self, support_class_id: &str)
        -> Result<Vec<AttendanceRecord>>;
}

#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn persist_evaluation(&self, record: &EvaluationRecord) -> Result<Uuid>;

    async fn update_evaluation_notes(&self, id: Uuid, notes: Option<&str>) -> Result<()>;

    /// Newest first
    async fn list_evaluations(&self, student_id: &str) -> Result<Vec<StoredEvaluation>>;
}
