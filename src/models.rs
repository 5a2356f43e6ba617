use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionEntry {
    #[serde(rename = "type")]
    pub submission_type: String,
    pub question_number: i32,
    pub link: Option<String>,
    pub feedback: Option<String>,
}

impl SubmissionEntry {
    /// A submission counts as activity only when it carries a non-blank link.
    pub fn is_valid(&self) -> bool {
        self.link
            .as_deref()
            .map(|link| !link.trim().is_empty())
            .unwrap_or(false)
    }
}

/// One document per (student, calendar day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub student_id: String,
    pub date: NaiveDate,
    pub submissions: Vec<SubmissionEntry>,
}

impl ActivityRecord {
    pub fn valid_submission_count(&self) -> usize {
        self.submissions.iter().filter(|entry| entry.is_valid()).count()
    }

    pub fn has_valid_submission(&self) -> bool {
        self.submissions.iter().any(SubmissionEntry::is_valid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub class_id: String,
    pub class_name: String,
    pub teacher_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RosterFilter {
    pub teacher_id: Option<String>,
    pub class_id: Option<String>,
}

impl RosterFilter {
    pub fn matches(&self, entry: &RosterEntry) -> bool {
        self.teacher_id
            .as_deref()
            .map_or(true, |teacher| teacher == entry.teacher_id)
            && self
                .class_id
                .as_deref()
                .map_or(true, |class| class == entry.class_id)
    }
}

/// Derived per invocation, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskRow {
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub class_id: String,
    pub class_name: String,
    pub teacher_id: String,
    pub last_submission_date: Option<NaiveDate>,
    pub days_since_last_submission: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSummary {
    pub class_name: String,
    pub at_risk_count: usize,
    pub never_submitted: usize,
    pub avg_days_since_submission: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowState {
    pub following_student_ids: BTreeSet<String>,
    pub missing_homework_follow_initialized: bool,
}

impl FollowState {
    pub fn is_following(&self, student_id: &str) -> bool {
        self.following_student_ids.contains(student_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn counts_as_attended(self) -> bool {
        !matches!(self, AttendanceStatus::Absent)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            "excused" => Some(AttendanceStatus::Excused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub student_id: String,
    pub status: AttendanceStatus,
}

/// One session of a supplemental class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub class_id: String,
    pub date: NaiveDate,
    pub entries: Vec<AttendanceEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Responsibility {
    Teacher,
    Student,
    Inconclusive,
}

impl Responsibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Responsibility::Teacher => "teacher",
            Responsibility::Student => "student",
            Responsibility::Inconclusive => "inconclusive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "teacher" => Some(Responsibility::Teacher),
            "student" => Some(Responsibility::Student),
            "inconclusive" => Some(Responsibility::Inconclusive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub student_id: String,
    pub support_class_id: String,
    pub date: NaiveDate,
    pub attendance_rate: f64,
    pub homework_completion_rate: f64,
    pub progress_improved: bool,
    pub responsibility: Responsibility,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvaluation {
    pub id: Uuid,
    #[serde(flatten)]
    pub record: EvaluationRecord,
}
