use crate::models::{ActivityRecord, AttendanceRecord};

/// Share of the student's sessions in the class that were not absences.
///
/// Only sessions listing the student are counted. No sessions gives 0.
pub fn attendance_rate(records: &[AttendanceRecord], student_id: &str) -> f64 {
    let mut sessions = 0usize;
    let mut attended = 0usize;

    for record in records {
        let Some(entry) = record
            .entries
            .iter()
            .find(|entry| entry.student_id == student_id)
        else {
            continue;
        };
        sessions += 1;
        if entry.status.counts_as_attended() {
            attended += 1;
        }
    }

    ratio(attended, sessions)
}

/// Share of all submission entries carrying a valid link. No entries gives 0.
pub fn homework_completion_rate(records: &[ActivityRecord]) -> f64 {
    let total: usize = records.iter().map(|record| record.submissions.len()).sum();
    let completed: usize = records
        .iter()
        .map(ActivityRecord::valid_submission_count)
        .sum();
    ratio(completed, total)
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
