//! Rule-based attribution of missing progress.
//!
//! Rules, first match wins:
//! 1. attendance and completion both above threshold, no improvement: teacher
//! 2. attendance or completion below threshold: student
//! 3. otherwise: inconclusive
//!
//! Values exactly on a threshold satisfy neither rule 1 nor rule 2.

use crate::models::Responsibility;

pub const DEFAULT_ATTENDANCE_THRESHOLD: f64 = 0.8;
pub const DEFAULT_COMPLETION_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub attendance: f64,
    pub completion: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            attendance: DEFAULT_ATTENDANCE_THRESHOLD,
            completion: DEFAULT_COMPLETION_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponsibilityInput {
    pub attendance_rate: f64,
    pub homework_completion_rate: f64,
    pub progress_improved: bool,
}

pub fn classify(input: &ResponsibilityInput, thresholds: &Thresholds) -> Responsibility {
    if input.attendance_rate > thresholds.attendance
        && input.homework_completion_rate > thresholds.completion
        && !input.progress_improved
    {
        Responsibility::Teacher
    } else if input.attendance_rate < thresholds.attendance
        || input.homework_completion_rate < thresholds.completion
    {
        Responsibility::Student
    } else {
        Responsibility::Inconclusive
    }
}
