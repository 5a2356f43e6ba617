//! Student engagement and responsibility evaluation.
//!
//! Detects students who stopped submitting homework, keeps per-staff follow
//! lists over those alerts, and attributes missing progress in support
//! classes to the teacher, the student, or neither.

pub mod attendance;
pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluation;
pub mod follow;
#[cfg(test)]
mod memory_store;
pub mod models;
pub mod report;
pub mod responsibility;
pub mod retry;
pub mod risk;
pub mod scanner;
pub mod store;
pub mod trend;
