//! Per-staff follow lists over the missing-homework view.
//!
//! Follow state only decides which at-risk rows are shown prominently and
//! which are muted; it never changes who is at risk.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::models::{FollowState, RiskRow, RosterFilter};
use crate::retry::{with_retry, RetryPolicy};
use crate::risk::MissingHomeworkService;
use crate::store::FollowStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FollowPartition {
    pub followed: Vec<RiskRow>,
    pub muted: Vec<RiskRow>,
}

/// Splits rows by follow state, keeping their order within each side.
pub fn partition_by_follow(rows: Vec<RiskRow>, state: &FollowState) -> FollowPartition {
    let (followed, muted): (Vec<RiskRow>, Vec<RiskRow>) = rows
        .into_iter()
        .partition(|row| state.is_following(&row.student_id));
    FollowPartition { followed, muted }
}

impl FollowPartition {
    /// Caps the combined row count at `limit`, spending it on followed rows
    /// before muted ones.
    pub fn truncate(&mut self, limit: usize) {
        self.followed.truncate(limit);
        self.muted.truncate(limit - self.followed.len());
    }
}

pub struct FollowListManager {
    store: Arc<dyn FollowStore>,
    retry: RetryPolicy,
}

impl FollowListManager {
    pub fn new(store: Arc<dyn FollowStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn state(&self, user_id: &str) -> Result<FollowState> {
        let store = &self.store;
        with_retry(&self.retry, "get_follow_state", || {
            store.get_follow_state(user_id)
        })
        .await
    }

    /// Seeds the follow list with `candidates` the first time it is called for
    /// a user; later calls leave the state alone. Returns the stored state.
    pub async fn initialize_default_follow<I>(
        &self,
        user_id: &str,
        candidates: I,
    ) -> Result<FollowState>
    where
        I: IntoIterator<Item = String>,
    {
        let candidates: BTreeSet<String> = candidates.into_iter().collect();
        let store = &self.store;
        let seeded = with_retry(&self.retry, "initialize_follow", || {
            store.initialize_follow(user_id, &candidates)
        })
        .await?;

        if seeded {
            info!(
                "Seeded follow list for {} with {} students",
                user_id,
                candidates.len()
            );
        }

        self.state(user_id).await
    }

    /// Seeds an uninitialized user with every student currently at risk,
    /// whatever view they happen to be looking at.
    pub async fn ensure_default_follow(
        &self,
        user_id: &str,
        missing_homework: &MissingHomeworkService,
        lookback_days: i64,
        cancel: &CancellationToken,
    ) -> Result<FollowState> {
        let state = self.state(user_id).await?;
        if state.missing_homework_follow_initialized {
            return Ok(state);
        }

        let everyone = missing_homework
            .at_risk_students(&RosterFilter::default(), lookback_days, cancel)
            .await?;
        let candidates = everyone.into_iter().map(|row| row.student_id);
        self.initialize_default_follow(user_id, candidates).await
    }

    /// At-risk rows for `filter`, split by `user_id`'s follow list. Without a
    /// user every row is followed.
    pub async fn partitioned_risk(
        &self,
        missing_homework: &MissingHomeworkService,
        filter: &RosterFilter,
        lookback_days: i64,
        user_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FollowPartition> {
        let rows = missing_homework
            .at_risk_students(filter, lookback_days, cancel)
            .await?;

        let Some(user_id) = user_id else {
            return Ok(FollowPartition {
                followed: rows,
                muted: Vec::new(),
            });
        };

        let state = self
            .ensure_default_follow(user_id, missing_homework, lookback_days, cancel)
            .await?;
        Ok(partition_by_follow(rows, &state))
    }

    pub async fn follow(&self, user_id: &str, student_id: &str) -> Result<FollowState> {
        self.set_following(user_id, student_id, true).await
    }

    pub async fn unfollow(&self, user_id: &str, student_id: &str) -> Result<FollowState> {
        self.set_following(user_id, student_id, false).await
    }

    /// On error the caller should re-read with `state` rather than keep a
    /// local toggle.
    async fn set_following(
        &self,
        user_id: &str,
        student_id: &str,
        following: bool,
    ) -> Result<FollowState> {
        let store = &self.store;
        with_retry(&self.retry, "set_following", || {
            store.set_following(user_id, student_id, following)
        })
        .await?;
        self.state(user_id).await
    }
}
