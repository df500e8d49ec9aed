//! Persistence for weights and overall scores.
//!
//! Services talk to [`ScoreStore`] so the aggregation rules can run against Postgres in
//! production and an in-memory map under test.

pub(crate) mod locks;
pub(crate) mod overall_scores;
pub(crate) mod postgres;
pub(crate) mod score_weights;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{OverallScore, ScoreWeight};

pub(crate) use postgres::PgScoreStore;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ScoreFilter {
    pub(crate) module_id: Option<String>,
    pub(crate) intake_id: Option<String>,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct ScorePage {
    pub(crate) items: Vec<OverallScore>,
    pub(crate) total: i64,
}

/// A cohort-wide visibility change. `student_nics = None` targets every row of the cohort.
#[derive(Debug, Clone)]
pub(crate) struct PublicationChange {
    pub(crate) module_id: String,
    pub(crate) intake_id: String,
    pub(crate) student_nics: Option<Vec<String>>,
    pub(crate) publish: bool,
    pub(crate) require_finalized: bool,
    pub(crate) at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PublicationOutcome {
    Applied { rows: u64 },
    /// Nothing was written; these targeted rows are not finalized.
    Blocked { unfinalized: Vec<String> },
}

/// Rows a write transaction holds until it commits or is dropped.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LockScope<'a> {
    /// One student's row. Writers in the same cohort only exclude each other per student,
    /// but all of them exclude cohort-wide writers and publication changes.
    Student { student_nic: &'a str, module_id: &'a str, intake_id: &'a str },
    /// The cohort's weights and every one of its rows.
    Cohort { module_id: &'a str, intake_id: &'a str },
}

#[async_trait]
pub(crate) trait ScoreStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_weights(
        &self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<Option<ScoreWeight>, StoreError>;

    async fn find_score(
        &self,
        student_nic: &str,
        module_id: &str,
    ) -> Result<Option<OverallScore>, StoreError>;

    async fn list_scores(&self, filter: &ScoreFilter) -> Result<ScorePage, StoreError>;

    /// Checks finalization (when required) and flips visibility in one atomic step.
    async fn set_published(
        &self,
        change: &PublicationChange,
    ) -> Result<PublicationOutcome, StoreError>;

    /// Opens a write transaction holding `scope`. Dropping it without commit discards it.
    async fn begin(&self, scope: LockScope<'_>) -> Result<Box<dyn ScoreTx>, StoreError>;
}

/// Read-modify-write access to rows locked by [`ScoreStore::begin`].
#[async_trait]
pub(crate) trait ScoreTx: Send {
    async fn find_weights(
        &mut self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<Option<ScoreWeight>, StoreError>;

    async fn find_score(
        &mut self,
        student_nic: &str,
        module_id: &str,
    ) -> Result<Option<OverallScore>, StoreError>;

    async fn cohort_scores(
        &mut self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<Vec<OverallScore>, StoreError>;

    async fn save_weights(&mut self, weights: &ScoreWeight) -> Result<ScoreWeight, StoreError>;

    async fn save_score(&mut self, score: &OverallScore) -> Result<OverallScore, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
