use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::db::models::{OverallScore, ScoreWeight};

use super::{
    locks, overall_scores, score_weights, LockScope, PublicationChange, PublicationOutcome,
    ScoreFilter, ScorePage, ScoreStore, ScoreTx, StoreError,
};

#[derive(Clone)]
pub(crate) struct PgScoreStore {
    pool: PgPool,
}

impl PgScoreStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreStore for PgScoreStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_weights(
        &self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<Option<ScoreWeight>, StoreError> {
        Ok(score_weights::find(&self.pool, module_id, intake_id).await?)
    }

    async fn find_score(
        &self,
        student_nic: &str,
        module_id: &str,
    ) -> Result<Option<OverallScore>, StoreError> {
        Ok(overall_scores::find_by_student_module(&self.pool, student_nic, module_id).await?)
    }

    async fn list_scores(&self, filter: &ScoreFilter) -> Result<ScorePage, StoreError> {
        let module_id = filter.module_id.as_deref();
        let intake_id = filter.intake_id.as_deref();

        let total = overall_scores::count_filtered(&self.pool, module_id, intake_id).await?;
        let items = overall_scores::list_filtered(
            &self.pool,
            module_id,
            intake_id,
            filter.skip,
            filter.limit,
        )
        .await?;

        Ok(ScorePage { items, total })
    }

    async fn set_published(
        &self,
        change: &PublicationChange,
    ) -> Result<PublicationOutcome, StoreError> {
        let student_nics = change.student_nics.as_deref();
        let mut tx = self.pool.begin().await?;

        locks::lock_cohort(&mut *tx, &change.module_id, &change.intake_id).await?;
        let targets = overall_scores::lock_cohort_targets(
            &mut *tx,
            &change.module_id,
            &change.intake_id,
            student_nics,
        )
        .await?;

        if change.require_finalized {
            let unfinalized: Vec<String> = targets
                .iter()
                .filter(|(_, is_finalized)| !is_finalized)
                .map(|(student_nic, _)| student_nic.clone())
                .collect();
            if !unfinalized.is_empty() {
                tx.rollback().await?;
                return Ok(PublicationOutcome::Blocked { unfinalized });
            }
        }

        if targets.is_empty() {
            tx.commit().await?;
            return Ok(PublicationOutcome::Applied { rows: 0 });
        }

        let rows = overall_scores::set_published(
            &mut *tx,
            &change.module_id,
            &change.intake_id,
            student_nics,
            change.publish,
            change.at,
        )
        .await?;

        tx.commit().await?;
        Ok(PublicationOutcome::Applied { rows })
    }

    async fn begin(&self, scope: LockScope<'_>) -> Result<Box<dyn ScoreTx>, StoreError> {
        let mut tx = self.pool.begin().await?;

        match scope {
            LockScope::Student { student_nic, module_id, intake_id } => {
                locks::lock_cohort_shared(&mut *tx, module_id, intake_id).await?;
                locks::lock_student(&mut *tx, student_nic, module_id).await?;
            }
            LockScope::Cohort { module_id, intake_id } => {
                locks::lock_cohort(&mut *tx, module_id, intake_id).await?;
            }
        }

        Ok(Box::new(PgScoreTx { tx }))
    }
}

struct PgScoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ScoreTx for PgScoreTx {
    async fn find_weights(
        &mut self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<Option<ScoreWeight>, StoreError> {
        Ok(score_weights::find(&mut *self.tx, module_id, intake_id).await?)
    }

    async fn find_score(
        &mut self,
        student_nic: &str,
        module_id: &str,
    ) -> Result<Option<OverallScore>, StoreError> {
        Ok(overall_scores::lock_by_student_module(&mut *self.tx, student_nic, module_id).await?)
    }

    async fn cohort_scores(
        &mut self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<Vec<OverallScore>, StoreError> {
        Ok(overall_scores::lock_by_cohort(&mut *self.tx, module_id, intake_id).await?)
    }

    async fn save_weights(&mut self, weights: &ScoreWeight) -> Result<ScoreWeight, StoreError> {
        Ok(score_weights::upsert(&mut *self.tx, weights).await?)
    }

    async fn save_score(&mut self, score: &OverallScore) -> Result<OverallScore, StoreError> {
        Ok(overall_scores::upsert(&mut *self.tx, score).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
