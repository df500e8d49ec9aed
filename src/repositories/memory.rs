use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::models::{OverallScore, ScoreWeight};

use super::{
    LockScope, PublicationChange, PublicationOutcome, ScoreFilter, ScorePage, ScoreStore,
    ScoreTx, StoreError,
};

type CohortKey = (String, String);
type StudentModuleKey = (String, String);

/// Map-backed store used by tests. One mutex makes every call atomic, and a write
/// transaction holds it until commit or drop.
#[derive(Default)]
pub(crate) struct MemoryScoreStore {
    state: Arc<Mutex<MemoryState>>,
    unavailable: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    weights: BTreeMap<CohortKey, ScoreWeight>,
    scores: BTreeMap<StudentModuleKey, OverallScore>,
}

impl MemoryScoreStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the pool timed out.
    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) async fn weights_count(&self) -> usize {
        self.state.lock().await.weights.len()
    }

    pub(crate) async fn insert_score(&self, score: OverallScore) {
        let mut state = self.state.lock().await;
        state.scores.insert((score.student_nic.clone(), score.module_id.clone()), score);
    }

    fn check(&self) -> Result<(), StoreError> {
        check(&self.unavailable)
    }
}

fn check(unavailable: &AtomicBool) -> Result<(), StoreError> {
    if unavailable.load(Ordering::SeqCst) {
        return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
    }
    Ok(())
}

impl MemoryState {
    fn upsert_weights(&mut self, weights: &ScoreWeight) -> ScoreWeight {
        let key = (weights.module_id.clone(), weights.intake_id.clone());
        let stored = match self.weights.get(&key) {
            Some(existing) => ScoreWeight {
                id: existing.id.clone(),
                created_at: existing.created_at,
                ..weights.clone()
            },
            None => weights.clone(),
        };
        self.weights.insert(key, stored.clone());
        stored
    }

    fn upsert_score(&mut self, score: &OverallScore) -> OverallScore {
        let key = (score.student_nic.clone(), score.module_id.clone());
        let stored = match self.scores.get(&key) {
            Some(existing) => OverallScore {
                id: existing.id.clone(),
                created_at: existing.created_at,
                ..score.clone()
            },
            None => score.clone(),
        };
        self.scores.insert(key, stored.clone());
        stored
    }

    fn targets<'a>(
        &'a mut self,
        change: &'a PublicationChange,
    ) -> impl Iterator<Item = &'a mut OverallScore> + 'a {
        let wanted: Option<BTreeSet<&'a String>> =
            change.student_nics.as_ref().map(|nics| nics.iter().collect());
        self.scores.values_mut().filter(move |score| {
            score.module_id == change.module_id
                && score.intake_id == change.intake_id
                && wanted.as_ref().map_or(true, |nics| nics.contains(&score.student_nic))
        })
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn find_weights(
        &self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<Option<ScoreWeight>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state.weights.get(&(module_id.to_string(), intake_id.to_string())).cloned())
    }

    async fn find_score(
        &self,
        student_nic: &str,
        module_id: &str,
    ) -> Result<Option<OverallScore>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state.scores.get(&(student_nic.to_string(), module_id.to_string())).cloned())
    }

    async fn list_scores(&self, filter: &ScoreFilter) -> Result<ScorePage, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        let mut rows: Vec<OverallScore> = state
            .scores
            .values()
            .filter(|score| {
                filter.module_id.as_ref().map_or(true, |module| &score.module_id == module)
                    && filter.intake_id.as_ref().map_or(true, |intake| &score.intake_id == intake)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.module_id, &a.intake_id, &a.student_nic).cmp(&(
                &b.module_id,
                &b.intake_id,
                &b.student_nic,
            ))
        });

        let total = rows.len() as i64;
        let items = rows
            .into_iter()
            .skip(filter.skip.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();

        Ok(ScorePage { items, total })
    }

    async fn set_published(
        &self,
        change: &PublicationChange,
    ) -> Result<PublicationOutcome, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;

        if change.require_finalized {
            let mut unfinalized: Vec<String> = state
                .targets(change)
                .filter(|score| !score.is_finalized)
                .map(|score| score.student_nic.clone())
                .collect();
            if !unfinalized.is_empty() {
                unfinalized.sort();
                return Ok(PublicationOutcome::Blocked { unfinalized });
            }
        }

        let mut rows = 0;
        for score in state.targets(change) {
            score.is_published = change.publish;
            score.published_at =
                if change.publish { score.published_at.or(Some(change.at)) } else { None };
            score.updated_at = change.at;
            rows += 1;
        }

        Ok(PublicationOutcome::Applied { rows })
    }

    async fn begin(&self, _scope: LockScope<'_>) -> Result<Box<dyn ScoreTx>, StoreError> {
        self.check()?;
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working, unavailable: self.unavailable.clone() }))
    }
}

/// Writes go to `working`; commit swaps it into the locked state.
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    unavailable: Arc<AtomicBool>,
}

#[async_trait]
impl ScoreTx for MemoryTx {
    async fn find_weights(
        &mut self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<Option<ScoreWeight>, StoreError> {
        check(&self.unavailable)?;
        Ok(self.working.weights.get(&(module_id.to_string(), intake_id.to_string())).cloned())
    }

    async fn find_score(
        &mut self,
        student_nic: &str,
        module_id: &str,
    ) -> Result<Option<OverallScore>, StoreError> {
        check(&self.unavailable)?;
        Ok(self.working.scores.get(&(student_nic.to_string(), module_id.to_string())).cloned())
    }

    async fn cohort_scores(
        &mut self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<Vec<OverallScore>, StoreError> {
        check(&self.unavailable)?;
        // BTreeMap order is (student_nic, module_id), so rows come out sorted by student.
        Ok(self
            .working
            .scores
            .values()
            .filter(|score| score.module_id == module_id && score.intake_id == intake_id)
            .cloned()
            .collect())
    }

    async fn save_weights(&mut self, weights: &ScoreWeight) -> Result<ScoreWeight, StoreError> {
        check(&self.unavailable)?;
        Ok(self.working.upsert_weights(weights))
    }

    async fn save_score(&mut self, score: &OverallScore) -> Result<OverallScore, StoreError> {
        check(&self.unavailable)?;
        Ok(self.working.upsert_score(score))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        check(&self.unavailable)?;
        let MemoryTx { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;

    const MODULE: &str = "CS101";
    const INTAKE: &str = "2026-JAN";

    fn scope() -> LockScope<'static> {
        LockScope::Cohort { module_id: MODULE, intake_id: INTAKE }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryScoreStore::new();

        let mut tx = store.begin(scope()).await.expect("begin");
        tx.save_score(&OverallScore::draft("NIC-1", MODULE, INTAKE, primitive_now_utc()))
            .await
            .expect("save");
        drop(tx);

        assert!(store.find_score("NIC-1", MODULE).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn publication_waits_for_open_transaction() {
        let store = Arc::new(MemoryScoreStore::new());
        store.insert_score(OverallScore::draft("NIC-1", MODULE, INTAKE, primitive_now_utc())).await;

        let mut tx = store.begin(scope()).await.expect("begin");
        let publisher = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .set_published(&PublicationChange {
                        module_id: MODULE.to_string(),
                        intake_id: INTAKE.to_string(),
                        student_nics: None,
                        publish: true,
                        require_finalized: false,
                        at: primitive_now_utc(),
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(!publisher.is_finished());

        let mut row = tx.find_score("NIC-1", MODULE).await.expect("find").expect("row");
        row.exam_score = Some(70.0);
        tx.save_score(&row).await.expect("save");
        tx.commit().await.expect("commit");

        let outcome = publisher.await.expect("join").expect("publish");
        assert_eq!(outcome, PublicationOutcome::Applied { rows: 1 });

        let row = store.find_score("NIC-1", MODULE).await.expect("find").expect("row");
        assert!(row.is_published);
        assert_eq!(row.exam_score, Some(70.0));
    }
}
