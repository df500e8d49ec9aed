//! Overall score aggregation and cohort publication.
//!
//! Row lifecycle: a row appears as a draft when the first component is graded, becomes
//! finalized once an overall score exists (computed from both components, or asserted by an
//! administrator), and is shown to students only while its cohort is published.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::time::primitive_now_utc;
use crate::db::models::{OverallScore, ScoreWeight};
use crate::repositories::{
    LockScope, PublicationChange, PublicationOutcome, ScoreFilter, ScorePage, ScoreStore,
    StoreError,
};
use crate::services::grading::{
    compute_overall, validate_score, Aggregate, GradingError, ScoreComponent, WeightSplit,
};

const MAX_IDENTIFIER_LEN: usize = 64;
pub(crate) const MAX_PAGE_LIMIT: i64 = 500;

#[derive(Debug, Error)]
pub(crate) enum ScoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GradingError> for ScoreError {
    fn from(value: GradingError) -> Self {
        Self::Validation(value.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ScoringPolicy {
    pub(crate) publish_requires_finalized: bool,
}

impl ScoringPolicy {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self { publish_requires_finalized: settings.scoring().publish_requires_finalized }
    }
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self { publish_requires_finalized: true }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct WeightsInput {
    pub(crate) assignments_weight: i32,
    pub(crate) exams_weight: i32,
    pub(crate) is_published: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ComponentGrade {
    pub(crate) student_nic: String,
    pub(crate) module_id: String,
    pub(crate) intake_id: String,
    pub(crate) component: ScoreComponent,
    /// Already normalized to a percentage.
    pub(crate) value: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct OverallOverride {
    pub(crate) student_nic: String,
    pub(crate) module_id: String,
    pub(crate) intake_id: Option<String>,
    pub(crate) overall_score: f64,
    pub(crate) is_finalized: bool,
}

#[derive(Clone)]
pub(crate) struct ScoreService {
    store: Arc<dyn ScoreStore>,
    policy: ScoringPolicy,
}

impl ScoreService {
    pub(crate) fn new(store: Arc<dyn ScoreStore>, policy: ScoringPolicy) -> Self {
        Self { store, policy }
    }

    /// Upserts the cohort's split and recomputes its automatic rows in the same write.
    pub(crate) async fn set_weights(
        &self,
        module_id: &str,
        intake_id: &str,
        input: WeightsInput,
    ) -> Result<ScoreWeight, ScoreError> {
        let module_id = require_identifier("module_id", module_id)?;
        let intake_id = require_identifier("intake_id", intake_id)?;
        WeightSplit::new(input.assignments_weight, input.exams_weight)?;

        let mut tx = self.store.begin(LockScope::Cohort { module_id, intake_id }).await?;
        let cohort = tx.cohort_scores(module_id, intake_id).await?;
        let published = cohort.iter().filter(|score| score.is_published).count();
        if published > 0 {
            return Err(ScoreError::Conflict(format!(
                "{published} score(s) for module {module_id} intake {intake_id} are published; \
                 unpublish the cohort before changing weights"
            )));
        }

        let now = primitive_now_utc();
        let existing = tx.find_weights(module_id, intake_id).await?;
        let weights = ScoreWeight {
            id: existing.as_ref().map_or_else(|| Uuid::new_v4().to_string(), |w| w.id.clone()),
            module_id: module_id.to_string(),
            intake_id: intake_id.to_string(),
            assignments_weight: input.assignments_weight,
            exams_weight: input.exams_weight,
            is_published: input.is_published,
            created_at: existing.as_ref().map_or(now, |w| w.created_at),
            updated_at: now,
        };

        let recomputed: Vec<OverallScore> = cohort
            .into_iter()
            .filter(|score| !score.is_override)
            .map(|mut score| {
                refresh(&mut score, Some(&weights), now);
                score
            })
            .collect();

        let saved = tx.save_weights(&weights).await?;
        for score in &recomputed {
            tx.save_score(score).await?;
        }
        tx.commit().await?;
        metrics::counter!("score_recomputations_total").increment(recomputed.len() as u64);

        tracing::info!(
            module_id = %module_id,
            intake_id = %intake_id,
            assignments_weight = saved.assignments_weight,
            exams_weight = saved.exams_weight,
            weights_active = saved.is_published,
            recomputed = recomputed.len(),
            action = "weights_set",
            "Score weights saved"
        );

        Ok(saved)
    }

    pub(crate) async fn get_weights(
        &self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<ScoreWeight, ScoreError> {
        let module_id = require_identifier("module_id", module_id)?;
        let intake_id = require_identifier("intake_id", intake_id)?;

        self.store.find_weights(module_id, intake_id).await?.ok_or_else(|| {
            ScoreError::NotFound(format!(
                "No weights configured for module {module_id} intake {intake_id}"
            ))
        })
    }

    /// Stores one graded component and refreshes the student's overall score.
    pub(crate) async fn record_component(
        &self,
        grade: ComponentGrade,
    ) -> Result<OverallScore, ScoreError> {
        let student_nic = require_identifier("student_nic", &grade.student_nic)?;
        let module_id = require_identifier("module_id", &grade.module_id)?;
        let intake_id = require_identifier("intake_id", &grade.intake_id)?;
        let value = validate_score(component_field(grade.component), grade.value)?;

        let now = primitive_now_utc();
        let mut tx =
            self.store.begin(LockScope::Student { student_nic, module_id, intake_id }).await?;
        let mut score = match tx.find_score(student_nic, module_id).await? {
            Some(existing) => {
                ensure_same_intake(&existing, intake_id)?;
                existing
            }
            None => OverallScore::draft(student_nic, module_id, intake_id, now),
        };

        match grade.component {
            ScoreComponent::Assignment => score.assignment_score = Some(value),
            ScoreComponent::Exam => score.exam_score = Some(value),
        }

        let weights = tx.find_weights(module_id, intake_id).await?;
        refresh(&mut score, weights.as_ref(), now);
        score.updated_at = now;

        let saved = tx.save_score(&score).await?;
        tx.commit().await?;
        metrics::counter!("score_components_total", "component" => grade.component.as_str())
            .increment(1);

        tracing::info!(
            student_nic = %student_nic,
            module_id = %module_id,
            intake_id = %intake_id,
            component = grade.component.as_str(),
            value,
            overall_score = ?saved.overall_score,
            action = "component_recorded",
            "Component score recorded"
        );

        Ok(saved)
    }

    /// Administrator escape hatch: asserts the overall score regardless of components.
    pub(crate) async fn set_overall_marks(
        &self,
        input: OverallOverride,
    ) -> Result<OverallScore, ScoreError> {
        let student_nic = require_identifier("student_nic", &input.student_nic)?;
        let module_id = require_identifier("module_id", &input.module_id)?;
        let intake_id =
            input.intake_id.as_deref().map(|id| require_identifier("intake_id", id)).transpose()?;
        let overall_score = validate_score("overall_score", input.overall_score)?;

        let intake_id = match intake_id {
            Some(intake_id) => intake_id.to_string(),
            None => match self.store.find_score(student_nic, module_id).await? {
                Some(existing) => existing.intake_id,
                None => return Err(missing_intake()),
            },
        };

        let now = primitive_now_utc();
        let mut tx = self
            .store
            .begin(LockScope::Student { student_nic, module_id, intake_id: &intake_id })
            .await?;
        let mut score = match tx.find_score(student_nic, module_id).await? {
            Some(existing) => {
                ensure_same_intake(&existing, &intake_id)?;
                existing
            }
            None if input.intake_id.is_some() => {
                OverallScore::draft(student_nic, module_id, &intake_id, now)
            }
            None => return Err(missing_intake()),
        };

        if score.is_published && !input.is_finalized {
            return Err(ScoreError::Conflict(
                "A published score cannot be un-finalized; unpublish the cohort first".to_string(),
            ));
        }

        apply_aggregate(&mut score, Aggregate::from_score(overall_score));
        score.is_override = true;
        set_finalized(&mut score, input.is_finalized, now);
        score.updated_at = now;

        let saved = tx.save_score(&score).await?;
        tx.commit().await?;

        tracing::info!(
            student_nic = %student_nic,
            module_id = %module_id,
            intake_id = %saved.intake_id,
            overall_score = ?saved.overall_score,
            grade = ?saved.grade,
            is_finalized = saved.is_finalized,
            action = "overall_override",
            "Overall score set manually"
        );

        Ok(saved)
    }

    /// Drops a manual override and returns the row to automatic computation.
    pub(crate) async fn clear_override(
        &self,
        student_nic: &str,
        module_id: &str,
    ) -> Result<OverallScore, ScoreError> {
        let student_nic = require_identifier("student_nic", student_nic)?;
        let module_id = require_identifier("module_id", module_id)?;

        let not_found = || {
            ScoreError::NotFound(format!(
                "No score for student {student_nic} in module {module_id}"
            ))
        };

        let Some(current) = self.store.find_score(student_nic, module_id).await? else {
            return Err(not_found());
        };
        if !current.is_override {
            return Ok(current);
        }

        let intake_id = current.intake_id;
        let mut tx = self
            .store
            .begin(LockScope::Student { student_nic, module_id, intake_id: &intake_id })
            .await?;
        let Some(mut score) = tx.find_score(student_nic, module_id).await? else {
            return Err(not_found());
        };
        if !score.is_override {
            return Ok(score);
        }

        let now = primitive_now_utc();
        let weights = tx.find_weights(module_id, &intake_id).await?;
        score.is_override = false;
        refresh(&mut score, weights.as_ref(), now);

        if score.is_published && !score.is_finalized {
            return Err(ScoreError::Conflict(
                "Clearing the override would leave a published score without a result; \
                 unpublish the cohort first"
                    .to_string(),
            ));
        }

        score.updated_at = now;
        let saved = tx.save_score(&score).await?;
        tx.commit().await?;

        tracing::info!(
            student_nic = %student_nic,
            module_id = %module_id,
            overall_score = ?saved.overall_score,
            action = "override_cleared",
            "Manual override cleared"
        );

        Ok(saved)
    }

    pub(crate) async fn list_overall_scores(
        &self,
        filter: ScoreFilter,
    ) -> Result<ScorePage, ScoreError> {
        if filter.skip < 0 {
            return Err(ScoreError::Validation("skip must be non-negative".to_string()));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&filter.limit) {
            return Err(ScoreError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }

        let filter = ScoreFilter {
            module_id: optional_identifier("module_id", filter.module_id)?,
            intake_id: optional_identifier("intake_id", filter.intake_id)?,
            ..filter
        };

        Ok(self.store.list_scores(&filter).await?)
    }

    /// Explicit recomputation pass over a cohort; override rows are left alone.
    pub(crate) async fn recompute(
        &self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<u64, ScoreError> {
        let module_id = require_identifier("module_id", module_id)?;
        let intake_id = require_identifier("intake_id", intake_id)?;

        let now = primitive_now_utc();
        let mut tx = self.store.begin(LockScope::Cohort { module_id, intake_id }).await?;
        let weights = tx.find_weights(module_id, intake_id).await?;
        let cohort = tx.cohort_scores(module_id, intake_id).await?;

        let mut recomputed = Vec::with_capacity(cohort.len());
        for mut score in cohort.into_iter().filter(|score| !score.is_override) {
            let before = score.clone();
            refresh(&mut score, weights.as_ref(), now);
            if score.is_published && !score.is_finalized {
                return Err(ScoreError::Conflict(format!(
                    "Recomputing would withdraw the published result of student {}; \
                     unpublish the cohort first",
                    score.student_nic
                )));
            }
            if score != before {
                score.updated_at = now;
            }
            recomputed.push(score);
        }

        for score in &recomputed {
            tx.save_score(score).await?;
        }
        tx.commit().await?;
        let count = recomputed.len() as u64;
        metrics::counter!("score_recomputations_total").increment(count);

        tracing::info!(
            module_id = %module_id,
            intake_id = %intake_id,
            recomputed = count,
            weights_configured = weights.is_some(),
            action = "cohort_recompute",
            "Cohort recomputed"
        );

        Ok(count)
    }

    /// Publishes the cohort, or only `student_nics` within it. Counts every row touched.
    pub(crate) async fn publish(
        &self,
        module_id: &str,
        intake_id: &str,
        student_nics: Option<Vec<String>>,
    ) -> Result<u64, ScoreError> {
        let student_nics = student_nics.map(normalize_student_nics).transpose()?;
        self.change_publication(module_id, intake_id, student_nics, true).await
    }

    pub(crate) async fn unpublish(
        &self,
        module_id: &str,
        intake_id: &str,
    ) -> Result<u64, ScoreError> {
        self.change_publication(module_id, intake_id, None, false).await
    }

    async fn change_publication(
        &self,
        module_id: &str,
        intake_id: &str,
        student_nics: Option<Vec<String>>,
        publish: bool,
    ) -> Result<u64, ScoreError> {
        let module_id = require_identifier("module_id", module_id)?;
        let intake_id = require_identifier("intake_id", intake_id)?;
        let action = if publish { "cohort_publish" } else { "cohort_unpublish" };

        if student_nics.as_ref().is_some_and(|nics| nics.is_empty()) {
            return Ok(0);
        }

        let change = PublicationChange {
            module_id: module_id.to_string(),
            intake_id: intake_id.to_string(),
            student_nics,
            publish,
            require_finalized: publish && self.policy.publish_requires_finalized,
            at: primitive_now_utc(),
        };

        match self.store.set_published(&change).await? {
            PublicationOutcome::Applied { rows } => {
                metrics::counter!(
                    "score_publications_total",
                    "action" => if publish { "publish" } else { "unpublish" }
                )
                .increment(1);

                tracing::info!(
                    module_id = %module_id,
                    intake_id = %intake_id,
                    targeted = change.student_nics.as_ref().map_or(0, Vec::len),
                    rows,
                    action,
                    "Cohort visibility changed"
                );
                Ok(rows)
            }
            PublicationOutcome::Blocked { unfinalized } => {
                tracing::warn!(
                    module_id = %module_id,
                    intake_id = %intake_id,
                    unfinalized = unfinalized.len(),
                    action,
                    "Publication refused: cohort has unfinalized scores"
                );
                Err(ScoreError::Conflict(format!(
                    "{} score(s) are not finalized: {}",
                    unfinalized.len(),
                    unfinalized.join(", ")
                )))
            }
        }
    }
}

/// Recomputes an automatic row from its components and the cohort weights.
///
/// Inactive or missing weights withhold the result just like a missing component does.
fn refresh(score: &mut OverallScore, weights: Option<&ScoreWeight>, now: PrimitiveDateTime) {
    if score.is_override {
        return;
    }

    let split = weights.filter(|weights| weights.is_published).and_then(|weights| {
        WeightSplit::new(weights.assignments_weight, weights.exams_weight).ok()
    });

    let aggregate = match split {
        Some(split) => compute_overall(score.assignment_score, score.exam_score, split),
        None => Aggregate::EMPTY,
    };

    apply_aggregate(score, aggregate);
    let finalized = score.overall_score.is_some();
    set_finalized(score, finalized, now);
}

fn apply_aggregate(score: &mut OverallScore, aggregate: Aggregate) {
    score.overall_score = aggregate.overall_score;
    score.grade = aggregate.grade.map(|grade| grade.as_str().to_string());
}

fn set_finalized(score: &mut OverallScore, finalized: bool, now: PrimitiveDateTime) {
    score.finalized_at = match (finalized, score.finalized_at) {
        (true, Some(at)) => Some(at),
        (true, None) => Some(now),
        (false, _) => None,
    };
    score.is_finalized = finalized;
}

fn missing_intake() -> ScoreError {
    ScoreError::Validation(
        "intake_id is required when the student has no score for this module yet".to_string(),
    )
}

fn ensure_same_intake(score: &OverallScore, intake_id: &str) -> Result<(), ScoreError> {
    if score.intake_id == intake_id {
        return Ok(());
    }

    Err(ScoreError::Conflict(format!(
        "Student {} is already assessed in module {} under intake {}",
        score.student_nic, score.module_id, score.intake_id
    )))
}

fn component_field(component: ScoreComponent) -> &'static str {
    match component {
        ScoreComponent::Assignment => "assignment_score",
        ScoreComponent::Exam => "exam_score",
    }
}

fn require_identifier<'a>(field: &str, value: &'a str) -> Result<&'a str, ScoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ScoreError::Validation(format!("{field} is required")));
    }
    if trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(ScoreError::Validation(format!(
            "{field} must be at most {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    Ok(trimmed)
}

fn optional_identifier(field: &str, value: Option<String>) -> Result<Option<String>, ScoreError> {
    match value {
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => Ok(Some(require_identifier(field, &value)?.to_string())),
        None => Ok(None),
    }
}

fn normalize_student_nics(nics: Vec<String>) -> Result<Vec<String>, ScoreError> {
    let mut unique = BTreeSet::new();
    for nic in &nics {
        unique.insert(require_identifier("student_nics", nic)?.to_string());
    }
    Ok(unique.into_iter().collect())
}
