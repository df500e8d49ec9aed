use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::pagination::default_limit;
use crate::core::time::{format_optional, format_primitive};
use crate::db::models::{OverallScore, ScoreWeight};

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct WeightsUpdate {
    #[serde(alias = "assignmentsWeight")]
    #[validate(range(min = 0, max = 100, message = "assignments_weight must be between 0 and 100"))]
    pub(crate) assignments_weight: i32,
    #[serde(alias = "examsWeight")]
    #[validate(range(min = 0, max = 100, message = "exams_weight must be between 0 and 100"))]
    pub(crate) exams_weight: i32,
    /// Whether the split is active for computation.
    #[serde(default = "default_true")]
    #[serde(alias = "isPublished")]
    pub(crate) is_published: bool,
}

/// Raw marks for one component; normalized to a percentage of `max_marks` before storage.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ComponentMarks {
    #[serde(alias = "marks_obtained", alias = "marksObtained", alias = "score")]
    pub(crate) marks: f64,
    #[serde(default = "default_max_marks")]
    #[serde(alias = "maxMarks")]
    #[validate(range(exclusive_min = 0.0, message = "max_marks must be positive"))]
    pub(crate) max_marks: f64,
}

const fn default_max_marks() -> f64 {
    100.0
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct OverallScoreOverride {
    #[serde(alias = "overallScore")]
    #[validate(range(min = 0.0, max = 100.0, message = "overall_score must be between 0 and 100"))]
    pub(crate) overall_score: f64,
    #[serde(default = "default_true")]
    #[serde(alias = "isFinalized")]
    pub(crate) is_finalized: bool,
    #[serde(default)]
    #[serde(alias = "intakeId")]
    pub(crate) intake_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PublishRequest {
    #[serde(default)]
    #[serde(alias = "studentNics")]
    pub(crate) student_nics: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListOverallScoresQuery {
    #[serde(default)]
    #[serde(alias = "moduleId")]
    pub(crate) module_id: Option<String>,
    #[serde(default)]
    #[serde(alias = "intakeId")]
    pub(crate) intake_id: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoreWeightResponse {
    pub(crate) id: String,
    pub(crate) module_id: String,
    pub(crate) intake_id: String,
    pub(crate) assignments_weight: i32,
    pub(crate) exams_weight: i32,
    pub(crate) is_published: bool,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<ScoreWeight> for ScoreWeightResponse {
    fn from(weights: ScoreWeight) -> Self {
        Self {
            id: weights.id,
            module_id: weights.module_id,
            intake_id: weights.intake_id,
            assignments_weight: weights.assignments_weight,
            exams_weight: weights.exams_weight,
            is_published: weights.is_published,
            created_at: format_primitive(weights.created_at),
            updated_at: format_primitive(weights.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct OverallScoreResponse {
    pub(crate) id: String,
    pub(crate) student_nic: String,
    pub(crate) module_id: String,
    pub(crate) intake_id: String,
    pub(crate) assignment_score: Option<f64>,
    pub(crate) exam_score: Option<f64>,
    pub(crate) overall_score: Option<f64>,
    pub(crate) grade: Option<String>,
    pub(crate) is_override: bool,
    pub(crate) is_finalized: bool,
    pub(crate) is_published: bool,
    pub(crate) finalized_at: Option<String>,
    pub(crate) published_at: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<OverallScore> for OverallScoreResponse {
    fn from(score: OverallScore) -> Self {
        Self {
            id: score.id,
            student_nic: score.student_nic,
            module_id: score.module_id,
            intake_id: score.intake_id,
            assignment_score: score.assignment_score,
            exam_score: score.exam_score,
            overall_score: score.overall_score,
            grade: score.grade,
            is_override: score.is_override,
            is_finalized: score.is_finalized,
            is_published: score.is_published,
            finalized_at: format_optional(score.finalized_at),
            published_at: format_optional(score.published_at),
            created_at: format_primitive(score.created_at),
            updated_at: format_primitive(score.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishResponse {
    pub(crate) published_count: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct UnpublishResponse {
    pub(crate) unpublished_count: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct RecomputeResponse {
    pub(crate) recomputed_count: u64,
}
