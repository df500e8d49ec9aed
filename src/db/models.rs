use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// Assignment/exam split for one module-intake cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct ScoreWeight {
    pub(crate) id: String,
    pub(crate) module_id: String,
    pub(crate) intake_id: String,
    pub(crate) assignments_weight: i32,
    pub(crate) exams_weight: i32,
    /// Whether the split is active for computation. Unrelated to score publication.
    pub(crate) is_published: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Aggregated result for one student in one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct OverallScore {
    pub(crate) id: String,
    pub(crate) student_nic: String,
    pub(crate) module_id: String,
    pub(crate) intake_id: String,
    pub(crate) assignment_score: Option<f64>,
    pub(crate) exam_score: Option<f64>,
    pub(crate) overall_score: Option<f64>,
    pub(crate) grade: Option<String>,
    /// Set when an administrator asserted `overall_score` by hand.
    pub(crate) is_override: bool,
    pub(crate) is_finalized: bool,
    pub(crate) is_published: bool,
    pub(crate) finalized_at: Option<PrimitiveDateTime>,
    pub(crate) published_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl OverallScore {
    /// A fresh draft row with no components recorded yet.
    pub(crate) fn draft(
        student_nic: &str,
        module_id: &str,
        intake_id: &str,
        now: PrimitiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student_nic: student_nic.to_string(),
            module_id: module_id.to_string(),
            intake_id: intake_id.to_string(),
            assignment_score: None,
            exam_score: None,
            overall_score: None,
            grade: None,
            is_override: false,
            is_finalized: false,
            is_published: false,
            finalized_at: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
