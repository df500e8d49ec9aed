use crate::db::models::ScoreWeight;

pub(crate) const COLUMNS: &str = "\
    id, module_id, intake_id, assignments_weight, exams_weight, is_published, \
    created_at, updated_at";

pub(crate) async fn find(
    executor: impl sqlx::PgExecutor<'_>,
    module_id: &str,
    intake_id: &str,
) -> Result<Option<ScoreWeight>, sqlx::Error> {
    sqlx::query_as::<_, ScoreWeight>(&format!(
        "SELECT {COLUMNS}
         FROM score_weights
         WHERE module_id = $1 AND intake_id = $2"
    ))
    .bind(module_id)
    .bind(intake_id)
    .fetch_optional(executor)
    .await
}

/// Inserts or replaces the split for the cohort; the original `id` and `created_at` survive.
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    weights: &ScoreWeight,
) -> Result<ScoreWeight, sqlx::Error> {
    sqlx::query_as::<_, ScoreWeight>(&format!(
        "INSERT INTO score_weights (
            id, module_id, intake_id, assignments_weight, exams_weight, is_published,
            created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
         ON CONFLICT (module_id, intake_id) DO UPDATE
         SET assignments_weight = EXCLUDED.assignments_weight,
             exams_weight = EXCLUDED.exams_weight,
             is_published = EXCLUDED.is_published,
             updated_at = EXCLUDED.updated_at
         RETURNING {COLUMNS}"
    ))
    .bind(&weights.id)
    .bind(&weights.module_id)
    .bind(&weights.intake_id)
    .bind(weights.assignments_weight)
    .bind(weights.exams_weight)
    .bind(weights.is_published)
    .bind(weights.created_at)
    .bind(weights.updated_at)
    .fetch_one(executor)
    .await
}
