use time::PrimitiveDateTime;

use crate::db::models::OverallScore;

pub(crate) const COLUMNS: &str = "\
    id, student_nic, module_id, intake_id, assignment_score, exam_score, overall_score, \
    grade, is_override, is_finalized, is_published, finalized_at, published_at, \
    created_at, updated_at";

pub(crate) async fn find_by_student_module(
    executor: impl sqlx::PgExecutor<'_>,
    student_nic: &str,
    module_id: &str,
) -> Result<Option<OverallScore>, sqlx::Error> {
    sqlx::query_as::<_, OverallScore>(&format!(
        "SELECT {COLUMNS}
         FROM overall_scores
         WHERE student_nic = $1 AND module_id = $2"
    ))
    .bind(student_nic)
    .bind(module_id)
    .fetch_optional(executor)
    .await
}

/// Same as [`find_by_student_module`], but holds the row until the transaction ends.
pub(crate) async fn lock_by_student_module(
    executor: impl sqlx::PgExecutor<'_>,
    student_nic: &str,
    module_id: &str,
) -> Result<Option<OverallScore>, sqlx::Error> {
    sqlx::query_as::<_, OverallScore>(&format!(
        "SELECT {COLUMNS}
         FROM overall_scores
         WHERE student_nic = $1 AND module_id = $2
         FOR UPDATE"
    ))
    .bind(student_nic)
    .bind(module_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn lock_by_cohort(
    executor: impl sqlx::PgExecutor<'_>,
    module_id: &str,
    intake_id: &str,
) -> Result<Vec<OverallScore>, sqlx::Error> {
    sqlx::query_as::<_, OverallScore>(&format!(
        "SELECT {COLUMNS}
         FROM overall_scores
         WHERE module_id = $1 AND intake_id = $2
         ORDER BY student_nic
         FOR UPDATE"
    ))
    .bind(module_id)
    .bind(intake_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_filtered(
    executor: impl sqlx::PgExecutor<'_>,
    module_id: Option<&str>,
    intake_id: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<Vec<OverallScore>, sqlx::Error> {
    sqlx::query_as::<_, OverallScore>(&format!(
        "SELECT {COLUMNS}
         FROM overall_scores
         WHERE ($1::text IS NULL OR module_id = $1)
           AND ($2::text IS NULL OR intake_id = $2)
         ORDER BY module_id, intake_id, student_nic
         OFFSET $3
         LIMIT $4"
    ))
    .bind(module_id)
    .bind(intake_id)
    .bind(skip)
    .bind(limit)
    .fetch_all(executor)
    .await
}

pub(crate) async fn count_filtered(
    executor: impl sqlx::PgExecutor<'_>,
    module_id: Option<&str>,
    intake_id: Option<&str>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*)
         FROM overall_scores
         WHERE ($1::text IS NULL OR module_id = $1)
           AND ($2::text IS NULL OR intake_id = $2)",
    )
    .bind(module_id)
    .bind(intake_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    score: &OverallScore,
) -> Result<OverallScore, sqlx::Error> {
    sqlx::query_as::<_, OverallScore>(&format!(
        "INSERT INTO overall_scores (
            id, student_nic, module_id, intake_id, assignment_score, exam_score, overall_score,
            grade, is_override, is_finalized, is_published, finalized_at, published_at,
            created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
         ON CONFLICT (student_nic, module_id) DO UPDATE
         SET intake_id = EXCLUDED.intake_id,
             assignment_score = EXCLUDED.assignment_score,
             exam_score = EXCLUDED.exam_score,
             overall_score = EXCLUDED.overall_score,
             grade = EXCLUDED.grade,
             is_override = EXCLUDED.is_override,
             is_finalized = EXCLUDED.is_finalized,
             is_published = EXCLUDED.is_published,
             finalized_at = EXCLUDED.finalized_at,
             published_at = EXCLUDED.published_at,
             updated_at = EXCLUDED.updated_at
         RETURNING {COLUMNS}"
    ))
    .bind(&score.id)
    .bind(&score.student_nic)
    .bind(&score.module_id)
    .bind(&score.intake_id)
    .bind(score.assignment_score)
    .bind(score.exam_score)
    .bind(score.overall_score)
    .bind(score.grade.as_deref())
    .bind(score.is_override)
    .bind(score.is_finalized)
    .bind(score.is_published)
    .bind(score.finalized_at)
    .bind(score.published_at)
    .bind(score.created_at)
    .bind(score.updated_at)
    .fetch_one(executor)
    .await
}

/// Locks the targeted cohort rows and reports `(student_nic, is_finalized)` for each.
pub(crate) async fn lock_cohort_targets(
    executor: impl sqlx::PgExecutor<'_>,
    module_id: &str,
    intake_id: &str,
    student_nics: Option<&[String]>,
) -> Result<Vec<(String, bool)>, sqlx::Error> {
    sqlx::query_as::<_, (String, bool)>(
        "SELECT student_nic, is_finalized
         FROM overall_scores
         WHERE module_id = $1
           AND intake_id = $2
           AND ($3::text[] IS NULL OR student_nic = ANY($3))
         ORDER BY student_nic
         FOR UPDATE",
    )
    .bind(module_id)
    .bind(intake_id)
    .bind(student_nics)
    .fetch_all(executor)
    .await
}

/// Flips visibility for the targeted cohort rows. `published_at` keeps the first publication.
pub(crate) async fn set_published(
    executor: impl sqlx::PgExecutor<'_>,
    module_id: &str,
    intake_id: &str,
    student_nics: Option<&[String]>,
    publish: bool,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE overall_scores
         SET is_published = $1,
             published_at = CASE WHEN $1 THEN COALESCE(published_at, $2) ELSE NULL END,
             updated_at = $2
         WHERE module_id = $3
           AND intake_id = $4
           AND ($5::text[] IS NULL OR student_nic = ANY($5))",
    )
    .bind(publish)
    .bind(now)
    .bind(module_id)
    .bind(intake_id)
    .bind(student_nics)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
