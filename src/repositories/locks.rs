//! Transaction-scoped advisory locks.
//!
//! Row locks cannot cover a row that does not exist yet, so writers first take a lock on
//! the cohort key (shared for single-student writes, exclusive for cohort-wide ones) and
//! then on the student key.

const COHORT_NAMESPACE: i32 = 1;
const STUDENT_NAMESPACE: i32 = 2;

pub(crate) async fn lock_cohort_shared(
    executor: impl sqlx::PgExecutor<'_>,
    module_id: &str,
    intake_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock_shared($1, hashtext($2))")
        .bind(COHORT_NAMESPACE)
        .bind(cohort_key(module_id, intake_id))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn lock_cohort(
    executor: impl sqlx::PgExecutor<'_>,
    module_id: &str,
    intake_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
        .bind(COHORT_NAMESPACE)
        .bind(cohort_key(module_id, intake_id))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn lock_student(
    executor: impl sqlx::PgExecutor<'_>,
    student_nic: &str,
    module_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
        .bind(STUDENT_NAMESPACE)
        .bind(format!("{module_id}\u{1f}{student_nic}"))
        .execute(executor)
        .await?;
    Ok(())
}

fn cohort_key(module_id: &str, intake_id: &str) -> String {
    format!("{module_id}\u{1f}{intake_id}")
}
