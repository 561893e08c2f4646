use serde::Serialize;
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument};

use crate::db::{AuditContext, replace_links, tags_by_owner};
use crate::error::AppError;
use crate::forms::EnrollmentForm;
use crate::models::Enrollment;

#[derive(Debug, Default, Clone, Serialize)]
pub struct EnrollmentFilter {
    pub search: Option<String>,
    pub student: Option<i64>,
    pub course: Option<i64>,
    pub grade: Option<String>,
    pub active_status: Option<bool>,
    pub completion_status: Option<String>,
    pub metadata: Option<String>,
}

const SELECT_ENROLLMENT: &str = "SELECT e.id, e.student_id, e.course_id, \
    s.first_name || ' ' || s.last_name AS student_name, \
    c.course_code AS course_code, c.name AS course_name, \
    e.grade, e.score, e.completion_date, e.is_active, e.remarks, \
    e.created_by, e.updated_by, e.created_at, e.updated_at \
    FROM enrollments e \
    JOIN students s ON s.id = e.student_id \
    JOIN courses c ON c.id = e.course_id";

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &EnrollmentFilter) {
    qb.push(" LEFT JOIN enrollment_metadata em ON em.enrollment_id = e.id");
    qb.push(" LEFT JOIN metadata m ON m.id = em.metadata_id");
    qb.push(" WHERE 1 = 1");

    if let Some(student_id) = filter.student {
        qb.push(" AND e.student_id = ").push_bind(student_id);
    }
    if let Some(course_id) = filter.course {
        qb.push(" AND e.course_id = ").push_bind(course_id);
    }
    if let Some(grade) = &filter.grade {
        qb.push(" AND e.grade = ").push_bind(grade.clone());
    }
    if let Some(active) = filter.active_status {
        qb.push(" AND e.is_active = ").push_bind(active);
    }
    match filter.completion_status.as_deref() {
        Some("completed") => {
            qb.push(" AND e.completion_date IS NOT NULL");
        }
        Some("in_progress") => {
            qb.push(" AND e.completion_date IS NULL AND e.is_active = TRUE");
        }
        _ => {}
    }
    if let Some(key) = &filter.metadata {
        qb.push(" AND m.key = ").push_bind(key.clone());
    }
    if let Some(search) = &filter.search {
        let like = format!("%{}%", search);
        qb.push(" AND (s.first_name LIKE ").push_bind(like.clone());
        qb.push(" OR s.last_name LIKE ").push_bind(like.clone());
        qb.push(" OR c.name LIKE ").push_bind(like.clone());
        qb.push(" OR c.course_code LIKE ").push_bind(like.clone());
        qb.push(" OR e.grade LIKE ").push_bind(like);
        qb.push(")");
    }
}

#[instrument(skip(pool))]
pub async fn count_enrollments(
    pool: &Pool<Sqlite>,
    filter: &EnrollmentFilter,
) -> Result<i64, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT COUNT(DISTINCT e.id) FROM enrollments e \
         JOIN students s ON s.id = e.student_id \
         JOIN courses c ON c.id = e.course_id",
    );
    push_filters(&mut qb, filter);

    let count: (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count.0)
}

#[instrument(skip(pool))]
pub async fn list_enrollments(
    pool: &Pool<Sqlite>,
    filter: &EnrollmentFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Enrollment>, AppError> {
    info!("Listing enrollments");
    let mut qb = QueryBuilder::<Sqlite>::new(format!("{} ", SELECT_ENROLLMENT));
    push_filters(&mut qb, filter);
    qb.push(" GROUP BY e.id ORDER BY e.created_at DESC, e.id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let mut enrollments: Vec<Enrollment> = qb.build_query_as().fetch_all(pool).await?;
    attach_metadata(pool, &mut enrollments).await?;
    Ok(enrollments)
}

async fn attach_metadata(
    pool: &Pool<Sqlite>,
    enrollments: &mut [Enrollment],
) -> Result<(), AppError> {
    let ids: Vec<i64> = enrollments.iter().map(|e| e.id).collect();
    let mut tags = tags_by_owner(pool, "enrollment_metadata", "enrollment_id", &ids).await?;
    for enrollment in enrollments {
        enrollment.metadata = tags.remove(&enrollment.id).unwrap_or_default();
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_enrollment(pool: &Pool<Sqlite>, id: i64) -> Result<Enrollment, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("{} WHERE e.id = ", SELECT_ENROLLMENT));
    qb.push_bind(id);

    let row: Option<Enrollment> = qb.build_query_as().fetch_optional(pool).await?;

    match row {
        Some(mut enrollment) => {
            attach_metadata(pool, std::slice::from_mut(&mut enrollment)).await?;
            Ok(enrollment)
        }
        _ => Err(AppError::NotFound(format!(
            "Enrollment with id {} not found",
            id
        ))),
    }
}

/// Advisory duplicate check. The unique index on (student_id, course_id) is
/// the authoritative guard; a race between two submissions surfaces there.
#[instrument(skip(pool))]
pub async fn pair_exists(
    pool: &Pool<Sqlite>,
    student_id: i64,
    course_id: i64,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let existing: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM enrollments WHERE student_id = ? AND course_id = ? AND id != ?",
    )
    .bind(student_id)
    .bind(course_id)
    .bind(exclude_id.unwrap_or(0))
    .fetch_optional(pool)
    .await?;
    Ok(existing.is_some())
}

/// The active enrollment for a (student, course) pair, if any. Backs the
/// duplicate-warning probe on the enrollment form.
#[instrument(skip(pool))]
pub async fn find_active_pair(
    pool: &Pool<Sqlite>,
    student_id: i64,
    course_id: i64,
    exclude_id: Option<i64>,
) -> Result<Option<Enrollment>, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "{} WHERE e.student_id = ",
        SELECT_ENROLLMENT
    ));
    qb.push_bind(student_id);
    qb.push(" AND e.course_id = ").push_bind(course_id);
    qb.push(" AND e.is_active = TRUE");
    if let Some(exclude) = exclude_id {
        qb.push(" AND e.id != ").push_bind(exclude);
    }

    let row: Option<Enrollment> = qb.build_query_as().fetch_optional(pool).await?;
    Ok(row)
}

#[instrument(skip(pool))]
pub async fn active_student_exists(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM students WHERE id = ? AND is_active = TRUE")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

#[instrument(skip(pool))]
pub async fn active_course_exists(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM courses WHERE id = ? AND is_active = TRUE")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

#[instrument(skip(pool, form))]
pub async fn create_enrollment(
    pool: &Pool<Sqlite>,
    ctx: &AuditContext,
    form: &EnrollmentForm,
) -> Result<Enrollment, AppError> {
    info!("Creating enrollment");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO enrollments (student_id, course_id, grade, score, completion_date, is_active, remarks, created_by, updated_by) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(form.student)
    .bind(form.course)
    .bind(form.grade.as_deref())
    .bind(form.score)
    .bind(form.completion_date)
    .bind(form.is_active.unwrap_or(true))
    .bind(form.remarks.as_deref())
    .bind(ctx.actor_id)
    .bind(ctx.actor_id)
    .execute(&mut *tx)
    .await?;

    let id = res.last_insert_rowid();
    replace_links(&mut tx, "enrollment_metadata", "enrollment_id", "metadata_id", id, &form.metadata).await?;

    tx.commit().await?;
    get_enrollment(pool, id).await
}

#[instrument(skip(pool, form))]
pub async fn update_enrollment(
    pool: &Pool<Sqlite>,
    ctx: &AuditContext,
    id: i64,
    form: &EnrollmentForm,
) -> Result<Enrollment, AppError> {
    info!("Updating enrollment");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE enrollments \
         SET student_id = ?, course_id = ?, grade = ?, score = ?, completion_date = ?, \
             is_active = ?, remarks = ?, updated_by = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(form.student)
    .bind(form.course)
    .bind(form.grade.as_deref())
    .bind(form.score)
    .bind(form.completion_date)
    .bind(form.is_active.unwrap_or(true))
    .bind(form.remarks.as_deref())
    .bind(ctx.actor_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Enrollment with id {} not found",
            id
        )));
    }

    replace_links(&mut tx, "enrollment_metadata", "enrollment_id", "metadata_id", id, &form.metadata).await?;

    tx.commit().await?;
    get_enrollment(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_enrollment(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting enrollment");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM enrollment_metadata WHERE enrollment_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM enrollments WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
