use serde::Serialize;
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument};

use crate::db::{AuditContext, replace_links, tags_by_owner};
use crate::error::AppError;
use crate::forms::CourseForm;
use crate::models::{Course, CourseRef};

#[derive(Debug, Default, Clone, Serialize)]
pub struct CourseFilter {
    pub search: Option<String>,
    pub metadata: Option<String>,
    pub active_status: Option<bool>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &CourseFilter) {
    qb.push(" LEFT JOIN course_metadata cm ON cm.course_id = c.id");
    qb.push(" LEFT JOIN metadata m ON m.id = cm.metadata_id");
    qb.push(" WHERE 1 = 1");

    if let Some(key) = &filter.metadata {
        qb.push(" AND m.key = ").push_bind(key.clone());
    }
    if let Some(active) = filter.active_status {
        qb.push(" AND c.is_active = ").push_bind(active);
    }
    if let Some(search) = &filter.search {
        let like = format!("%{}%", search);
        qb.push(" AND (c.name LIKE ").push_bind(like.clone());
        qb.push(" OR c.course_code LIKE ").push_bind(like.clone());
        qb.push(" OR c.description LIKE ").push_bind(like);
        qb.push(")");
    }
}

#[instrument(skip(pool))]
pub async fn count_courses(pool: &Pool<Sqlite>, filter: &CourseFilter) -> Result<i64, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(DISTINCT c.id) FROM courses c");
    push_filters(&mut qb, filter);

    let count: (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count.0)
}

#[instrument(skip(pool))]
pub async fn list_courses(
    pool: &Pool<Sqlite>,
    filter: &CourseFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Course>, AppError> {
    info!("Listing courses");
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT DISTINCT c.* FROM courses c");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY c.course_code LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let mut courses: Vec<Course> = qb.build_query_as().fetch_all(pool).await?;
    attach_metadata(pool, &mut courses).await?;
    Ok(courses)
}

async fn attach_metadata(pool: &Pool<Sqlite>, courses: &mut [Course]) -> Result<(), AppError> {
    let ids: Vec<i64> = courses.iter().map(|c| c.id).collect();
    let mut tags = tags_by_owner(pool, "course_metadata", "course_id", &ids).await?;
    for course in courses {
        course.metadata = tags.remove(&course.id).unwrap_or_default();
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_course(pool: &Pool<Sqlite>, id: i64) -> Result<Course, AppError> {
    let row: Option<Course> = sqlx::query_as("SELECT * FROM courses WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(mut course) => {
            attach_metadata(pool, std::slice::from_mut(&mut course)).await?;
            Ok(course)
        }
        _ => Err(AppError::NotFound(format!("Course with id {} not found", id))),
    }
}

/// Active courses for selection widgets.
#[instrument(skip(pool))]
pub async fn active_course_refs(pool: &Pool<Sqlite>) -> Result<Vec<CourseRef>, AppError> {
    let refs: Vec<CourseRef> = sqlx::query_as(
        "SELECT id, course_code, name FROM courses WHERE is_active = TRUE ORDER BY course_code",
    )
    .fetch_all(pool)
    .await?;
    Ok(refs)
}

#[instrument(skip(pool))]
pub async fn code_taken(
    pool: &Pool<Sqlite>,
    course_code: &str,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM courses WHERE course_code = ? AND id != ?")
            .bind(course_code)
            .bind(exclude_id.unwrap_or(0))
            .fetch_optional(pool)
            .await?;
    Ok(existing.is_some())
}

/// Ids from `ids` that do not name an active course.
#[instrument(skip(pool))]
pub async fn missing_active_ids(pool: &Pool<Sqlite>, ids: &[i64]) -> Result<Vec<i64>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id FROM courses WHERE is_active = TRUE AND id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    qb.push(")");

    let found: Vec<(i64,)> = qb.build_query_as().fetch_all(pool).await?;
    let found: std::collections::HashSet<i64> = found.into_iter().map(|row| row.0).collect();

    Ok(ids.iter().copied().filter(|id| !found.contains(id)).collect())
}

#[instrument(skip(pool, form))]
pub async fn create_course(
    pool: &Pool<Sqlite>,
    ctx: &AuditContext,
    form: &CourseForm,
) -> Result<Course, AppError> {
    info!("Creating course");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO courses (name, course_code, description, is_active, remarks, created_by, updated_by) \
         VALUES (?, ?, ?, TRUE, ?, ?, ?)",
    )
    .bind(&form.name)
    .bind(&form.course_code)
    .bind(&form.description)
    .bind(form.remarks.as_deref())
    .bind(ctx.actor_id)
    .bind(ctx.actor_id)
    .execute(&mut *tx)
    .await?;

    let id = res.last_insert_rowid();
    replace_links(&mut tx, "course_metadata", "course_id", "metadata_id", id, &form.metadata).await?;

    tx.commit().await?;
    get_course(pool, id).await
}

#[instrument(skip(pool, form))]
pub async fn update_course(
    pool: &Pool<Sqlite>,
    ctx: &AuditContext,
    id: i64,
    form: &CourseForm,
) -> Result<Course, AppError> {
    info!("Updating course");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE courses \
         SET name = ?, course_code = ?, description = ?, remarks = ?, \
             updated_by = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(&form.name)
    .bind(&form.course_code)
    .bind(&form.description)
    .bind(form.remarks.as_deref())
    .bind(ctx.actor_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Course with id {} not found", id)));
    }

    replace_links(&mut tx, "course_metadata", "course_id", "metadata_id", id, &form.metadata).await?;

    tx.commit().await?;
    get_course(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_course(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting course");
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM enrollment_metadata WHERE enrollment_id IN \
         (SELECT id FROM enrollments WHERE course_id = ?)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM enrollments WHERE course_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM instructor_courses WHERE course_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM course_metadata WHERE course_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
