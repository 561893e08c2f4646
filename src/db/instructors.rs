use serde::Serialize;
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument};

use crate::db::{AuditContext, replace_links, tags_by_owner};
use crate::error::AppError;
use crate::forms::InstructorForm;
use crate::models::{CourseRef, Instructor};

#[derive(Debug, Default, Clone, Serialize)]
pub struct InstructorFilter {
    pub search: Option<String>,
    pub metadata: Option<String>,
    pub course: Option<i64>,
    pub active_status: Option<bool>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &InstructorFilter) {
    qb.push(" LEFT JOIN instructor_metadata im ON im.instructor_id = i.id");
    qb.push(" LEFT JOIN metadata m ON m.id = im.metadata_id");
    qb.push(" LEFT JOIN instructor_courses ic ON ic.instructor_id = i.id");
    qb.push(" WHERE 1 = 1");

    if let Some(key) = &filter.metadata {
        qb.push(" AND m.key = ").push_bind(key.clone());
    }
    if let Some(course_id) = filter.course {
        qb.push(" AND ic.course_id = ").push_bind(course_id);
    }
    if let Some(active) = filter.active_status {
        qb.push(" AND i.is_active = ").push_bind(active);
    }
    if let Some(search) = &filter.search {
        let like = format!("%{}%", search);
        qb.push(" AND (i.first_name LIKE ").push_bind(like.clone());
        qb.push(" OR i.last_name LIKE ").push_bind(like.clone());
        qb.push(" OR i.email LIKE ").push_bind(like);
        qb.push(")");
    }
}

#[instrument(skip(pool))]
pub async fn count_instructors(
    pool: &Pool<Sqlite>,
    filter: &InstructorFilter,
) -> Result<i64, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(DISTINCT i.id) FROM instructors i");
    push_filters(&mut qb, filter);

    let count: (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count.0)
}

#[instrument(skip(pool))]
pub async fn list_instructors(
    pool: &Pool<Sqlite>,
    filter: &InstructorFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Instructor>, AppError> {
    info!("Listing instructors");
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT DISTINCT i.* FROM instructors i");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY i.last_name, i.first_name LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let mut instructors: Vec<Instructor> = qb.build_query_as().fetch_all(pool).await?;
    attach_relations(pool, &mut instructors).await?;
    Ok(instructors)
}

#[derive(sqlx::FromRow)]
struct CourseLinkRow {
    instructor_id: i64,
    id: i64,
    course_code: String,
    name: String,
}

async fn attach_relations(
    pool: &Pool<Sqlite>,
    instructors: &mut [Instructor],
) -> Result<(), AppError> {
    let ids: Vec<i64> = instructors.iter().map(|i| i.id).collect();
    if ids.is_empty() {
        return Ok(());
    }

    let mut tags = tags_by_owner(pool, "instructor_metadata", "instructor_id", &ids).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT ic.instructor_id, c.id, c.course_code, c.name \
         FROM instructor_courses ic JOIN courses c ON c.id = ic.course_id \
         WHERE ic.instructor_id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in &ids {
        separated.push_bind(*id);
    }
    qb.push(") ORDER BY c.course_code");

    let course_rows: Vec<CourseLinkRow> = qb.build_query_as().fetch_all(pool).await?;
    let mut courses: std::collections::HashMap<i64, Vec<CourseRef>> =
        std::collections::HashMap::new();
    for row in course_rows {
        courses.entry(row.instructor_id).or_default().push(CourseRef {
            id: row.id,
            course_code: row.course_code,
            name: row.name,
        });
    }

    for instructor in instructors {
        instructor.metadata = tags.remove(&instructor.id).unwrap_or_default();
        instructor.courses = courses.remove(&instructor.id).unwrap_or_default();
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_instructor(pool: &Pool<Sqlite>, id: i64) -> Result<Instructor, AppError> {
    let row: Option<Instructor> = sqlx::query_as("SELECT * FROM instructors WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(mut instructor) => {
            attach_relations(pool, std::slice::from_mut(&mut instructor)).await?;
            Ok(instructor)
        }
        _ => Err(AppError::NotFound(format!(
            "Instructor with id {} not found",
            id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn email_taken(
    pool: &Pool<Sqlite>,
    email: &str,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM instructors WHERE email = ? AND id != ?")
            .bind(email)
            .bind(exclude_id.unwrap_or(0))
            .fetch_optional(pool)
            .await?;
    Ok(existing.is_some())
}

#[instrument(skip(pool, form))]
pub async fn create_instructor(
    pool: &Pool<Sqlite>,
    ctx: &AuditContext,
    form: &InstructorForm,
) -> Result<Instructor, AppError> {
    info!("Creating instructor");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO instructors (first_name, last_name, email, phone_number, is_active, remarks, created_by, updated_by) \
         VALUES (?, ?, ?, ?, TRUE, ?, ?, ?)",
    )
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(&form.email)
    .bind(&form.phone_number)
    .bind(form.remarks.as_deref())
    .bind(ctx.actor_id)
    .bind(ctx.actor_id)
    .execute(&mut *tx)
    .await?;

    let id = res.last_insert_rowid();
    replace_links(&mut tx, "instructor_courses", "instructor_id", "course_id", id, &form.courses).await?;
    replace_links(&mut tx, "instructor_metadata", "instructor_id", "metadata_id", id, &form.metadata).await?;

    tx.commit().await?;
    get_instructor(pool, id).await
}

#[instrument(skip(pool, form))]
pub async fn update_instructor(
    pool: &Pool<Sqlite>,
    ctx: &AuditContext,
    id: i64,
    form: &InstructorForm,
) -> Result<Instructor, AppError> {
    info!("Updating instructor");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE instructors \
         SET first_name = ?, last_name = ?, email = ?, phone_number = ?, remarks = ?, \
             updated_by = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(&form.email)
    .bind(&form.phone_number)
    .bind(form.remarks.as_deref())
    .bind(ctx.actor_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Instructor with id {} not found",
            id
        )));
    }

    replace_links(&mut tx, "instructor_courses", "instructor_id", "course_id", id, &form.courses).await?;
    replace_links(&mut tx, "instructor_metadata", "instructor_id", "metadata_id", id, &form.metadata).await?;

    tx.commit().await?;
    get_instructor(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_instructor(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting instructor");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM instructor_courses WHERE instructor_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM instructor_metadata WHERE instructor_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM instructors WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
