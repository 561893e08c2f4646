use serde::Serialize;
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument};

use crate::db::{AuditContext, replace_links, tags_by_owner};
use crate::error::AppError;
use crate::forms::StudentForm;
use crate::models::Student;

#[derive(Debug, Default, Clone, Serialize)]
pub struct StudentFilter {
    pub search: Option<String>,
    pub metadata: Option<String>,
    pub active_status: Option<bool>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &StudentFilter) {
    qb.push(" LEFT JOIN student_metadata sm ON sm.student_id = s.id");
    qb.push(" LEFT JOIN metadata m ON m.id = sm.metadata_id");
    qb.push(" WHERE 1 = 1");

    if let Some(key) = &filter.metadata {
        qb.push(" AND m.key = ").push_bind(key.clone());
    }
    if let Some(active) = filter.active_status {
        qb.push(" AND s.is_active = ").push_bind(active);
    }
    if let Some(search) = &filter.search {
        let like = format!("%{}%", search);
        qb.push(" AND (s.first_name LIKE ").push_bind(like.clone());
        qb.push(" OR s.last_name LIKE ").push_bind(like.clone());
        qb.push(" OR s.email LIKE ").push_bind(like);
        qb.push(")");
    }
}

#[instrument(skip(pool))]
pub async fn count_students(pool: &Pool<Sqlite>, filter: &StudentFilter) -> Result<i64, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(DISTINCT s.id) FROM students s");
    push_filters(&mut qb, filter);

    let count: (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count.0)
}

#[instrument(skip(pool))]
pub async fn list_students(
    pool: &Pool<Sqlite>,
    filter: &StudentFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Student>, AppError> {
    info!("Listing students");
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT DISTINCT s.* FROM students s");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY s.last_name, s.first_name LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let mut students: Vec<Student> = qb.build_query_as().fetch_all(pool).await?;
    attach_metadata(pool, &mut students).await?;
    Ok(students)
}

async fn attach_metadata(pool: &Pool<Sqlite>, students: &mut [Student]) -> Result<(), AppError> {
    let ids: Vec<i64> = students.iter().map(|s| s.id).collect();
    let mut tags = tags_by_owner(pool, "student_metadata", "student_id", &ids).await?;
    for student in students {
        student.metadata = tags.remove(&student.id).unwrap_or_default();
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_student(pool: &Pool<Sqlite>, id: i64) -> Result<Student, AppError> {
    let row: Option<Student> = sqlx::query_as("SELECT * FROM students WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(mut student) => {
            attach_metadata(pool, std::slice::from_mut(&mut student)).await?;
            Ok(student)
        }
        _ => Err(AppError::NotFound(format!("Student with id {} not found", id))),
    }
}

#[instrument(skip(pool))]
pub async fn email_taken(
    pool: &Pool<Sqlite>,
    email: &str,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM students WHERE email = ? AND id != ?")
            .bind(email)
            .bind(exclude_id.unwrap_or(0))
            .fetch_optional(pool)
            .await?;
    Ok(existing.is_some())
}

#[instrument(skip(pool, form))]
pub async fn create_student(
    pool: &Pool<Sqlite>,
    ctx: &AuditContext,
    form: &StudentForm,
) -> Result<Student, AppError> {
    info!("Creating student");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO students (first_name, last_name, email, date_of_birth, is_active, remarks, created_by, updated_by) \
         VALUES (?, ?, ?, ?, TRUE, ?, ?, ?)",
    )
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(&form.email)
    .bind(form.date_of_birth)
    .bind(form.remarks.as_deref())
    .bind(ctx.actor_id)
    .bind(ctx.actor_id)
    .execute(&mut *tx)
    .await?;

    let id = res.last_insert_rowid();
    replace_links(&mut tx, "student_metadata", "student_id", "metadata_id", id, &form.metadata).await?;

    tx.commit().await?;
    get_student(pool, id).await
}

#[instrument(skip(pool, form))]
pub async fn update_student(
    pool: &Pool<Sqlite>,
    ctx: &AuditContext,
    id: i64,
    form: &StudentForm,
) -> Result<Student, AppError> {
    info!("Updating student");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE students \
         SET first_name = ?, last_name = ?, email = ?, date_of_birth = ?, remarks = ?, \
             updated_by = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(&form.email)
    .bind(form.date_of_birth)
    .bind(form.remarks.as_deref())
    .bind(ctx.actor_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Student with id {} not found", id)));
    }

    replace_links(&mut tx, "student_metadata", "student_id", "metadata_id", id, &form.metadata).await?;

    tx.commit().await?;
    get_student(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_student(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting student");
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM enrollment_metadata WHERE enrollment_id IN \
         (SELECT id FROM enrollments WHERE student_id = ?)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM enrollments WHERE student_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM student_metadata WHERE student_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
