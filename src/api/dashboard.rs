use rocket::State;
use rocket::serde::json::Json;
use serde::Serialize;
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::auth::User;
use crate::auth::permissions::DASHBOARD_VIEW;
use crate::db::courses::{CourseFilter, count_courses};
use crate::db::enrollments::{EnrollmentFilter, count_enrollments};
use crate::db::instructors::{InstructorFilter, count_instructors};
use crate::db::students::{StudentFilter, count_students};
use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct EntityCount {
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub students: EntityCount,
    pub instructors: EntityCount,
    pub courses: EntityCount,
    pub enrollments: EntityCount,
}

async fn student_counts(pool: &Pool<Sqlite>) -> Result<EntityCount, AppError> {
    Ok(EntityCount {
        total: count_students(pool, &StudentFilter::default()).await?,
        active: count_students(
            pool,
            &StudentFilter {
                active_status: Some(true),
                ..Default::default()
            },
        )
        .await?,
    })
}

async fn instructor_counts(pool: &Pool<Sqlite>) -> Result<EntityCount, AppError> {
    Ok(EntityCount {
        total: count_instructors(pool, &InstructorFilter::default()).await?,
        active: count_instructors(
            pool,
            &InstructorFilter {
                active_status: Some(true),
                ..Default::default()
            },
        )
        .await?,
    })
}

async fn course_counts(pool: &Pool<Sqlite>) -> Result<EntityCount, AppError> {
    Ok(EntityCount {
        total: count_courses(pool, &CourseFilter::default()).await?,
        active: count_courses(
            pool,
            &CourseFilter {
                active_status: Some(true),
                ..Default::default()
            },
        )
        .await?,
    })
}

async fn enrollment_counts(pool: &Pool<Sqlite>) -> Result<EntityCount, AppError> {
    Ok(EntityCount {
        total: count_enrollments(pool, &EnrollmentFilter::default()).await?,
        active: count_enrollments(
            pool,
            &EnrollmentFilter {
                active_status: Some(true),
                ..Default::default()
            },
        )
        .await?,
    })
}

#[get("/dashboard")]
pub async fn dashboard(
    user: User,
    db: &State<SqlitePool>,
) -> Result<Json<DashboardResponse>, AppError> {
    user.require_capability(DASHBOARD_VIEW)?;

    Ok(Json(DashboardResponse {
        students: student_counts(db).await?,
        instructors: instructor_counts(db).await?,
        courses: course_counts(db).await?,
        enrollments: enrollment_counts(db).await?,
    }))
}
