use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::auth::{Action, Entity, User};
use crate::crud::{self, CrudResource, CrudResponse, ListResponse, ResponseMode};
use crate::db::AuditContext;
use crate::db::courses::active_course_refs;
use crate::db::enrollments::{
    EnrollmentFilter, active_course_exists, active_student_exists, count_enrollments,
    create_enrollment, delete_enrollment, find_active_pair, get_enrollment, list_enrollments,
    pair_exists, update_enrollment,
};
use crate::db::metadata::{active_tags, missing_active_ids};
use crate::error::{AppError, FieldErrors, field_error, merge_field_errors};
use crate::forms::EnrollmentForm;
use crate::models::{CourseRef, Enrollment, Grade, MetaDataTag};

pub struct EnrollmentResource;

#[rocket::async_trait]
impl CrudResource for EnrollmentResource {
    const ENTITY: Entity = Entity::Enrollment;
    const LIST_PATH: &'static str = "/api/enrollments";

    type Row = Enrollment;
    type Form = EnrollmentForm;
    type Filter = EnrollmentFilter;

    fn display_name(row: &Enrollment) -> String {
        row.display_name()
    }

    async fn count(pool: &Pool<Sqlite>, filter: &EnrollmentFilter) -> Result<i64, AppError> {
        count_enrollments(pool, filter).await
    }

    async fn page(
        pool: &Pool<Sqlite>,
        filter: &EnrollmentFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Enrollment>, AppError> {
        list_enrollments(pool, filter, limit, offset).await
    }

    async fn find(pool: &Pool<Sqlite>, id: i64) -> Result<Enrollment, AppError> {
        get_enrollment(pool, id).await
    }

    async fn preflight(
        pool: &Pool<Sqlite>,
        form: &EnrollmentForm,
        exclude_id: Option<i64>,
    ) -> Result<FieldErrors, AppError> {
        let mut errors = FieldErrors::new();

        if !active_student_exists(pool, form.student).await? {
            merge_field_errors(&mut errors, field_error("student", "Select a valid student."));
        }
        if !active_course_exists(pool, form.course).await? {
            merge_field_errors(&mut errors, field_error("course", "Select a valid course."));
        }

        // The duplicate-pair error cites both selection fields, like the
        // form highlights both widgets.
        if errors.is_empty() && pair_exists(pool, form.student, form.course, exclude_id).await? {
            merge_field_errors(
                &mut errors,
                field_error("student", "This student is already enrolled in this course."),
            );
            merge_field_errors(
                &mut errors,
                field_error("course", "This student is already enrolled in this course."),
            );
        }

        if !missing_active_ids(pool, &form.metadata).await?.is_empty() {
            merge_field_errors(
                &mut errors,
                field_error("metadata", "Select a valid metadata choice."),
            );
        }

        Ok(errors)
    }

    async fn insert(
        pool: &Pool<Sqlite>,
        ctx: &AuditContext,
        form: &EnrollmentForm,
    ) -> Result<Enrollment, AppError> {
        create_enrollment(pool, ctx, form).await
    }

    async fn update(
        pool: &Pool<Sqlite>,
        ctx: &AuditContext,
        id: i64,
        form: &EnrollmentForm,
    ) -> Result<Enrollment, AppError> {
        update_enrollment(pool, ctx, id, form).await
    }

    async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
        delete_enrollment(pool, id).await
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StudentRef {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentFormContext {
    pub student_list: Vec<StudentRef>,
    pub course_list: Vec<CourseRef>,
    pub grade_choices: Vec<&'static str>,
    pub metadata_list: Vec<MetaDataTag>,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentEditContext {
    pub enrollment: Enrollment,
    pub student_list: Vec<StudentRef>,
    pub course_list: Vec<CourseRef>,
    pub grade_choices: Vec<&'static str>,
    pub metadata_list: Vec<MetaDataTag>,
}

async fn active_student_refs(pool: &Pool<Sqlite>) -> Result<Vec<StudentRef>, AppError> {
    let refs: Vec<StudentRef> = sqlx::query_as(
        "SELECT id, first_name, last_name, email FROM students WHERE is_active = TRUE \
         ORDER BY last_name, first_name",
    )
    .fetch_all(pool)
    .await?;
    Ok(refs)
}

fn grade_choices() -> Vec<&'static str> {
    Grade::ALL.iter().map(|grade| grade.as_str()).collect()
}

#[get("/enrollments?<page>&<search>&<student>&<course>&<grade>&<active_status>&<completion_status>&<metadata>")]
pub async fn enrollment_list(
    user: User,
    db: &State<SqlitePool>,
    page: Option<String>,
    search: Option<String>,
    student: Option<i64>,
    course: Option<i64>,
    grade: Option<String>,
    active_status: Option<bool>,
    completion_status: Option<String>,
    metadata: Option<String>,
) -> Result<Json<ListResponse<Enrollment, EnrollmentFilter>>, AppError> {
    let filter = EnrollmentFilter {
        search,
        student,
        course,
        grade,
        active_status,
        completion_status,
        metadata,
    };
    let response = crud::list::<EnrollmentResource>(&user, db, filter, page.as_deref()).await?;
    Ok(Json(response))
}

#[get("/enrollments/add")]
pub async fn enrollment_add_context(
    user: User,
    db: &State<SqlitePool>,
) -> Result<Json<EnrollmentFormContext>, AppError> {
    user.require_capability(Entity::Enrollment.capability(Action::Add))?;
    Ok(Json(EnrollmentFormContext {
        student_list: active_student_refs(db).await?,
        course_list: active_course_refs(db).await?,
        grade_choices: grade_choices(),
        metadata_list: active_tags(db).await?,
    }))
}

#[post("/enrollments/add", data = "<form>")]
pub async fn enrollment_add(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    form: Json<EnrollmentForm>,
) -> CrudResponse {
    crud::create::<EnrollmentResource>(&user, db, mode, form.into_inner()).await
}

#[get("/enrollments/<id>/edit")]
pub async fn enrollment_edit_context(
    user: User,
    db: &State<SqlitePool>,
    id: i64,
) -> Result<Json<EnrollmentEditContext>, AppError> {
    let enrollment = crud::fetch::<EnrollmentResource>(&user, db, id).await?;
    Ok(Json(EnrollmentEditContext {
        enrollment,
        student_list: active_student_refs(db).await?,
        course_list: active_course_refs(db).await?,
        grade_choices: grade_choices(),
        metadata_list: active_tags(db).await?,
    }))
}

#[post("/enrollments/<id>/edit", data = "<form>")]
pub async fn enrollment_edit(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
    form: Json<EnrollmentForm>,
) -> CrudResponse {
    crud::update::<EnrollmentResource>(&user, db, mode, id, form.into_inner()).await
}

#[post("/enrollments/<id>/delete")]
pub async fn enrollment_delete(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
) -> CrudResponse {
    crud::delete::<EnrollmentResource>(&user, db, mode, id).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollmentDetails {
    pub student_name: String,
    pub course_name: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckEnrollmentResponse {
    pub exists: bool,
    pub enrollment_details: Option<EnrollmentDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn check_failure(status: Status, message: &str) -> Custom<Json<CheckEnrollmentResponse>> {
    Custom(
        status,
        Json(CheckEnrollmentResponse {
            exists: false,
            enrollment_details: None,
            error: Some(message.to_string()),
        }),
    )
}

/// Duplicate-enrollment probe used by the enrollment form before submit.
#[get("/check-enrollment?<student>&<course>&<exclude>")]
pub async fn enrollment_check(
    _user: User,
    db: &State<SqlitePool>,
    student: Option<String>,
    course: Option<String>,
    exclude: Option<String>,
) -> Custom<Json<CheckEnrollmentResponse>> {
    let (Some(student), Some(course)) = (student, course) else {
        return check_failure(
            Status::BadRequest,
            "Student and course parameters are required",
        );
    };

    let (Ok(student_id), Ok(course_id)) = (student.parse::<i64>(), course.parse::<i64>()) else {
        return check_failure(Status::BadRequest, "Invalid student or course ID");
    };

    let exclude_id = match exclude.as_deref() {
        None | Some("") => None,
        Some(raw) => match raw.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => return check_failure(Status::BadRequest, "Invalid student or course ID"),
        },
    };

    match find_active_pair(db, student_id, course_id, exclude_id).await {
        Ok(Some(enrollment)) => Custom(
            Status::Ok,
            Json(CheckEnrollmentResponse {
                exists: true,
                enrollment_details: Some(EnrollmentDetails {
                    student_name: enrollment.student_name.clone(),
                    course_name: enrollment.course_name.clone(),
                    status: if enrollment.is_active {
                        "Active".to_string()
                    } else {
                        "Inactive".to_string()
                    },
                }),
                error: None,
            }),
        ),
        Ok(None) => Custom(
            Status::Ok,
            Json(CheckEnrollmentResponse {
                exists: false,
                enrollment_details: None,
                error: None,
            }),
        ),
        Err(err) => {
            err.log_and_record("check-enrollment");
            check_failure(
                Status::InternalServerError,
                "An error occurred while checking enrollment",
            )
        }
    }
}
