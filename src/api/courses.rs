use rocket::State;
use rocket::serde::json::Json;
use serde::Serialize;
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::auth::{Action, Entity, User};
use crate::crud::{self, CrudResource, CrudResponse, ListResponse, ResponseMode};
use crate::db::AuditContext;
use crate::db::courses::{
    CourseFilter, code_taken, count_courses, create_course, delete_course, get_course,
    list_courses, update_course,
};
use crate::db::metadata::{active_tags, missing_active_ids};
use crate::error::{AppError, FieldErrors, field_error, merge_field_errors};
use crate::forms::CourseForm;
use crate::models::{Course, MetaDataTag};

pub struct CourseResource;

#[rocket::async_trait]
impl CrudResource for CourseResource {
    const ENTITY: Entity = Entity::Course;
    const LIST_PATH: &'static str = "/api/courses";

    type Row = Course;
    type Form = CourseForm;
    type Filter = CourseFilter;

    fn display_name(row: &Course) -> String {
        row.display_name()
    }

    async fn count(pool: &Pool<Sqlite>, filter: &CourseFilter) -> Result<i64, AppError> {
        count_courses(pool, filter).await
    }

    async fn page(
        pool: &Pool<Sqlite>,
        filter: &CourseFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Course>, AppError> {
        list_courses(pool, filter, limit, offset).await
    }

    async fn find(pool: &Pool<Sqlite>, id: i64) -> Result<Course, AppError> {
        get_course(pool, id).await
    }

    async fn preflight(
        pool: &Pool<Sqlite>,
        form: &CourseForm,
        exclude_id: Option<i64>,
    ) -> Result<FieldErrors, AppError> {
        let mut errors = FieldErrors::new();
        if code_taken(pool, &form.course_code, exclude_id).await? {
            merge_field_errors(
                &mut errors,
                field_error("course_code", "A course with this course code already exists."),
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
        form: &CourseForm,
    ) -> Result<Course, AppError> {
        create_course(pool, ctx, form).await
    }

    async fn update(
        pool: &Pool<Sqlite>,
        ctx: &AuditContext,
        id: i64,
        form: &CourseForm,
    ) -> Result<Course, AppError> {
        update_course(pool, ctx, id, form).await
    }

    async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
        delete_course(pool, id).await
    }
}

#[derive(Debug, Serialize)]
pub struct CourseFormContext {
    pub metadata_list: Vec<MetaDataTag>,
}

#[derive(Debug, Serialize)]
pub struct CourseEditContext {
    pub course: Course,
    pub metadata_list: Vec<MetaDataTag>,
}

#[get("/courses?<page>&<search>&<metadata>&<active_status>")]
pub async fn course_list(
    user: User,
    db: &State<SqlitePool>,
    page: Option<String>,
    search: Option<String>,
    metadata: Option<String>,
    active_status: Option<bool>,
) -> Result<Json<ListResponse<Course, CourseFilter>>, AppError> {
    let filter = CourseFilter {
        search,
        metadata,
        active_status,
    };
    let response = crud::list::<CourseResource>(&user, db, filter, page.as_deref()).await?;
    Ok(Json(response))
}

#[get("/courses/add")]
pub async fn course_add_context(
    user: User,
    db: &State<SqlitePool>,
) -> Result<Json<CourseFormContext>, AppError> {
    user.require_capability(Entity::Course.capability(Action::Add))?;
    Ok(Json(CourseFormContext {
        metadata_list: active_tags(db).await?,
    }))
}

#[post("/courses/add", data = "<form>")]
pub async fn course_add(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    form: Json<CourseForm>,
) -> CrudResponse {
    crud::create::<CourseResource>(&user, db, mode, form.into_inner()).await
}

#[get("/courses/<id>/edit")]
pub async fn course_edit_context(
    user: User,
    db: &State<SqlitePool>,
    id: i64,
) -> Result<Json<CourseEditContext>, AppError> {
    let course = crud::fetch::<CourseResource>(&user, db, id).await?;
    Ok(Json(CourseEditContext {
        course,
        metadata_list: active_tags(db).await?,
    }))
}

#[post("/courses/<id>/edit", data = "<form>")]
pub async fn course_edit(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
    form: Json<CourseForm>,
) -> CrudResponse {
    crud::update::<CourseResource>(&user, db, mode, id, form.into_inner()).await
}

#[post("/courses/<id>/delete")]
pub async fn course_delete(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
) -> CrudResponse {
    crud::delete::<CourseResource>(&user, db, mode, id).await
}
