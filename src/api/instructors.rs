use rocket::State;
use rocket::serde::json::Json;
use serde::Serialize;
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::auth::{Action, Entity, User};
use crate::crud::{self, CrudResource, CrudResponse, ListResponse, ResponseMode};
use crate::db::AuditContext;
use crate::db::courses::{active_course_refs, missing_active_ids as missing_course_ids};
use crate::db::instructors::{
    InstructorFilter, count_instructors, create_instructor, delete_instructor, email_taken,
    get_instructor, list_instructors, update_instructor,
};
use crate::db::metadata::{active_tags, missing_active_ids as missing_metadata_ids};
use crate::error::{AppError, FieldErrors, field_error, merge_field_errors};
use crate::forms::InstructorForm;
use crate::models::{CourseRef, Instructor, MetaDataTag};

pub struct InstructorResource;

#[rocket::async_trait]
impl CrudResource for InstructorResource {
    const ENTITY: Entity = Entity::Instructor;
    const LIST_PATH: &'static str = "/api/instructors";

    type Row = Instructor;
    type Form = InstructorForm;
    type Filter = InstructorFilter;

    fn display_name(row: &Instructor) -> String {
        row.full_name()
    }

    async fn count(pool: &Pool<Sqlite>, filter: &InstructorFilter) -> Result<i64, AppError> {
        count_instructors(pool, filter).await
    }

    async fn page(
        pool: &Pool<Sqlite>,
        filter: &InstructorFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Instructor>, AppError> {
        list_instructors(pool, filter, limit, offset).await
    }

    async fn find(pool: &Pool<Sqlite>, id: i64) -> Result<Instructor, AppError> {
        get_instructor(pool, id).await
    }

    async fn preflight(
        pool: &Pool<Sqlite>,
        form: &InstructorForm,
        exclude_id: Option<i64>,
    ) -> Result<FieldErrors, AppError> {
        let mut errors = FieldErrors::new();
        if email_taken(pool, &form.email, exclude_id).await? {
            merge_field_errors(
                &mut errors,
                field_error("email", "An instructor with that email already exists."),
            );
        }
        if !missing_course_ids(pool, &form.courses).await?.is_empty() {
            merge_field_errors(
                &mut errors,
                field_error("courses", "Select a valid course choice."),
            );
        }
        if !missing_metadata_ids(pool, &form.metadata).await?.is_empty() {
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
        form: &InstructorForm,
    ) -> Result<Instructor, AppError> {
        create_instructor(pool, ctx, form).await
    }

    async fn update(
        pool: &Pool<Sqlite>,
        ctx: &AuditContext,
        id: i64,
        form: &InstructorForm,
    ) -> Result<Instructor, AppError> {
        update_instructor(pool, ctx, id, form).await
    }

    async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
        delete_instructor(pool, id).await
    }
}

#[derive(Debug, Serialize)]
pub struct InstructorFormContext {
    pub course_list: Vec<CourseRef>,
    pub metadata_list: Vec<MetaDataTag>,
}

#[derive(Debug, Serialize)]
pub struct InstructorEditContext {
    pub instructor: Instructor,
    pub course_list: Vec<CourseRef>,
    pub metadata_list: Vec<MetaDataTag>,
}

#[get("/instructors?<page>&<search>&<metadata>&<course>&<active_status>")]
pub async fn instructor_list(
    user: User,
    db: &State<SqlitePool>,
    page: Option<String>,
    search: Option<String>,
    metadata: Option<String>,
    course: Option<i64>,
    active_status: Option<bool>,
) -> Result<Json<ListResponse<Instructor, InstructorFilter>>, AppError> {
    let filter = InstructorFilter {
        search,
        metadata,
        course,
        active_status,
    };
    let response = crud::list::<InstructorResource>(&user, db, filter, page.as_deref()).await?;
    Ok(Json(response))
}

#[get("/instructors/add")]
pub async fn instructor_add_context(
    user: User,
    db: &State<SqlitePool>,
) -> Result<Json<InstructorFormContext>, AppError> {
    user.require_capability(Entity::Instructor.capability(Action::Add))?;
    Ok(Json(InstructorFormContext {
        course_list: active_course_refs(db).await?,
        metadata_list: active_tags(db).await?,
    }))
}

#[post("/instructors/add", data = "<form>")]
pub async fn instructor_add(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    form: Json<InstructorForm>,
) -> CrudResponse {
    crud::create::<InstructorResource>(&user, db, mode, form.into_inner()).await
}

#[get("/instructors/<id>/edit")]
pub async fn instructor_edit_context(
    user: User,
    db: &State<SqlitePool>,
    id: i64,
) -> Result<Json<InstructorEditContext>, AppError> {
    let instructor = crud::fetch::<InstructorResource>(&user, db, id).await?;
    Ok(Json(InstructorEditContext {
        instructor,
        course_list: active_course_refs(db).await?,
        metadata_list: active_tags(db).await?,
    }))
}

#[post("/instructors/<id>/edit", data = "<form>")]
pub async fn instructor_edit(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
    form: Json<InstructorForm>,
) -> CrudResponse {
    crud::update::<InstructorResource>(&user, db, mode, id, form.into_inner()).await
}

#[post("/instructors/<id>/delete")]
pub async fn instructor_delete(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
) -> CrudResponse {
    crud::delete::<InstructorResource>(&user, db, mode, id).await
}
