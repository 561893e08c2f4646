use rocket::State;
use rocket::serde::json::Json;
use serde::Serialize;
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::auth::{Action, Entity, User};
use crate::crud::{self, CrudResource, CrudResponse, ListResponse, ResponseMode};
use crate::db::AuditContext;
use crate::db::metadata::{active_tags, missing_active_ids};
use crate::db::students::{
    StudentFilter, count_students, create_student, delete_student, email_taken, get_student,
    list_students, update_student,
};
use crate::error::{AppError, FieldErrors, field_error, merge_field_errors};
use crate::forms::StudentForm;
use crate::models::{MetaDataTag, Student};

pub struct StudentResource;

#[rocket::async_trait]
impl CrudResource for StudentResource {
    const ENTITY: Entity = Entity::Student;
    const LIST_PATH: &'static str = "/api/students";

    type Row = Student;
    type Form = StudentForm;
    type Filter = StudentFilter;

    fn display_name(row: &Student) -> String {
        row.full_name()
    }

    async fn count(pool: &Pool<Sqlite>, filter: &StudentFilter) -> Result<i64, AppError> {
        count_students(pool, filter).await
    }

    async fn page(
        pool: &Pool<Sqlite>,
        filter: &StudentFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Student>, AppError> {
        list_students(pool, filter, limit, offset).await
    }

    async fn find(pool: &Pool<Sqlite>, id: i64) -> Result<Student, AppError> {
        get_student(pool, id).await
    }

    async fn preflight(
        pool: &Pool<Sqlite>,
        form: &StudentForm,
        exclude_id: Option<i64>,
    ) -> Result<FieldErrors, AppError> {
        let mut errors = FieldErrors::new();
        if email_taken(pool, &form.email, exclude_id).await? {
            merge_field_errors(
                &mut errors,
                field_error("email", "A student with that email already exists."),
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
        form: &StudentForm,
    ) -> Result<Student, AppError> {
        create_student(pool, ctx, form).await
    }

    async fn update(
        pool: &Pool<Sqlite>,
        ctx: &AuditContext,
        id: i64,
        form: &StudentForm,
    ) -> Result<Student, AppError> {
        update_student(pool, ctx, id, form).await
    }

    async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
        delete_student(pool, id).await
    }
}

#[derive(Debug, Serialize)]
pub struct StudentFormContext {
    pub metadata_list: Vec<MetaDataTag>,
}

#[derive(Debug, Serialize)]
pub struct StudentEditContext {
    pub student: Student,
    pub metadata_list: Vec<MetaDataTag>,
}

#[get("/students?<page>&<search>&<metadata>&<active_status>")]
pub async fn student_list(
    user: User,
    db: &State<SqlitePool>,
    page: Option<String>,
    search: Option<String>,
    metadata: Option<String>,
    active_status: Option<bool>,
) -> Result<Json<ListResponse<Student, StudentFilter>>, AppError> {
    let filter = StudentFilter {
        search,
        metadata,
        active_status,
    };
    let response = crud::list::<StudentResource>(&user, db, filter, page.as_deref()).await?;
    Ok(Json(response))
}

#[get("/students/add")]
pub async fn student_add_context(
    user: User,
    db: &State<SqlitePool>,
) -> Result<Json<StudentFormContext>, AppError> {
    user.require_capability(Entity::Student.capability(Action::Add))?;
    Ok(Json(StudentFormContext {
        metadata_list: active_tags(db).await?,
    }))
}

#[post("/students/add", data = "<form>")]
pub async fn student_add(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    form: Json<StudentForm>,
) -> CrudResponse {
    crud::create::<StudentResource>(&user, db, mode, form.into_inner()).await
}

#[get("/students/<id>/edit")]
pub async fn student_edit_context(
    user: User,
    db: &State<SqlitePool>,
    id: i64,
) -> Result<Json<StudentEditContext>, AppError> {
    let student = crud::fetch::<StudentResource>(&user, db, id).await?;
    Ok(Json(StudentEditContext {
        student,
        metadata_list: active_tags(db).await?,
    }))
}

#[post("/students/<id>/edit", data = "<form>")]
pub async fn student_edit(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
    form: Json<StudentForm>,
) -> CrudResponse {
    crud::update::<StudentResource>(&user, db, mode, id, form.into_inner()).await
}

#[post("/students/<id>/delete")]
pub async fn student_delete(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
) -> CrudResponse {
    crud::delete::<StudentResource>(&user, db, mode, id).await
}
