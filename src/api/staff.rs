use rocket::State;
use rocket::serde::json::Json;
use serde::Serialize;
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::auth::{Action, Entity, User};
use crate::crud::{self, CrudResource, CrudResponse, ListResponse, ResponseMode};
use crate::db::AuditContext;
use crate::db::groups::{missing_ids as missing_group_ids};
use crate::db::staff::{
    StaffFilter, count_staff, create_staff, delete_staff, email_taken, get_staff_member,
    list_staff, update_staff, username_taken,
};
use crate::error::{AppError, FieldErrors, field_error, merge_field_errors};
use crate::forms::StaffForm;
use crate::models::{Group, StaffMember};

pub struct StaffResource;

#[rocket::async_trait]
impl CrudResource for StaffResource {
    const ENTITY: Entity = Entity::Staff;
    const LIST_PATH: &'static str = "/api/staffs";

    type Row = StaffMember;
    type Form = StaffForm;
    type Filter = StaffFilter;

    fn display_name(row: &StaffMember) -> String {
        row.full_name()
    }

    async fn count(pool: &Pool<Sqlite>, filter: &StaffFilter) -> Result<i64, AppError> {
        count_staff(pool, filter).await
    }

    async fn page(
        pool: &Pool<Sqlite>,
        filter: &StaffFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StaffMember>, AppError> {
        list_staff(pool, filter, limit, offset).await
    }

    async fn find(pool: &Pool<Sqlite>, id: i64) -> Result<StaffMember, AppError> {
        get_staff_member(pool, id).await
    }

    async fn preflight(
        pool: &Pool<Sqlite>,
        form: &StaffForm,
        exclude_id: Option<i64>,
    ) -> Result<FieldErrors, AppError> {
        let mut errors = FieldErrors::new();

        if username_taken(pool, &form.username, exclude_id).await? {
            merge_field_errors(
                &mut errors,
                field_error("username", "A user with that username already exists."),
            );
        }
        if email_taken(pool, &form.email, exclude_id).await? {
            merge_field_errors(
                &mut errors,
                field_error("email", "A user with that email already exists."),
            );
        }

        // New accounts need a password; edits keep the old one unless a new
        // one is submitted.
        let password_missing = form.password.as_deref().unwrap_or("").is_empty();
        if exclude_id.is_none() && password_missing {
            merge_field_errors(&mut errors, field_error("password", "This field is required."));
        }

        if !missing_group_ids(pool, &form.groups).await?.is_empty() {
            merge_field_errors(
                &mut errors,
                field_error("groups", "Select a valid group choice."),
            );
        }

        Ok(errors)
    }

    async fn insert(
        pool: &Pool<Sqlite>,
        _ctx: &AuditContext,
        form: &StaffForm,
    ) -> Result<StaffMember, AppError> {
        create_staff(pool, form).await
    }

    async fn update(
        pool: &Pool<Sqlite>,
        _ctx: &AuditContext,
        id: i64,
        form: &StaffForm,
    ) -> Result<StaffMember, AppError> {
        update_staff(pool, id, form).await
    }

    async fn can_delete(
        _pool: &Pool<Sqlite>,
        actor: &User,
        row: &StaffMember,
    ) -> Result<(), String> {
        if row.is_superuser {
            return Err("Cannot delete superuser account.".to_string());
        }
        if row.id == actor.id {
            return Err("You cannot delete your own account.".to_string());
        }
        Ok(())
    }

    async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
        delete_staff(pool, id).await
    }
}

#[derive(Debug, Serialize)]
pub struct StaffFormContext {
    pub groups: Vec<Group>,
}

#[derive(Debug, Serialize)]
pub struct StaffEditContext {
    pub staff: StaffMember,
    pub groups: Vec<Group>,
}

async fn all_groups(pool: &Pool<Sqlite>) -> Result<Vec<Group>, AppError> {
    crate::db::groups::list_groups(pool, &Default::default(), i64::MAX, 0).await
}

#[get("/staffs?<page>&<search>&<group>&<active_status>")]
pub async fn staff_list(
    user: User,
    db: &State<SqlitePool>,
    page: Option<String>,
    search: Option<String>,
    group: Option<String>,
    active_status: Option<bool>,
) -> Result<Json<ListResponse<StaffMember, StaffFilter>>, AppError> {
    let filter = StaffFilter {
        search,
        group,
        active_status,
    };
    let response = crud::list::<StaffResource>(&user, db, filter, page.as_deref()).await?;
    Ok(Json(response))
}

#[get("/staffs/add")]
pub async fn staff_add_context(
    user: User,
    db: &State<SqlitePool>,
) -> Result<Json<StaffFormContext>, AppError> {
    user.require_capability(Entity::Staff.capability(Action::Add))?;
    Ok(Json(StaffFormContext {
        groups: all_groups(db).await?,
    }))
}

#[post("/staffs/add", data = "<form>")]
pub async fn staff_add(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    form: Json<StaffForm>,
) -> CrudResponse {
    crud::create::<StaffResource>(&user, db, mode, form.into_inner()).await
}

#[get("/staffs/<id>/edit")]
pub async fn staff_edit_context(
    user: User,
    db: &State<SqlitePool>,
    id: i64,
) -> Result<Json<StaffEditContext>, AppError> {
    let staff = crud::fetch::<StaffResource>(&user, db, id).await?;
    Ok(Json(StaffEditContext {
        staff,
        groups: all_groups(db).await?,
    }))
}

#[post("/staffs/<id>/edit", data = "<form>")]
pub async fn staff_edit(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
    form: Json<StaffForm>,
) -> CrudResponse {
    crud::update::<StaffResource>(&user, db, mode, id, form.into_inner()).await
}

#[post("/staffs/<id>/delete")]
pub async fn staff_delete(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
) -> CrudResponse {
    crud::delete::<StaffResource>(&user, db, mode, id).await
}
