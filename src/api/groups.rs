use rocket::State;
use rocket::serde::json::Json;
use serde::Serialize;
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::auth::{Action, Entity, User, permissions};
use crate::crud::{self, CrudResource, CrudResponse, ListResponse, ResponseMode};
use crate::db::AuditContext;
use crate::db::groups::{
    GroupFilter, count_groups, create_group, delete_group, get_group, list_groups, name_taken,
    update_group,
};
use crate::error::{AppError, FieldErrors, field_error, merge_field_errors};
use crate::forms::GroupForm;
use crate::models::Group;

pub struct GroupResource;

#[rocket::async_trait]
impl CrudResource for GroupResource {
    const ENTITY: Entity = Entity::Group;
    const LIST_PATH: &'static str = "/api/groups";

    type Row = Group;
    type Form = GroupForm;
    type Filter = GroupFilter;

    fn display_name(row: &Group) -> String {
        row.name.clone()
    }

    async fn count(pool: &Pool<Sqlite>, filter: &GroupFilter) -> Result<i64, AppError> {
        count_groups(pool, filter).await
    }

    async fn page(
        pool: &Pool<Sqlite>,
        filter: &GroupFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Group>, AppError> {
        list_groups(pool, filter, limit, offset).await
    }

    async fn find(pool: &Pool<Sqlite>, id: i64) -> Result<Group, AppError> {
        get_group(pool, id).await
    }

    async fn preflight(
        pool: &Pool<Sqlite>,
        form: &GroupForm,
        exclude_id: Option<i64>,
    ) -> Result<FieldErrors, AppError> {
        let mut errors = FieldErrors::new();
        if name_taken(pool, &form.name, exclude_id).await? {
            merge_field_errors(
                &mut errors,
                field_error("name", "A group with that name already exists."),
            );
        }
        Ok(errors)
    }

    async fn insert(
        pool: &Pool<Sqlite>,
        _ctx: &AuditContext,
        form: &GroupForm,
    ) -> Result<Group, AppError> {
        create_group(pool, form).await
    }

    async fn update(
        pool: &Pool<Sqlite>,
        _ctx: &AuditContext,
        id: i64,
        form: &GroupForm,
    ) -> Result<Group, AppError> {
        update_group(pool, id, form).await
    }

    /// A group with members cannot be deleted; the refusal carries the
    /// member count so the operator knows what to clean up.
    async fn can_delete(_pool: &Pool<Sqlite>, _actor: &User, row: &Group) -> Result<(), String> {
        if row.member_count > 0 {
            return Err(format!(
                "Cannot delete group '{}' because it has {} associated user(s). \
                 Please remove all users from this group before deleting.",
                row.name, row.member_count
            ));
        }
        Ok(())
    }

    async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
        delete_group(pool, id).await
    }
}

#[derive(Debug, Serialize)]
pub struct GroupFormContext {
    pub permission_list: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct GroupEditContext {
    pub group: Group,
    pub permission_list: Vec<&'static str>,
}

#[get("/groups?<page>&<search>&<user_count>&<has_permissions>")]
pub async fn group_list(
    user: User,
    db: &State<SqlitePool>,
    page: Option<String>,
    search: Option<String>,
    user_count: Option<String>,
    has_permissions: Option<bool>,
) -> Result<Json<ListResponse<Group, GroupFilter>>, AppError> {
    let filter = GroupFilter {
        search,
        user_count,
        has_permissions,
    };
    let response = crud::list::<GroupResource>(&user, db, filter, page.as_deref()).await?;
    Ok(Json(response))
}

#[get("/groups/add")]
pub async fn group_add_context(user: User) -> Result<Json<GroupFormContext>, AppError> {
    user.require_capability(Entity::Group.capability(Action::Add))?;
    Ok(Json(GroupFormContext {
        permission_list: permissions::registry(),
    }))
}

#[post("/groups/add", data = "<form>")]
pub async fn group_add(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    form: Json<GroupForm>,
) -> CrudResponse {
    crud::create::<GroupResource>(&user, db, mode, form.into_inner()).await
}

#[get("/groups/<id>/edit")]
pub async fn group_edit_context(
    user: User,
    db: &State<SqlitePool>,
    id: i64,
) -> Result<Json<GroupEditContext>, AppError> {
    let group = crud::fetch::<GroupResource>(&user, db, id).await?;
    Ok(Json(GroupEditContext {
        group,
        permission_list: permissions::registry(),
    }))
}

#[post("/groups/<id>/edit", data = "<form>")]
pub async fn group_edit(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
    form: Json<GroupForm>,
) -> CrudResponse {
    crud::update::<GroupResource>(&user, db, mode, id, form.into_inner()).await
}

#[post("/groups/<id>/delete")]
pub async fn group_delete(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
) -> CrudResponse {
    crud::delete::<GroupResource>(&user, db, mode, id).await
}
