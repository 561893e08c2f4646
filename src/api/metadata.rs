use rocket::State;
use rocket::serde::json::Json;
use serde::Serialize;
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::auth::{Entity, User};
use crate::crud::{self, CrudResource, CrudResponse, ListResponse, ResponseMode};
use crate::db::AuditContext;
use crate::db::metadata::{
    MetaDataFilter, count_metadata, create_metadata, delete_metadata, get_metadata, list_metadata,
    update_metadata,
};
use crate::error::{AppError, FieldErrors};
use crate::forms::MetaDataForm;
use crate::models::MetaData;

pub struct MetaDataResource;

#[rocket::async_trait]
impl CrudResource for MetaDataResource {
    const ENTITY: Entity = Entity::Metadata;
    const LIST_PATH: &'static str = "/api/metadata";

    type Row = MetaData;
    type Form = MetaDataForm;
    type Filter = MetaDataFilter;

    fn display_name(row: &MetaData) -> String {
        row.key.clone()
    }

    async fn count(pool: &Pool<Sqlite>, filter: &MetaDataFilter) -> Result<i64, AppError> {
        count_metadata(pool, filter).await
    }

    async fn page(
        pool: &Pool<Sqlite>,
        filter: &MetaDataFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MetaData>, AppError> {
        list_metadata(pool, filter, limit, offset).await
    }

    async fn find(pool: &Pool<Sqlite>, id: i64) -> Result<MetaData, AppError> {
        get_metadata(pool, id).await
    }

    async fn preflight(
        _pool: &Pool<Sqlite>,
        _form: &MetaDataForm,
        _exclude_id: Option<i64>,
    ) -> Result<FieldErrors, AppError> {
        Ok(FieldErrors::new())
    }

    async fn insert(
        pool: &Pool<Sqlite>,
        ctx: &AuditContext,
        form: &MetaDataForm,
    ) -> Result<MetaData, AppError> {
        create_metadata(pool, ctx, form).await
    }

    async fn update(
        pool: &Pool<Sqlite>,
        ctx: &AuditContext,
        id: i64,
        form: &MetaDataForm,
    ) -> Result<MetaData, AppError> {
        update_metadata(pool, ctx, id, form).await
    }

    async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
        delete_metadata(pool, id).await
    }
}

#[derive(Debug, Serialize)]
pub struct MetaDataEditContext {
    pub metadata: MetaData,
}

#[get("/metadata?<page>&<search>&<key>&<active_status>")]
pub async fn metadata_list(
    user: User,
    db: &State<SqlitePool>,
    page: Option<String>,
    search: Option<String>,
    key: Option<String>,
    active_status: Option<bool>,
) -> Result<Json<ListResponse<MetaData, MetaDataFilter>>, AppError> {
    let filter = MetaDataFilter {
        search,
        key,
        active_status,
    };
    let response = crud::list::<MetaDataResource>(&user, db, filter, page.as_deref()).await?;
    Ok(Json(response))
}

#[post("/metadata/add", data = "<form>")]
pub async fn metadata_add(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    form: Json<MetaDataForm>,
) -> CrudResponse {
    crud::create::<MetaDataResource>(&user, db, mode, form.into_inner()).await
}

#[get("/metadata/<id>/edit")]
pub async fn metadata_edit_context(
    user: User,
    db: &State<SqlitePool>,
    id: i64,
) -> Result<Json<MetaDataEditContext>, AppError> {
    let metadata = crud::fetch::<MetaDataResource>(&user, db, id).await?;
    Ok(Json(MetaDataEditContext { metadata }))
}

#[post("/metadata/<id>/edit", data = "<form>")]
pub async fn metadata_edit(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
    form: Json<MetaDataForm>,
) -> CrudResponse {
    crud::update::<MetaDataResource>(&user, db, mode, id, form.into_inner()).await
}

#[post("/metadata/<id>/delete")]
pub async fn metadata_delete(
    user: User,
    mode: ResponseMode,
    db: &State<SqlitePool>,
    id: i64,
) -> CrudResponse {
    crud::delete::<MetaDataResource>(&user, db, mode, id).await
}
