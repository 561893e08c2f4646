use rocket::http::Status;
use rocket::{Request, Responder};
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::response::{Flash, Redirect};
use rocket::serde::json::Json;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Action, Entity, User};
use crate::db::AuditContext;
use crate::error::{AppError, FieldErrors, merge_field_errors};
use crate::forms::EntityForm;
use crate::validation::collect_errors;

pub const DEFAULT_PAGE_SIZE: i64 = 15;

/// One CRUD-managed entity type. The engine below supplies the shared
/// behavior (permission gate, validation pipeline, pagination, messages,
/// response modes); an implementation supplies the entity-specific pieces:
/// queries, uniqueness pre-checks, the delete guard, and display names.
#[rocket::async_trait]
pub trait CrudResource {
    const ENTITY: Entity;
    /// Where the browser is sent after a mutation, and the `redirect_url`
    /// echoed to AJAX callers.
    const LIST_PATH: &'static str;

    type Row: Serialize + Send + Sync;
    type Form: EntityForm + Validate + Send + Sync;
    type Filter: Serialize + Send + Sync;

    fn page_size() -> i64 {
        DEFAULT_PAGE_SIZE
    }

    fn display_name(row: &Self::Row) -> String;

    async fn count(pool: &Pool<Sqlite>, filter: &Self::Filter) -> Result<i64, AppError>;
    async fn page(
        pool: &Pool<Sqlite>,
        filter: &Self::Filter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self::Row>, AppError>;
    async fn find(pool: &Pool<Sqlite>, id: i64) -> Result<Self::Row, AppError>;

    /// Store-backed validation (uniqueness, referential checks) run after
    /// the static form rules. `exclude_id` is the row being edited, so its
    /// own values don't collide with themselves.
    async fn preflight(
        pool: &Pool<Sqlite>,
        form: &Self::Form,
        exclude_id: Option<i64>,
    ) -> Result<FieldErrors, AppError>;

    async fn insert(
        pool: &Pool<Sqlite>,
        ctx: &AuditContext,
        form: &Self::Form,
    ) -> Result<Self::Row, AppError>;
    async fn update(
        pool: &Pool<Sqlite>,
        ctx: &AuditContext,
        id: i64,
        form: &Self::Form,
    ) -> Result<Self::Row, AppError>;

    /// Veto hook consulted before deletion. An `Err` carries the
    /// human-readable reason and nothing is mutated.
    async fn can_delete(
        _pool: &Pool<Sqlite>,
        _actor: &User,
        _row: &Self::Row,
    ) -> Result<(), String> {
        Ok(())
    }

    async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError>;
}

/// How the caller wants mutation outcomes delivered, negotiated from the
/// `X-Requested-With` header the same way the admin UI sends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Json,
    Browser,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ResponseMode {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let mode = match request.headers().get_one("X-Requested-With") {
            Some("XMLHttpRequest") => ResponseMode::Json,
            _ => ResponseMode::Browser,
        };
        Outcome::Success(mode)
    }
}

#[derive(Debug, Serialize)]
pub struct MutationPayload {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

#[derive(Responder)]
pub enum CrudResponse {
    Json(Custom<Json<MutationPayload>>),
    Flash(Flash<Redirect>),
    Error(AppError),
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T: Serialize, F: Serialize> {
    pub items: Vec<T>,
    pub page: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub filters: F,
}

/// Clamps a requested page into range: non-numeric input falls back to the
/// first page, past-the-end input to the last.
pub(crate) fn clamp_page(total_count: i64, page_size: i64, requested: Option<&str>) -> (i64, i64, i64) {
    let total_pages = ((total_count + page_size - 1) / page_size).max(1);
    let requested = requested.and_then(|p| p.parse::<i64>().ok()).unwrap_or(1);
    let page = requested.clamp(1, total_pages);
    (page, total_pages, (page - 1) * page_size)
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub async fn list<R: CrudResource>(
    user: &User,
    pool: &Pool<Sqlite>,
    filter: R::Filter,
    page: Option<&str>,
) -> Result<ListResponse<R::Row, R::Filter>, AppError> {
    // The gate runs before any store access.
    user.require_capability(R::ENTITY.capability(Action::View))?;

    let total_count = R::count(pool, &filter).await?;
    let (page, total_pages, offset) = clamp_page(total_count, R::page_size(), page);
    let items = R::page(pool, &filter, R::page_size(), offset).await?;

    Ok(ListResponse {
        items,
        page,
        total_pages,
        total_count,
        has_next: page < total_pages,
        has_previous: page > 1,
        filters: filter,
    })
}

/// Row fetch for the edit form, gated on the change capability.
pub async fn fetch<R: CrudResource>(
    user: &User,
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<R::Row, AppError> {
    user.require_capability(R::ENTITY.capability(Action::Change))?;
    R::find(pool, id).await
}

pub async fn create<R: CrudResource>(
    user: &User,
    pool: &Pool<Sqlite>,
    mode: ResponseMode,
    mut form: R::Form,
) -> CrudResponse {
    if let Err(err) = user.require_capability(R::ENTITY.capability(Action::Add)) {
        return CrudResponse::Error(err);
    }

    form.normalize();
    let mut errors = collect_errors(&form);
    merge_field_errors(&mut errors, form.clean());
    match R::preflight(pool, &form, None).await {
        Ok(store_errors) => merge_field_errors(&mut errors, store_errors),
        Err(err) => return failure::<R>(mode, err),
    }
    if !errors.is_empty() {
        return invalid::<R>(mode, errors);
    }

    match R::insert(pool, &user.audit(), &form).await {
        Ok(row) => {
            let message = format!(
                "{} '{}' added successfully!",
                capitalize(R::ENTITY.verbose_name()),
                R::display_name(&row)
            );
            success::<R>(mode, Status::Created, message)
        }
        Err(err) => failure::<R>(mode, err),
    }
}

pub async fn update<R: CrudResource>(
    user: &User,
    pool: &Pool<Sqlite>,
    mode: ResponseMode,
    id: i64,
    mut form: R::Form,
) -> CrudResponse {
    if let Err(err) = user.require_capability(R::ENTITY.capability(Action::Change)) {
        return CrudResponse::Error(err);
    }

    if let Err(err) = R::find(pool, id).await {
        return CrudResponse::Error(err);
    }

    form.normalize();
    let mut errors = collect_errors(&form);
    merge_field_errors(&mut errors, form.clean());
    match R::preflight(pool, &form, Some(id)).await {
        Ok(store_errors) => merge_field_errors(&mut errors, store_errors),
        Err(err) => return failure::<R>(mode, err),
    }
    if !errors.is_empty() {
        return invalid::<R>(mode, errors);
    }

    match R::update(pool, &user.audit(), id, &form).await {
        Ok(row) => {
            let message = format!(
                "{} '{}' updated successfully!",
                capitalize(R::ENTITY.verbose_name()),
                R::display_name(&row)
            );
            success::<R>(mode, Status::Ok, message)
        }
        Err(err) => failure::<R>(mode, err),
    }
}

pub async fn delete<R: CrudResource + Send>(
    user: &User,
    pool: &Pool<Sqlite>,
    mode: ResponseMode,
    id: i64,
) -> CrudResponse {
    if let Err(err) = user.require_capability(R::ENTITY.capability(Action::Delete)) {
        return CrudResponse::Error(err);
    }

    let row = match R::find(pool, id).await {
        Ok(row) => row,
        Err(err) => return CrudResponse::Error(err),
    };

    if let Err(reason) = R::can_delete(pool, user, &row).await {
        return veto::<R>(mode, reason);
    }

    let display_name = R::display_name(&row);
    match R::delete(pool, id).await {
        Ok(()) => {
            let message = format!(
                "{} '{}' deleted successfully!",
                capitalize(R::ENTITY.verbose_name()),
                display_name
            );
            success::<R>(mode, Status::Ok, message)
        }
        Err(err) => failure::<R>(mode, err),
    }
}

fn success<R: CrudResource>(mode: ResponseMode, status: Status, message: String) -> CrudResponse {
    match mode {
        ResponseMode::Json => CrudResponse::Json(Custom(
            status,
            Json(MutationPayload {
                success: true,
                message: Some(message),
                errors: None,
                redirect_url: Some(R::LIST_PATH.to_string()),
            }),
        )),
        ResponseMode::Browser => {
            CrudResponse::Flash(Flash::success(Redirect::to(R::LIST_PATH), message))
        }
    }
}

fn invalid<R: CrudResource>(mode: ResponseMode, errors: FieldErrors) -> CrudResponse {
    match mode {
        ResponseMode::Json => CrudResponse::Json(Custom(
            Status::BadRequest,
            Json(MutationPayload {
                success: false,
                message: Some("Please correct the errors below.".to_string()),
                errors: Some(errors),
                redirect_url: None,
            }),
        )),
        ResponseMode::Browser => CrudResponse::Flash(Flash::error(
            Redirect::to(R::LIST_PATH),
            "Please correct the errors below.".to_string(),
        )),
    }
}

fn veto<R: CrudResource>(mode: ResponseMode, reason: String) -> CrudResponse {
    match mode {
        ResponseMode::Json => CrudResponse::Json(Custom(
            Status::BadRequest,
            Json(MutationPayload {
                success: false,
                message: Some(reason),
                errors: None,
                redirect_url: None,
            }),
        )),
        ResponseMode::Browser => {
            CrudResponse::Flash(Flash::error(Redirect::to(R::LIST_PATH), reason))
        }
    }
}

fn failure<R: CrudResource>(mode: ResponseMode, err: AppError) -> CrudResponse {
    err.log_and_record(&format!("{} mutation", R::ENTITY.verbose_name()));
    match mode {
        ResponseMode::Json => CrudResponse::Json(Custom(
            err.status_code(),
            Json(MutationPayload {
                success: false,
                message: Some(err.public_message()),
                errors: None,
                redirect_url: None,
            }),
        )),
        ResponseMode::Browser => CrudResponse::Flash(Flash::error(
            Redirect::to(R::LIST_PATH),
            err.public_message(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::clamp_page;

    #[test]
    fn page_defaults_to_first() {
        assert_eq!(clamp_page(100, 15, None), (1, 7, 0));
    }

    #[test]
    fn non_numeric_page_falls_back_to_first() {
        assert_eq!(clamp_page(100, 15, Some("abc")), (1, 7, 0));
    }

    #[test]
    fn past_the_end_page_clamps_to_last() {
        assert_eq!(clamp_page(100, 15, Some("99")), (7, 7, 90));
    }

    #[test]
    fn negative_page_clamps_to_first() {
        assert_eq!(clamp_page(100, 15, Some("-3")), (1, 7, 0));
    }

    #[test]
    fn empty_result_set_still_has_one_page() {
        assert_eq!(clamp_page(0, 15, Some("5")), (1, 1, 0));
    }

    #[test]
    fn exact_multiple_has_no_phantom_page() {
        assert_eq!(clamp_page(30, 15, Some("2")), (2, 2, 15));
    }
}
