use chrono::Utc;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::Redirect;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::auth::{User, UserSession};
use crate::db::sessions::{create_user_session, invalidate_session};
use crate::db::staff::authenticate_user;
use crate::error::AppError;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
    pub redirect_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_superuser: bool,
    pub groups: Vec<String>,
}

impl From<&User> for UserData {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name(),
            role: user.role_display(),
            is_superuser: user.is_superuser,
            groups: user.groups.clone(),
        }
    }
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<SqlitePool>,
) -> Result<Json<LoginResponse>, AppError> {
    let request = login.into_inner();
    info!(username = %request.username, "Login attempt");

    match authenticate_user(db, &request.username, &request.password).await? {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(UserSession::TTL_HOURS);

            create_user_session(db, user.id, &token, expires_at.naive_utc()).await?;

            cookies.add_private(
                Cookie::build(("session_token", token))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(UserSession::TTL_HOURS)),
            );
            cookies.add_private(
                Cookie::build(("user_id", user.id.to_string()))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(UserSession::TTL_HOURS)),
            );
            cookies.add_private(
                Cookie::build(("logged_in", user.username.clone()))
                    .same_site(SameSite::Lax)
                    .max_age(rocket::time::Duration::hours(UserSession::TTL_HOURS)),
            );

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(&user)),
                error: None,
                redirect_url: Some("/ui/dashboard".to_string()),
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid username or password".to_string()),
            redirect_url: None,
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, db: &State<SqlitePool>) -> Redirect {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    cookies.remove_private(Cookie::build("session_token"));
    cookies.remove_private(Cookie::build("user_id"));
    cookies.remove_private(Cookie::build("logged_in"));

    Redirect::to("/ui/")
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(&user))
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
