use rocket::serde::json::Json;
use serde::Serialize;

use crate::auth::User;
use crate::navigation::{NavItem, visible_menu};

#[derive(Debug, Serialize)]
pub struct NavigationResponse {
    pub menu: Vec<NavItem>,
    pub role_display: String,
}

/// The sidebar as the current principal sees it. `path` is the page the UI
/// is on, used to mark the active branch.
#[get("/navigation?<path>")]
pub async fn navigation_menu(user: User, path: Option<String>) -> Json<NavigationResponse> {
    let menu = visible_menu(&user, path.as_deref().unwrap_or(""));
    Json(NavigationResponse {
        menu,
        role_display: user.role_display(),
    })
}
