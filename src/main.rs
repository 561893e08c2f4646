#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod crud;
mod db;
mod env;
mod error;
mod forms;
mod models;
mod navigation;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use rocket::{Build, Rocket, tokio};
use sqlx::SqlitePool;
use tracing::{error, info};

use auth::{forbidden_api, permissions, unauthorized_api};
use db::sessions::clean_expired_sessions;
use telemetry::TelemetryFairing;
use telemetry::init_tracing;

#[launch]
async fn rocket() -> _ {
    let _ = env::load_environment();
    init_tracing();

    permissions::validate_registry().expect("Capability registry failed validation");

    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting student registry");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api::auth::api_login,
                api::auth::api_logout,
                api::auth::api_me,
                api::auth::api_me_unauthorized,
                api::auth::health,
                api::dashboard::dashboard,
                api::navigation::navigation_menu,
                api::staff::staff_list,
                api::staff::staff_add_context,
                api::staff::staff_add,
                api::staff::staff_edit_context,
                api::staff::staff_edit,
                api::staff::staff_delete,
                api::groups::group_list,
                api::groups::group_add_context,
                api::groups::group_add,
                api::groups::group_edit_context,
                api::groups::group_edit,
                api::groups::group_delete,
                api::students::student_list,
                api::students::student_add_context,
                api::students::student_add,
                api::students::student_edit_context,
                api::students::student_edit,
                api::students::student_delete,
                api::instructors::instructor_list,
                api::instructors::instructor_add_context,
                api::instructors::instructor_add,
                api::instructors::instructor_edit_context,
                api::instructors::instructor_edit,
                api::instructors::instructor_delete,
                api::courses::course_list,
                api::courses::course_add_context,
                api::courses::course_add,
                api::courses::course_edit_context,
                api::courses::course_edit,
                api::courses::course_delete,
                api::enrollments::enrollment_list,
                api::enrollments::enrollment_add_context,
                api::enrollments::enrollment_add,
                api::enrollments::enrollment_edit_context,
                api::enrollments::enrollment_edit,
                api::enrollments::enrollment_delete,
                api::enrollments::enrollment_check,
                api::metadata::metadata_list,
                api::metadata::metadata_add,
                api::metadata::metadata_edit_context,
                api::metadata::metadata_edit,
                api::metadata::metadata_delete,
                api::toggle::toggle_field,
            ],
        )
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .attach(TelemetryFairing)
}
