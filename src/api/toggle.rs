use rocket::State;
use rocket::serde::json::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::auth::{Action, Entity, User};
use crate::db::toggle::toggle_boolean_field;
use crate::error::AppError;

/// Which (entity, field) pairs may be toggled, and under which capability.
/// Anything not listed here is rejected before any lookup happens.
pub struct ToggleRule {
    pub entity: &'static str,
    pub table: &'static str,
    pub fields: &'static [&'static str],
    pub capability: &'static str,
    pub display_column: &'static str,
}

pub const ALLOWED_TOGGLES: &[ToggleRule] = &[
    ToggleRule {
        entity: "staff",
        table: "users",
        fields: &["is_active"],
        capability: Entity::Staff.capability(Action::Change),
        display_column: "username",
    },
    ToggleRule {
        entity: "student",
        table: "students",
        fields: &["is_active"],
        capability: Entity::Student.capability(Action::Change),
        display_column: "first_name",
    },
    ToggleRule {
        entity: "instructor",
        table: "instructors",
        fields: &["is_active"],
        capability: Entity::Instructor.capability(Action::Change),
        display_column: "first_name",
    },
    ToggleRule {
        entity: "course",
        table: "courses",
        fields: &["is_active"],
        capability: Entity::Course.capability(Action::Change),
        display_column: "name",
    },
    ToggleRule {
        entity: "enrollment",
        table: "enrollments",
        fields: &["is_active"],
        capability: Entity::Enrollment.capability(Action::Change),
        display_column: "id",
    },
    ToggleRule {
        entity: "metadata",
        table: "metadata",
        fields: &["is_active"],
        capability: Entity::Metadata.capability(Action::Change),
        display_column: "key",
    },
];

pub fn find_rule(entity: &str, field: &str) -> Option<&'static ToggleRule> {
    ALLOWED_TOGGLES
        .iter()
        .find(|rule| rule.entity == entity && rule.fields.contains(&field))
}

#[derive(Debug, Serialize)]
pub struct TogglePayload {
    pub success: bool,
    pub message: String,
    pub is_active: bool,
    pub display_name: String,
    pub model_name: String,
    pub instance_id: i64,
}

#[post("/toggle/<entity>/<id>?<field>")]
pub async fn toggle_field(
    user: User,
    db: &State<SqlitePool>,
    entity: &str,
    id: i64,
    field: Option<&str>,
) -> Result<Json<TogglePayload>, AppError> {
    let field = field.unwrap_or("is_active");

    let rule = find_rule(entity, field).ok_or_else(|| {
        AppError::Authorization(format!("Toggle not allowed for {}.{}", entity, field))
    })?;

    // Object-level permission hook; currently identical to the type-level
    // check.
    user.require_capability(rule.capability)?;

    let (new_value, raw_display) =
        toggle_boolean_field(db, rule.table, field, rule.display_column, id).await?;

    let display_name = if rule.display_column == "id" {
        format!("{} #{}", entity, id)
    } else {
        raw_display
    };

    let action = if new_value { "activated" } else { "deactivated" };
    info!(
        username = %user.username,
        entity = %entity,
        instance_id = %id,
        "{} {} {}",
        user.username,
        action,
        display_name
    );

    Ok(Json(TogglePayload {
        success: true,
        message: format!("{} has been {} successfully!", display_name, action),
        is_active: new_value,
        display_name,
        model_name: entity.to_string(),
        instance_id: id,
    }))
}
