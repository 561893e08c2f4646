use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sqlx::{Pool, QueryBuilder, Sqlite, Transaction};
use tracing::{info, instrument};

use crate::auth::User;
use crate::error::AppError;
use crate::forms::StaffForm;
use crate::models::StaffMember;

#[derive(Debug, Default, Clone, Serialize)]
pub struct StaffFilter {
    pub search: Option<String>,
    pub group: Option<String>,
    pub active_status: Option<bool>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &StaffFilter) {
    qb.push(" LEFT JOIN staff_group_members sgm ON sgm.user_id = u.id");
    qb.push(" LEFT JOIN staff_groups g ON g.id = sgm.group_id");
    qb.push(" WHERE u.is_staff = TRUE");

    if let Some(group) = &filter.group {
        qb.push(" AND g.name = ").push_bind(group.clone());
    }
    if let Some(active) = filter.active_status {
        qb.push(" AND u.is_active = ").push_bind(active);
    }
    if let Some(search) = &filter.search {
        let like = format!("%{}%", search);
        qb.push(" AND (u.first_name LIKE ").push_bind(like.clone());
        qb.push(" OR u.last_name LIKE ").push_bind(like.clone());
        qb.push(" OR u.username LIKE ").push_bind(like.clone());
        qb.push(" OR u.email LIKE ").push_bind(like);
        qb.push(")");
    }
}

#[instrument(skip(pool))]
pub async fn count_staff(pool: &Pool<Sqlite>, filter: &StaffFilter) -> Result<i64, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(DISTINCT u.id) FROM users u");
    push_filters(&mut qb, filter);

    let count: (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count.0)
}

#[instrument(skip(pool))]
pub async fn list_staff(
    pool: &Pool<Sqlite>,
    filter: &StaffFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<StaffMember>, AppError> {
    info!("Listing staff");
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT DISTINCT u.id, u.username, u.email, u.first_name, u.last_name, \
         u.is_active, u.is_superuser, u.created_at, u.updated_at FROM users u",
    );
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY u.created_at DESC, u.id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let mut members: Vec<StaffMember> = qb.build_query_as().fetch_all(pool).await?;
    attach_groups(pool, &mut members).await?;
    Ok(members)
}

#[derive(sqlx::FromRow)]
struct GroupNameRow {
    user_id: i64,
    name: String,
}

async fn attach_groups(pool: &Pool<Sqlite>, members: &mut [StaffMember]) -> Result<(), AppError> {
    let ids: Vec<i64> = members.iter().map(|m| m.id).collect();
    if ids.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT sgm.user_id, g.name FROM staff_group_members sgm \
         JOIN staff_groups g ON g.id = sgm.group_id WHERE sgm.user_id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in &ids {
        separated.push_bind(*id);
    }
    qb.push(") ORDER BY g.name");

    let rows: Vec<GroupNameRow> = qb.build_query_as().fetch_all(pool).await?;
    let mut names: HashMap<i64, Vec<String>> = HashMap::new();
    for row in rows {
        names.entry(row.user_id).or_default().push(row.name);
    }

    for member in members {
        member.groups = names.remove(&member.id).unwrap_or_default();
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_staff_member(pool: &Pool<Sqlite>, id: i64) -> Result<StaffMember, AppError> {
    let row: Option<StaffMember> = sqlx::query_as(
        "SELECT id, username, email, first_name, last_name, is_active, is_superuser, \
         created_at, updated_at FROM users WHERE id = ? AND is_staff = TRUE",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(mut member) => {
            attach_groups(pool, std::slice::from_mut(&mut member)).await?;
            Ok(member)
        }
        _ => Err(AppError::NotFound(format!(
            "Staff member with id {} not found",
            id
        ))),
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    is_active: bool,
    is_staff: bool,
    is_superuser: bool,
}

/// Loads a principal together with its group names and capability grants.
/// Called from the request guard on every request; group membership changes
/// take effect on the next request.
#[instrument(skip(pool))]
pub async fn get_user_with_grants(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    let row: Option<UserRow> = sqlx::query_as(
        "SELECT id, username, email, first_name, last_name, is_active, is_staff, is_superuser \
         FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(AppError::NotFound(format!("User with id {} not found", id)));
    };

    let groups: Vec<(String,)> = sqlx::query_as(
        "SELECT g.name FROM staff_groups g \
         JOIN staff_group_members sgm ON sgm.group_id = g.id \
         WHERE sgm.user_id = ? ORDER BY g.name",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let capabilities: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT gp.capability FROM group_permissions gp \
         JOIN staff_group_members sgm ON sgm.group_id = gp.group_id \
         WHERE sgm.user_id = ?",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(User {
        id: row.id,
        username: row.username,
        email: row.email,
        first_name: row.first_name,
        last_name: row.last_name,
        is_active: row.is_active,
        is_staff: row.is_staff,
        is_superuser: row.is_superuser,
        groups: groups.into_iter().map(|g| g.0).collect(),
        capabilities: capabilities.into_iter().map(|c| c.0).collect::<HashSet<_>>(),
    })
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row: Option<(i64, String)> = sqlx::query_as(
        "SELECT id, password FROM users WHERE username = ? AND is_active = TRUE",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((id, hash)) => match bcrypt::verify(password, &hash) {
            Ok(true) => Ok(Some(get_user_with_grants(pool, id).await?)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[instrument(skip(pool))]
pub async fn username_taken(
    pool: &Pool<Sqlite>,
    username: &str,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = ? AND id != ?")
            .bind(username)
            .bind(exclude_id.unwrap_or(0))
            .fetch_optional(pool)
            .await?;
    Ok(existing.is_some())
}

#[instrument(skip(pool))]
pub async fn email_taken(
    pool: &Pool<Sqlite>,
    email: &str,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM users WHERE email = ? AND id != ?")
            .bind(email)
            .bind(exclude_id.unwrap_or(0))
            .fetch_optional(pool)
            .await?;
    Ok(existing.is_some())
}

async fn replace_group_memberships(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    group_ids: &[i64],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM staff_group_members WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    for group_id in group_ids {
        sqlx::query("INSERT OR IGNORE INTO staff_group_members (user_id, group_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(group_id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

#[instrument(skip_all, fields(username = %form.username))]
pub async fn create_staff(pool: &Pool<Sqlite>, form: &StaffForm) -> Result<StaffMember, AppError> {
    info!("Creating staff member");
    let password = form.password.as_deref().unwrap_or_default();
    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO users (username, email, first_name, last_name, password, is_active, is_staff) \
         VALUES (?, ?, ?, ?, ?, TRUE, TRUE)",
    )
    .bind(&form.username)
    .bind(&form.email)
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(&hashed_password)
    .execute(&mut *tx)
    .await?;

    let id = res.last_insert_rowid();
    replace_group_memberships(&mut tx, id, &form.groups).await?;

    tx.commit().await?;
    get_staff_member(pool, id).await
}

#[instrument(skip_all, fields(user_id = %id))]
pub async fn update_staff(
    pool: &Pool<Sqlite>,
    id: i64,
    form: &StaffForm,
) -> Result<StaffMember, AppError> {
    info!("Updating staff member");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE users \
         SET username = ?, email = ?, first_name = ?, last_name = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND is_staff = TRUE",
    )
    .bind(&form.username)
    .bind(&form.email)
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Staff member with id {} not found",
            id
        )));
    }

    // Password only changes when a new one was submitted.
    if let Some(password) = form.password.as_deref().filter(|p| !p.is_empty()) {
        let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(&hashed_password)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    replace_group_memberships(&mut tx, id, &form.groups).await?;

    tx.commit().await?;
    get_staff_member(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_staff(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting staff member");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM staff_group_members WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM user_sessions WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Bootstrap helper for the first account; also used by tests.
#[instrument(skip_all, fields(username))]
pub async fn create_superuser(
    pool: &Pool<Sqlite>,
    username: &str,
    email: &str,
    password: &str,
) -> Result<i64, AppError> {
    info!("Creating superuser");
    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query(
        "INSERT INTO users (username, email, password, is_active, is_staff, is_superuser) \
         VALUES (?, ?, ?, TRUE, TRUE, TRUE)",
    )
    .bind(username)
    .bind(email)
    .bind(&hashed_password)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}
