use std::collections::HashMap;

use serde::Serialize;
use sqlx::{Pool, QueryBuilder, Sqlite, Transaction};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::forms::GroupForm;
use crate::models::Group;

#[derive(Debug, Default, Clone, Serialize)]
pub struct GroupFilter {
    pub search: Option<String>,
    pub user_count: Option<String>,
    pub has_permissions: Option<bool>,
}

const SELECT_GROUP: &str = "SELECT g.id, g.name, g.created_at, g.updated_at, \
    (SELECT COUNT(*) FROM staff_group_members sgm WHERE sgm.group_id = g.id) AS member_count \
    FROM staff_groups g";

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &GroupFilter) {
    qb.push(" WHERE 1 = 1");

    match filter.user_count.as_deref() {
        Some("empty") => {
            qb.push(" AND (SELECT COUNT(*) FROM staff_group_members sgm WHERE sgm.group_id = g.id) = 0");
        }
        Some("has_users") => {
            qb.push(" AND (SELECT COUNT(*) FROM staff_group_members sgm WHERE sgm.group_id = g.id) > 0");
        }
        _ => {}
    }
    match filter.has_permissions {
        Some(true) => {
            qb.push(" AND EXISTS (SELECT 1 FROM group_permissions gp WHERE gp.group_id = g.id)");
        }
        Some(false) => {
            qb.push(" AND NOT EXISTS (SELECT 1 FROM group_permissions gp WHERE gp.group_id = g.id)");
        }
        None => {}
    }
    if let Some(search) = &filter.search {
        let like = format!("%{}%", search);
        qb.push(" AND g.name LIKE ").push_bind(like);
    }
}

#[instrument(skip(pool))]
pub async fn count_groups(pool: &Pool<Sqlite>, filter: &GroupFilter) -> Result<i64, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM staff_groups g");
    push_filters(&mut qb, filter);

    let count: (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count.0)
}

#[instrument(skip(pool))]
pub async fn list_groups(
    pool: &Pool<Sqlite>,
    filter: &GroupFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Group>, AppError> {
    info!("Listing groups");
    let mut qb = QueryBuilder::<Sqlite>::new(SELECT_GROUP);
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY g.name LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let mut groups: Vec<Group> = qb.build_query_as().fetch_all(pool).await?;
    attach_permissions(pool, &mut groups).await?;
    Ok(groups)
}

#[derive(sqlx::FromRow)]
struct GrantRow {
    group_id: i64,
    capability: String,
}

async fn attach_permissions(pool: &Pool<Sqlite>, groups: &mut [Group]) -> Result<(), AppError> {
    let ids: Vec<i64> = groups.iter().map(|g| g.id).collect();
    if ids.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT group_id, capability FROM group_permissions WHERE group_id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in &ids {
        separated.push_bind(*id);
    }
    qb.push(") ORDER BY capability");

    let rows: Vec<GrantRow> = qb.build_query_as().fetch_all(pool).await?;
    let mut grants: HashMap<i64, Vec<String>> = HashMap::new();
    for row in rows {
        grants.entry(row.group_id).or_default().push(row.capability);
    }

    for group in groups {
        group.permissions = grants.remove(&group.id).unwrap_or_default();
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_group(pool: &Pool<Sqlite>, id: i64) -> Result<Group, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("{} WHERE g.id = ", SELECT_GROUP));
    qb.push_bind(id);

    let row: Option<Group> = qb.build_query_as().fetch_optional(pool).await?;

    match row {
        Some(mut group) => {
            attach_permissions(pool, std::slice::from_mut(&mut group)).await?;
            Ok(group)
        }
        _ => Err(AppError::NotFound(format!("Group with id {} not found", id))),
    }
}

#[instrument(skip(pool))]
pub async fn name_taken(
    pool: &Pool<Sqlite>,
    name: &str,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM staff_groups WHERE name = ? AND id != ?")
            .bind(name)
            .bind(exclude_id.unwrap_or(0))
            .fetch_optional(pool)
            .await?;
    Ok(existing.is_some())
}

/// Ids from `ids` that do not name an existing group.
#[instrument(skip(pool))]
pub async fn missing_ids(pool: &Pool<Sqlite>, ids: &[i64]) -> Result<Vec<i64>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM staff_groups WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    qb.push(")");

    let found: Vec<(i64,)> = qb.build_query_as().fetch_all(pool).await?;
    let found: std::collections::HashSet<i64> = found.into_iter().map(|row| row.0).collect();

    Ok(ids.iter().copied().filter(|id| !found.contains(id)).collect())
}

async fn replace_grants(
    tx: &mut Transaction<'_, Sqlite>,
    group_id: i64,
    capabilities: &[String],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM group_permissions WHERE group_id = ?")
        .bind(group_id)
        .execute(&mut **tx)
        .await?;

    for capability in capabilities {
        sqlx::query("INSERT OR IGNORE INTO group_permissions (group_id, capability) VALUES (?, ?)")
            .bind(group_id)
            .bind(capability)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

#[instrument(skip(pool, form))]
pub async fn create_group(pool: &Pool<Sqlite>, form: &GroupForm) -> Result<Group, AppError> {
    info!("Creating group");
    let mut tx = pool.begin().await?;

    let res = sqlx::query("INSERT INTO staff_groups (name) VALUES (?)")
        .bind(&form.name)
        .execute(&mut *tx)
        .await?;

    let id = res.last_insert_rowid();
    replace_grants(&mut tx, id, &form.permissions).await?;

    tx.commit().await?;
    get_group(pool, id).await
}

#[instrument(skip(pool, form))]
pub async fn update_group(
    pool: &Pool<Sqlite>,
    id: i64,
    form: &GroupForm,
) -> Result<Group, AppError> {
    info!("Updating group");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE staff_groups SET name = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(&form.name)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Group with id {} not found", id)));
    }

    replace_grants(&mut tx, id, &form.permissions).await?;

    tx.commit().await?;
    get_group(pool, id).await
}

#[instrument(skip(pool))]
pub async fn member_count(pool: &Pool<Sqlite>, id: i64) -> Result<i64, AppError> {
    let count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM staff_group_members WHERE group_id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?;
    Ok(count.0)
}

#[instrument(skip(pool))]
pub async fn delete_group(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting group");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM group_permissions WHERE group_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM staff_groups WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
