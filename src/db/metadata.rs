use serde::Serialize;
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument};

use crate::db::AuditContext;
use crate::error::AppError;
use crate::forms::MetaDataForm;
use crate::models::{MetaData, MetaDataTag};

#[derive(Debug, Default, Clone, Serialize)]
pub struct MetaDataFilter {
    pub search: Option<String>,
    pub key: Option<String>,
    pub active_status: Option<bool>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &MetaDataFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(key) = &filter.key {
        qb.push(" AND key = ").push_bind(key.clone());
    }
    if let Some(active) = filter.active_status {
        qb.push(" AND is_active = ").push_bind(active);
    }
    if let Some(search) = &filter.search {
        let like = format!("%{}%", search);
        qb.push(" AND (key LIKE ").push_bind(like.clone());
        qb.push(" OR value LIKE ").push_bind(like);
        qb.push(")");
    }
}

#[instrument(skip(pool))]
pub async fn count_metadata(pool: &Pool<Sqlite>, filter: &MetaDataFilter) -> Result<i64, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM metadata");
    push_filters(&mut qb, filter);

    let count: (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count.0)
}

#[instrument(skip(pool))]
pub async fn list_metadata(
    pool: &Pool<Sqlite>,
    filter: &MetaDataFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<MetaData>, AppError> {
    info!("Listing metadata");
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM metadata");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows: Vec<MetaData> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_metadata(pool: &Pool<Sqlite>, id: i64) -> Result<MetaData, AppError> {
    let row: Option<MetaData> = sqlx::query_as("SELECT * FROM metadata WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| AppError::NotFound(format!("Metadata with id {} not found", id)))
}

/// The active tag pool offered by selection widgets.
#[instrument(skip(pool))]
pub async fn active_tags(pool: &Pool<Sqlite>) -> Result<Vec<MetaDataTag>, AppError> {
    let tags: Vec<MetaDataTag> = sqlx::query_as(
        "SELECT id, key, value FROM metadata WHERE is_active = TRUE ORDER BY key",
    )
    .fetch_all(pool)
    .await?;
    Ok(tags)
}

/// Ids from `ids` that do not name an active metadata row.
#[instrument(skip(pool))]
pub async fn missing_active_ids(pool: &Pool<Sqlite>, ids: &[i64]) -> Result<Vec<i64>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id FROM metadata WHERE is_active = TRUE AND id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    qb.push(")");

    let found: Vec<(i64,)> = qb.build_query_as().fetch_all(pool).await?;
    let found: std::collections::HashSet<i64> = found.into_iter().map(|row| row.0).collect();

    Ok(ids.iter().copied().filter(|id| !found.contains(id)).collect())
}

#[instrument(skip(pool, form))]
pub async fn create_metadata(
    pool: &Pool<Sqlite>,
    ctx: &AuditContext,
    form: &MetaDataForm,
) -> Result<MetaData, AppError> {
    info!("Creating metadata");
    let res = sqlx::query(
        "INSERT INTO metadata (key, value, is_active, remarks, created_by, updated_by) \
         VALUES (?, ?, TRUE, ?, ?, ?)",
    )
    .bind(&form.key)
    .bind(&form.value)
    .bind(form.remarks.as_deref())
    .bind(ctx.actor_id)
    .bind(ctx.actor_id)
    .execute(pool)
    .await?;

    get_metadata(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool, form))]
pub async fn update_metadata(
    pool: &Pool<Sqlite>,
    ctx: &AuditContext,
    id: i64,
    form: &MetaDataForm,
) -> Result<MetaData, AppError> {
    info!("Updating metadata");
    let res = sqlx::query(
        "UPDATE metadata \
         SET key = ?, value = ?, remarks = ?, updated_by = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(&form.key)
    .bind(&form.value)
    .bind(form.remarks.as_deref())
    .bind(ctx.actor_id)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Metadata with id {} not found", id)));
    }

    get_metadata(pool, id).await
}

/// Deleting a tag silently detaches it from every entity that referenced it.
#[instrument(skip(pool))]
pub async fn delete_metadata(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting metadata");
    let mut tx = pool.begin().await?;

    for link_table in [
        "student_metadata",
        "instructor_metadata",
        "course_metadata",
        "enrollment_metadata",
    ] {
        sqlx::query(&format!("DELETE FROM {link_table} WHERE metadata_id = ?"))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM metadata WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
