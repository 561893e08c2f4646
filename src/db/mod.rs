pub mod courses;
pub mod enrollments;
pub mod groups;
pub mod instructors;
pub mod metadata;
pub mod sessions;
pub mod staff;
pub mod students;
pub mod toggle;

use std::collections::HashMap;

use sqlx::{Pool, QueryBuilder, Sqlite, Transaction};

use crate::error::AppError;
use crate::models::MetaDataTag;

/// Who is performing the current mutation. Passed explicitly into every
/// create/update call so audit stamping is a pure function of
/// (context, entity) instead of ambient per-thread state.
#[derive(Debug, Clone, Copy)]
pub struct AuditContext {
    pub actor_id: i64,
}

/// Replaces the full membership of a many-to-many link table for one owner
/// row. Must run inside the same transaction as the owner's own write so a
/// failure leaves the previous state intact.
///
/// Table and column names are compile-time constants supplied by callers,
/// never user input.
pub(crate) async fn replace_links(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    owner_col: &str,
    other_col: &str,
    owner_id: i64,
    other_ids: &[i64],
) -> Result<(), AppError> {
    sqlx::query(&format!("DELETE FROM {table} WHERE {owner_col} = ?"))
        .bind(owner_id)
        .execute(&mut **tx)
        .await?;

    for other_id in other_ids {
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {table} ({owner_col}, {other_col}) VALUES (?, ?)"
        ))
        .bind(owner_id)
        .bind(other_id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[derive(sqlx::FromRow)]
struct TagLinkRow {
    owner_id: i64,
    id: i64,
    key: String,
    value: String,
}

/// Loads the metadata tags for a batch of owner rows in one query,
/// grouped by owner id.
pub(crate) async fn tags_by_owner(
    pool: &Pool<Sqlite>,
    link_table: &str,
    owner_col: &str,
    owner_ids: &[i64],
) -> Result<HashMap<i64, Vec<MetaDataTag>>, AppError> {
    if owner_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT l.{owner_col} AS owner_id, m.id, m.key, m.value \
         FROM {link_table} l JOIN metadata m ON m.id = l.metadata_id \
         WHERE l.{owner_col} IN ("
    ));
    let mut separated = qb.separated(", ");
    for owner_id in owner_ids {
        separated.push_bind(*owner_id);
    }
    qb.push(") ORDER BY m.key");

    let rows: Vec<TagLinkRow> = qb.build_query_as().fetch_all(pool).await?;

    let mut grouped: HashMap<i64, Vec<MetaDataTag>> = HashMap::new();
    for row in rows {
        grouped.entry(row.owner_id).or_default().push(MetaDataTag {
            id: row.id,
            key: row.key,
            value: row.value,
        });
    }

    Ok(grouped)
}
