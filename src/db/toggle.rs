use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;

/// Flips one boolean column on one row inside a transaction. The flip is a
/// single `SET field = NOT field` statement, so two racing toggles cannot
/// both observe the same starting value and lose an update.
///
/// `table`, `field` and `display_column` come from the compile-time toggle
/// allow-list, never from the request.
#[instrument(skip(pool))]
pub async fn toggle_boolean_field(
    pool: &Pool<Sqlite>,
    table: &str,
    field: &str,
    display_column: &str,
    id: i64,
) -> Result<(bool, String), AppError> {
    info!("Toggling boolean field");
    let mut tx = pool.begin().await?;

    let row: Option<(String,)> = sqlx::query_as(&format!(
        "SELECT CAST({display_column} AS TEXT) FROM {table} WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((display_name,)) = row else {
        return Err(AppError::NotFound(format!(
            "{} with id {} not found",
            table, id
        )));
    };

    sqlx::query(&format!(
        "UPDATE {table} SET {field} = NOT {field}, updated_at = CURRENT_TIMESTAMP WHERE id = ?"
    ))
    .bind(id)
    .execute(&mut *tx)
    .await?;

    let (new_value,): (bool,) =
        sqlx::query_as(&format!("SELECT {field} FROM {table} WHERE id = ?"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

    tx.commit().await?;
    Ok((new_value, display_name))
}
