use chrono::{NaiveDateTime, Utc};
use uuid::Uuid;

/// DB-backed session row. Tokens are opaque and stored in a private cookie.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl UserSession {
    pub const TTL_HOURS: i64 = 8;

    pub fn generate_token() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }
}
