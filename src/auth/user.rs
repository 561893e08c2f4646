use std::collections::HashSet;

use serde::Serialize;

use crate::db::AuditContext;
use crate::error::AppError;

/// The authenticated principal, with its group capability grants loaded
/// fresh for the current request. Group membership can change between
/// requests, so nothing here is cached across requests.
#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub groups: Vec<String>,
    #[serde(skip)]
    pub capabilities: HashSet<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim().to_string();
        if name.is_empty() {
            self.username.clone()
        } else {
            name
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        if self.is_superuser {
            return true;
        }
        self.capabilities.contains(capability)
    }

    pub fn require_capability(&self, capability: &str) -> Result<(), AppError> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            tracing::warn!(
                username = %self.username,
                capability = %capability,
                "Permission denied"
            );
            Err(AppError::Authorization(format!(
                "Missing capability: {}",
                capability
            )))
        }
    }

    /// Audit context stamped into created_by/updated_by on every write.
    pub fn audit(&self) -> AuditContext {
        AuditContext { actor_id: self.id }
    }

    pub fn role_display(&self) -> String {
        if self.is_superuser {
            "Super Admin".to_string()
        } else if let Some(group) = self.groups.first() {
            group.clone()
        } else if self.is_staff {
            "Staff".to_string()
        } else {
            "User".to_string()
        }
    }
}
