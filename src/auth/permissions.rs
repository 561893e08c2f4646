use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

use crate::error::AppError;

/// Capability granted for the dashboard landing page. It has no CRUD entity
/// behind it, so it lives outside the `Entity` table.
pub const DASHBOARD_VIEW: &str = "accounts.view_dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Add,
    Change,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Staff,
    Group,
    Student,
    Instructor,
    Course,
    Enrollment,
    Metadata,
}

impl Entity {
    /// Every capability code is spelled out rather than assembled with
    /// `format!`, so a typo is caught by `validate_registry` at boot instead
    /// of producing a permanently-unreachable permission check.
    pub const fn capability(self, action: Action) -> &'static str {
        match (self, action) {
            (Entity::Staff, Action::View) => "accounts.view_staff",
            (Entity::Staff, Action::Add) => "accounts.add_staff",
            (Entity::Staff, Action::Change) => "accounts.change_staff",
            (Entity::Staff, Action::Delete) => "accounts.delete_staff",

            (Entity::Group, Action::View) => "accounts.view_group",
            (Entity::Group, Action::Add) => "accounts.add_group",
            (Entity::Group, Action::Change) => "accounts.change_group",
            (Entity::Group, Action::Delete) => "accounts.delete_group",

            (Entity::Student, Action::View) => "students.view_student",
            (Entity::Student, Action::Add) => "students.add_student",
            (Entity::Student, Action::Change) => "students.change_student",
            (Entity::Student, Action::Delete) => "students.delete_student",

            (Entity::Instructor, Action::View) => "students.view_instructor",
            (Entity::Instructor, Action::Add) => "students.add_instructor",
            (Entity::Instructor, Action::Change) => "students.change_instructor",
            (Entity::Instructor, Action::Delete) => "students.delete_instructor",

            (Entity::Course, Action::View) => "students.view_course",
            (Entity::Course, Action::Add) => "students.add_course",
            (Entity::Course, Action::Change) => "students.change_course",
            (Entity::Course, Action::Delete) => "students.delete_course",

            (Entity::Enrollment, Action::View) => "students.view_enrollment",
            (Entity::Enrollment, Action::Add) => "students.add_enrollment",
            (Entity::Enrollment, Action::Change) => "students.change_enrollment",
            (Entity::Enrollment, Action::Delete) => "students.delete_enrollment",

            (Entity::Metadata, Action::View) => "students.view_metadata",
            (Entity::Metadata, Action::Add) => "students.add_metadata",
            (Entity::Metadata, Action::Change) => "students.change_metadata",
            (Entity::Metadata, Action::Delete) => "students.delete_metadata",
        }
    }

    pub fn verbose_name(self) -> &'static str {
        match self {
            Entity::Staff => "staff member",
            Entity::Group => "group",
            Entity::Student => "student",
            Entity::Instructor => "instructor",
            Entity::Course => "course",
            Entity::Enrollment => "enrollment",
            Entity::Metadata => "metadata",
        }
    }

    pub const ALL: [Entity; 7] = [
        Entity::Staff,
        Entity::Group,
        Entity::Student,
        Entity::Instructor,
        Entity::Course,
        Entity::Enrollment,
        Entity::Metadata,
    ];
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Add, Action::Change, Action::Delete];
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verbose_name())
    }
}

static CAPABILITY_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+\.[a-z]+_[a-z]+$").unwrap());

/// All known capability codes, in a stable order.
pub fn registry() -> Vec<&'static str> {
    let mut codes = vec![DASHBOARD_VIEW];
    for entity in Entity::ALL {
        for action in Action::ALL {
            codes.push(entity.capability(action));
        }
    }
    codes
}

pub fn is_known_capability(code: &str) -> bool {
    registry().iter().any(|known| *known == code)
}

/// Sanity-checks the capability table. Called once at startup; a failure
/// here means the table itself is wrong and the process should not serve.
pub fn validate_registry() -> Result<(), AppError> {
    let codes = registry();
    let mut seen = HashSet::new();

    for code in &codes {
        if !CAPABILITY_FORMAT.is_match(code) {
            return Err(AppError::Internal(format!(
                "Malformed capability code in registry: {}",
                code
            )));
        }
        if !seen.insert(*code) {
            return Err(AppError::Internal(format!(
                "Duplicate capability code in registry: {}",
                code
            )));
        }
    }

    Ok(())
}
