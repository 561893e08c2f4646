use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use validator::Validate;

use crate::auth::permissions;
use crate::error::FieldErrors;
use crate::models::Grade;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z\s'-]+$").unwrap());
static COURSE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2,4}\d{3,4}$").unwrap());
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").unwrap());

/// Form payloads go through three validation steps before any write:
/// the `validator` derive rules, `normalize`, then `clean` for the checks
/// the derive can't express. Uniqueness pre-checks live in the per-entity
/// resource, next to the store.
pub trait EntityForm {
    fn normalize(&mut self) {}

    fn clean(&self) -> FieldErrors {
        FieldErrors::new()
    }
}

fn push_error(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn check_person_name(errors: &mut FieldErrors, field: &str, value: &str) {
    if !value.is_empty() && !NAME_RE.is_match(value) {
        push_error(
            errors,
            field,
            "Name can only contain letters, spaces, hyphens, and apostrophes.",
        );
    }
}

fn check_birth_date(errors: &mut FieldErrors, date_of_birth: NaiveDate) {
    let today = Utc::now().date_naive();
    if date_of_birth > today {
        push_error(errors, "date_of_birth", "Date of birth cannot be in the future.");
        return;
    }
    let age_days = (today - date_of_birth).num_days();
    if age_days as f64 / 365.25 > 100.0 {
        push_error(errors, "date_of_birth", "Please enter a valid date of birth.");
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StudentForm {
    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters."))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters."))]
    pub last_name: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub metadata: Vec<i64>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl EntityForm for StudentForm {
    fn normalize(&mut self) {
        self.first_name = title_case(self.first_name.trim());
        self.last_name = title_case(self.last_name.trim());
        self.email = self.email.trim().to_lowercase();
    }

    fn clean(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check_person_name(&mut errors, "first_name", &self.first_name);
        check_person_name(&mut errors, "last_name", &self.last_name);
        check_birth_date(&mut errors, self.date_of_birth);
        errors
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InstructorForm {
    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters."))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters."))]
    pub last_name: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(max = 15, message = "Phone number cannot exceed 15 characters."))]
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub courses: Vec<i64>,
    #[serde(default)]
    pub metadata: Vec<i64>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl EntityForm for InstructorForm {
    fn normalize(&mut self) {
        self.first_name = title_case(self.first_name.trim());
        self.last_name = title_case(self.last_name.trim());
        self.email = self.email.trim().to_lowercase();
        self.phone_number = self.phone_number.trim().to_string();
    }

    fn clean(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check_person_name(&mut errors, "first_name", &self.first_name);
        check_person_name(&mut errors, "last_name", &self.last_name);
        errors
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CourseForm {
    #[validate(length(min = 3, max = 200, message = "Course name must be 3-200 characters."))]
    pub name: String,
    pub course_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Vec<i64>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl EntityForm for CourseForm {
    /// Case policy: codes are upper-cased before the format check, so
    /// `cs101` is accepted as `CS101`.
    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.course_code = self.course_code.trim().to_uppercase();
        self.description = self.description.trim().to_string();
    }

    fn clean(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if !COURSE_CODE_RE.is_match(&self.course_code) {
            push_error(
                &mut errors,
                "course_code",
                "Course code must be in format CS101 or MATH1001 (2-4 letters followed by 3-4 digits).",
            );
        }
        errors
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnrollmentForm {
    pub student: i64,
    pub course: i64,
    #[serde(default)]
    pub grade: Option<String>,
    #[validate(range(min = 0.0, max = 100.0, message = "Score must be between 0 and 100."))]
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub metadata: Vec<i64>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl EntityForm for EnrollmentForm {
    fn normalize(&mut self) {
        if let Some(grade) = &self.grade {
            let trimmed = grade.trim().to_uppercase();
            self.grade = if trimmed.is_empty() { None } else { Some(trimmed) };
        }
        // A score with no grade gets the suggested letter grade.
        if self.grade.is_none() {
            if let Some(score) = self.score {
                if (0.0..=100.0).contains(&score) {
                    self.grade = Some(Grade::from_score(score).as_str().to_string());
                }
            }
        }
    }

    fn clean(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if let Some(grade) = &self.grade {
            if Grade::parse(grade).is_none() {
                push_error(&mut errors, "grade", "Select a valid grade.");
            }
        }
        if self.completion_date.is_some() && self.grade.is_none() {
            push_error(
                &mut errors,
                "grade",
                "A grade is required when a completion date is provided.",
            );
        }
        errors
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MetaDataForm {
    #[validate(length(min = 1, max = 100, message = "Key must be 1-100 characters."))]
    pub key: String,
    #[validate(length(min = 1, message = "Value is required."))]
    pub value: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl EntityForm for MetaDataForm {
    fn normalize(&mut self) {
        self.key = self.key.trim().to_string();
        self.value = self.value.trim().to_string();
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StaffForm {
    #[validate(length(min = 1, max = 150, message = "Username must be 1-150 characters."))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub confirm_password: Option<String>,
    #[serde(default)]
    pub groups: Vec<i64>,
}

impl StaffForm {
    fn password_errors(&self, errors: &mut FieldErrors) {
        let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) else {
            return;
        };

        if password.len() < 8 {
            push_error(errors, "password", "Password must be at least 8 characters long.");
        }
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            push_error(errors, "password", "Password must contain at least one uppercase letter.");
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            push_error(errors, "password", "Password must contain at least one lowercase letter.");
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            push_error(errors, "password", "Password must contain at least one digit.");
        }

        if self.password != self.confirm_password {
            push_error(errors, "confirm_password", "Passwords do not match.");
        }
    }
}

impl EntityForm for StaffForm {
    fn normalize(&mut self) {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
    }

    fn clean(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if !self.username.is_empty() && !USERNAME_RE.is_match(&self.username) {
            push_error(
                &mut errors,
                "username",
                "Username may contain letters, digits and @/./+/-/_ only.",
            );
        }
        self.password_errors(&mut errors);
        errors
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GroupForm {
    #[validate(length(min = 1, max = 150, message = "Group name must be 1-150 characters."))]
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl EntityForm for GroupForm {
    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
    }

    fn clean(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for capability in &self.permissions {
            if !permissions::is_known_capability(capability) {
                push_error(
                    &mut errors,
                    "permissions",
                    &format!("Unknown permission: {}", capability),
                );
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_code_is_uppercased_before_the_format_check() {
        let mut form = CourseForm {
            name: "Intro to Computer Science".to_string(),
            course_code: "  cs101 ".to_string(),
            description: String::new(),
            metadata: vec![],
            remarks: None,
        };
        form.normalize();
        assert_eq!(form.course_code, "CS101");
        assert!(form.clean().is_empty());
    }

    #[test]
    fn malformed_course_code_is_a_field_error() {
        for bad in ["C101", "CS1", "TOOLONG101", "CS10123", "101CS", "CS 101"] {
            let mut form = CourseForm {
                name: "Some Course".to_string(),
                course_code: bad.to_string(),
                description: String::new(),
                metadata: vec![],
                remarks: None,
            };
            form.normalize();
            let errors = form.clean();
            assert!(errors.contains_key("course_code"), "{} should be rejected", bad);
        }
    }

    #[test]
    fn future_birth_date_is_rejected() {
        let mut form = StudentForm {
            first_name: "ada".to_string(),
            last_name: "lovelace".to_string(),
            email: "ada@example.com".to_string(),
            date_of_birth: Utc::now().date_naive() + chrono::Duration::days(1),
            metadata: vec![],
            remarks: None,
        };
        form.normalize();
        let errors = form.clean();
        assert!(errors.contains_key("date_of_birth"));
        assert_eq!(form.first_name, "Ada");
    }

    #[test]
    fn implausibly_old_birth_date_is_rejected() {
        let form = StudentForm {
            first_name: "Old".to_string(),
            last_name: "Timer".to_string(),
            email: "old@example.com".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1850, 1, 1).unwrap(),
            metadata: vec![],
            remarks: None,
        };
        assert!(form.clean().contains_key("date_of_birth"));
    }

    #[test]
    fn score_without_grade_gets_a_suggested_grade() {
        let cases = [
            (98.0, "A+"),
            (95.0, "A"),
            (91.0, "A-"),
            (88.0, "B+"),
            (85.0, "B"),
            (81.0, "B-"),
            (78.0, "C+"),
            (75.0, "C"),
            (71.0, "C-"),
            (68.0, "D+"),
            (65.0, "D"),
            (42.0, "F"),
        ];
        for (score, expected) in cases {
            let mut form = EnrollmentForm {
                student: 1,
                course: 1,
                grade: None,
                score: Some(score),
                completion_date: None,
                is_active: None,
                metadata: vec![],
                remarks: None,
            };
            form.normalize();
            assert_eq!(form.grade.as_deref(), Some(expected), "score {}", score);
        }
    }

    #[test]
    fn completion_date_requires_a_grade() {
        let mut form = EnrollmentForm {
            student: 1,
            course: 1,
            grade: None,
            score: None,
            completion_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            is_active: None,
            metadata: vec![],
            remarks: None,
        };
        form.normalize();
        assert!(form.clean().contains_key("grade"));
    }

    #[test]
    fn weak_staff_password_collects_every_failed_rule() {
        let form = StaffForm {
            username: "jsmith".to_string(),
            email: "jsmith@example.com".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            password: Some("short".to_string()),
            confirm_password: Some("different".to_string()),
            groups: vec![],
        };
        let errors = form.clean();
        assert!(errors["password"].len() >= 3);
        assert!(errors.contains_key("confirm_password"));
    }

    #[test]
    fn group_form_rejects_capabilities_outside_the_registry() {
        let form = GroupForm {
            name: "Registrars".to_string(),
            permissions: vec![
                "students.view_student".to_string(),
                "students.view_studnet".to_string(),
            ],
        };
        let errors = form.clean();
        assert_eq!(errors["permissions"].len(), 1);
    }
}
