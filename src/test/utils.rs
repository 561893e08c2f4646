use std::collections::HashMap;
use std::sync::Once;

use chrono::NaiveDate;
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::auth::User;
use crate::db::AuditContext;
use crate::db::enrollments::create_enrollment;
use crate::db::groups::create_group;
use crate::db::instructors::create_instructor;
use crate::db::metadata::create_metadata;
use crate::db::staff::{create_staff, create_superuser, get_user_with_grants};
use crate::db::students::create_student;
use crate::db::courses::create_course;
use crate::error::AppError;
use crate::forms::{
    CourseForm, EnrollmentForm, GroupForm, InstructorForm, MetaDataForm, StaffForm, StudentForm,
};

static INIT: Once = Once::new();
pub static STANDARD_PASSWORD: &str = "password123";

struct TestGroup {
    name: String,
    capabilities: Vec<String>,
}

struct TestStaff {
    username: String,
    groups: Vec<String>,
}

struct TestStudent {
    first_name: String,
    last_name: String,
    email: String,
    date_of_birth: String,
}

struct TestInstructor {
    first_name: String,
    last_name: String,
    email: String,
}

struct TestCourse {
    course_code: String,
    name: String,
}

struct TestEnrollment {
    student_email: String,
    course_code: String,
}

/// Fluent fixture over an in-memory database running the real migrations.
/// A superuser named `admin` is always present and stamps the audit fields
/// of everything else the builder creates.
#[derive(Default)]
pub struct TestDbBuilder {
    superusers: Vec<String>,
    groups: Vec<TestGroup>,
    staff: Vec<TestStaff>,
    students: Vec<TestStudent>,
    instructors: Vec<TestInstructor>,
    courses: Vec<TestCourse>,
    metadata: Vec<(String, String)>,
    enrollments: Vec<TestEnrollment>,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn superuser(mut self, username: &str) -> Self {
        self.superusers.push(username.to_string());
        self
    }

    pub fn group(mut self, name: &str, capabilities: &[&str]) -> Self {
        self.groups.push(TestGroup {
            name: name.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn staff(mut self, username: &str, groups: &[&str]) -> Self {
        self.staff.push(TestStaff {
            username: username.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
        });
        self
    }

    pub fn student(mut self, first_name: &str, last_name: &str, email: &str, dob: &str) -> Self {
        self.students.push(TestStudent {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            date_of_birth: dob.to_string(),
        });
        self
    }

    pub fn instructor(mut self, first_name: &str, last_name: &str, email: &str) -> Self {
        self.instructors.push(TestInstructor {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        });
        self
    }

    pub fn course(mut self, course_code: &str, name: &str) -> Self {
        self.courses.push(TestCourse {
            course_code: course_code.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.push((key.to_string(), value.to_string()));
        self
    }

    pub fn enrollment(mut self, student_email: &str, course_code: &str) -> Self {
        self.enrollments.push(TestEnrollment {
            student_email: student_email.to_string(),
            course_code: course_code.to_string(),
        });
        self
    }

    pub async fn build(mut self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });

        // One connection, never reaped, so every statement sees the same
        // in-memory db for the lifetime of the test.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        if !self.superusers.iter().any(|name| name == "admin") {
            self.superusers.insert(0, "admin".to_string());
        }

        let mut user_ids: HashMap<String, i64> = HashMap::new();
        let mut group_ids: HashMap<String, i64> = HashMap::new();
        let mut student_ids: HashMap<String, i64> = HashMap::new();
        let mut instructor_ids: HashMap<String, i64> = HashMap::new();
        let mut course_ids: HashMap<String, i64> = HashMap::new();
        let mut metadata_ids: HashMap<String, i64> = HashMap::new();
        let mut enrollment_ids: HashMap<(String, String), i64> = HashMap::new();

        for username in &self.superusers {
            let email = format!("{}@example.com", username);
            let id = create_superuser(&pool, username, &email, STANDARD_PASSWORD).await?;
            user_ids.insert(username.clone(), id);
        }

        let ctx = AuditContext {
            actor_id: user_ids["admin"],
        };

        for group in &self.groups {
            let created = create_group(
                &pool,
                &GroupForm {
                    name: group.name.clone(),
                    permissions: group.capabilities.clone(),
                },
            )
            .await?;
            group_ids.insert(group.name.clone(), created.id);
        }

        for staff in &self.staff {
            let created = create_staff(
                &pool,
                &StaffForm {
                    username: staff.username.clone(),
                    email: format!("{}@example.com", staff.username),
                    first_name: String::new(),
                    last_name: String::new(),
                    password: Some(STANDARD_PASSWORD.to_string()),
                    confirm_password: Some(STANDARD_PASSWORD.to_string()),
                    groups: staff.groups.iter().map(|name| group_ids[name]).collect(),
                },
            )
            .await?;
            user_ids.insert(staff.username.clone(), created.id);
        }

        for (key, value) in &self.metadata {
            let created = create_metadata(
                &pool,
                &ctx,
                &MetaDataForm {
                    key: key.clone(),
                    value: value.clone(),
                    remarks: None,
                },
            )
            .await?;
            metadata_ids.insert(key.clone(), created.id);
        }

        for student in &self.students {
            let created = create_student(
                &pool,
                &ctx,
                &StudentForm {
                    first_name: student.first_name.clone(),
                    last_name: student.last_name.clone(),
                    email: student.email.clone(),
                    date_of_birth: NaiveDate::parse_from_str(&student.date_of_birth, "%Y-%m-%d")
                        .expect("Invalid test date of birth"),
                    metadata: vec![],
                    remarks: None,
                },
            )
            .await?;
            student_ids.insert(student.email.clone(), created.id);
        }

        for course in &self.courses {
            let created = create_course(
                &pool,
                &ctx,
                &CourseForm {
                    name: course.name.clone(),
                    course_code: course.course_code.clone(),
                    description: String::new(),
                    metadata: vec![],
                    remarks: None,
                },
            )
            .await?;
            course_ids.insert(course.course_code.clone(), created.id);
        }

        for instructor in &self.instructors {
            let created = create_instructor(
                &pool,
                &ctx,
                &InstructorForm {
                    first_name: instructor.first_name.clone(),
                    last_name: instructor.last_name.clone(),
                    email: instructor.email.clone(),
                    phone_number: String::new(),
                    courses: vec![],
                    metadata: vec![],
                    remarks: None,
                },
            )
            .await?;
            instructor_ids.insert(instructor.email.clone(), created.id);
        }

        for enrollment in &self.enrollments {
            let created = create_enrollment(
                &pool,
                &ctx,
                &EnrollmentForm {
                    student: student_ids[&enrollment.student_email],
                    course: course_ids[&enrollment.course_code],
                    grade: None,
                    score: None,
                    completion_date: None,
                    is_active: None,
                    metadata: vec![],
                    remarks: None,
                },
            )
            .await?;
            enrollment_ids.insert(
                (
                    enrollment.student_email.clone(),
                    enrollment.course_code.clone(),
                ),
                created.id,
            );
        }

        Ok(TestDb {
            pool,
            user_ids,
            group_ids,
            student_ids,
            instructor_ids,
            course_ids,
            metadata_ids,
            enrollment_ids,
        })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    pub user_ids: HashMap<String, i64>,
    pub group_ids: HashMap<String, i64>,
    pub student_ids: HashMap<String, i64>,
    pub instructor_ids: HashMap<String, i64>,
    pub course_ids: HashMap<String, i64>,
    pub metadata_ids: HashMap<String, i64>,
    pub enrollment_ids: HashMap<(String, String), i64>,
}

impl TestDb {
    pub fn user_id(&self, username: &str) -> i64 {
        self.user_ids[username]
    }

    pub fn student_id(&self, email: &str) -> i64 {
        self.student_ids[email]
    }

    pub fn course_id(&self, code: &str) -> i64 {
        self.course_ids[code]
    }

    pub fn metadata_id(&self, key: &str) -> i64 {
        self.metadata_ids[key]
    }

    pub fn group_id(&self, name: &str) -> i64 {
        self.group_ids[name]
    }

    pub fn enrollment_id(&self, student_email: &str, course_code: &str) -> i64 {
        self.enrollment_ids[&(student_email.to_string(), course_code.to_string())]
    }

    /// Loads a principal with fresh grants, the way the request guard does.
    pub async fn principal(&self, username: &str) -> User {
        get_user_with_grants(&self.pool, self.user_id(username))
            .await
            .expect("Test user not found")
    }

    pub fn audit(&self) -> AuditContext {
        AuditContext {
            actor_id: self.user_id("admin"),
        }
    }
}

pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
    let rocket = crate::init_rocket(test_db.pool.clone()).await;
    let client = Client::tracked(rocket)
        .await
        .expect("Failed to build test client");
    (client, test_db)
}

/// Logs in through the real endpoint; the tracked client keeps the session
/// cookies for subsequent requests.
pub async fn login_test_user(client: &Client, username: &str, password: &str) {
    let response = client
        .post("/api/login")
        .header(ContentType::JSON)
        .body(
            json!({
                "username": username,
                "password": password,
            })
            .to_string(),
        )
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok, "Login request failed");
}

pub fn ajax() -> Header<'static> {
    Header::new("X-Requested-With", "XMLHttpRequest")
}
