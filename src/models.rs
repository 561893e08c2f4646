use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Lightweight tag view embedded in entity payloads.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetaDataTag {
    pub id: i64,
    pub key: String,
    pub value: String,
}

/// Full metadata row, for the metadata CRUD surface itself.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MetaData {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub is_active: bool,
    pub remarks: Option<String>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub is_active: bool,
    pub remarks: Option<String>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[sqlx(skip)]
    pub metadata: Vec<MetaDataTag>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Instructor {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub is_active: bool,
    pub remarks: Option<String>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[sqlx(skip)]
    pub courses: Vec<CourseRef>,
    #[sqlx(skip)]
    pub metadata: Vec<MetaDataTag>,
}

impl Instructor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Course reference embedded in instructor payloads.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseRef {
    pub id: i64,
    pub course_code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub course_code: String,
    pub description: String,
    pub is_active: bool,
    pub remarks: Option<String>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[sqlx(skip)]
    pub metadata: Vec<MetaDataTag>,
}

impl Course {
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.course_code, self.name)
    }
}

/// Enrollment row joined with its student and course for display.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub student_name: String,
    pub course_code: String,
    pub course_name: String,
    pub grade: Option<String>,
    pub score: Option<f64>,
    pub completion_date: Option<NaiveDate>,
    pub is_active: bool,
    pub remarks: Option<String>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[sqlx(skip)]
    pub metadata: Vec<MetaDataTag>,
}

impl Enrollment {
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.student_name, self.course_code)
    }

    /// Grade-point value from the fixed lookup table. Grades outside the
    /// table (I, W, or none) carry zero points.
    pub fn grade_points(&self) -> f64 {
        self.grade
            .as_deref()
            .and_then(Grade::parse)
            .map(Grade::points)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    APlus,
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    DPlus,
    D,
    F,
    Incomplete,
    Withdrawn,
}

impl Grade {
    pub const ALL: [Grade; 14] = [
        Grade::APlus,
        Grade::A,
        Grade::AMinus,
        Grade::BPlus,
        Grade::B,
        Grade::BMinus,
        Grade::CPlus,
        Grade::C,
        Grade::CMinus,
        Grade::DPlus,
        Grade::D,
        Grade::F,
        Grade::Incomplete,
        Grade::Withdrawn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::DPlus => "D+",
            Grade::D => "D",
            Grade::F => "F",
            Grade::Incomplete => "I",
            Grade::Withdrawn => "W",
        }
    }

    pub fn parse(s: &str) -> Option<Grade> {
        Grade::ALL.iter().copied().find(|g| g.as_str() == s)
    }

    pub fn points(self) -> f64 {
        match self {
            Grade::APlus | Grade::A => 4.0,
            Grade::AMinus => 3.7,
            Grade::BPlus => 3.3,
            Grade::B => 3.0,
            Grade::BMinus => 2.7,
            Grade::CPlus => 2.3,
            Grade::C => 2.0,
            Grade::CMinus => 1.7,
            Grade::DPlus => 1.3,
            Grade::D => 1.0,
            Grade::F | Grade::Incomplete | Grade::Withdrawn => 0.0,
        }
    }

    /// Suggested grade for a raw score, used when a score is submitted
    /// without a letter grade.
    pub fn from_score(score: f64) -> Grade {
        if score >= 97.0 {
            Grade::APlus
        } else if score >= 93.0 {
            Grade::A
        } else if score >= 90.0 {
            Grade::AMinus
        } else if score >= 87.0 {
            Grade::BPlus
        } else if score >= 83.0 {
            Grade::B
        } else if score >= 80.0 {
            Grade::BMinus
        } else if score >= 77.0 {
            Grade::CPlus
        } else if score >= 73.0 {
            Grade::C
        } else if score >= 70.0 {
            Grade::CMinus
        } else if score >= 67.0 {
            Grade::DPlus
        } else if score >= 60.0 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

/// Group row with its computed member count and capability grants.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub member_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[sqlx(skip)]
    pub permissions: Vec<String>,
}

/// Staff row as listed on the staff management surface.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StaffMember {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[sqlx(skip)]
    pub groups: Vec<String>,
}

impl StaffMember {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim().to_string();
        if name.is_empty() {
            self.username.clone()
        } else {
            name
        }
    }
}
