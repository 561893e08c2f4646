pub mod auth;
pub mod courses;
pub mod dashboard;
pub mod enrollments;
pub mod groups;
pub mod instructors;
pub mod metadata;
pub mod navigation;
pub mod staff;
pub mod students;
pub mod toggle;
