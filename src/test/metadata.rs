#[cfg(test)]
mod tests {
    use crate::db::courses::{CourseFilter, get_course, list_courses, update_course};
    use crate::db::metadata::{active_tags, delete_metadata, list_metadata, MetaDataFilter};
    use crate::db::students::{StudentFilter, get_student, list_students, update_student};
    use crate::forms::{CourseForm, StudentForm};
    use crate::test::utils::TestDbBuilder;
    use chrono::NaiveDate;

    #[rocket::async_test]
    async fn metadata_selection_is_replaced_not_merged() {
        let test_db = TestDbBuilder::new()
            .metadata("level", "beginner")
            .metadata("cohort", "2025")
            .metadata("track", "honors")
            .student("Ada", "Lovelace", "ada@example.com", "1992-01-01")
            .build()
            .await
            .expect("test db");

        let student_id = test_db.student_id("ada@example.com");
        let base_form = |metadata: Vec<i64>| StudentForm {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1992, 1, 1).unwrap(),
            metadata,
            remarks: None,
        };

        // Start with {level, cohort}.
        update_student(
            &test_db.pool,
            &test_db.audit(),
            student_id,
            &base_form(vec![test_db.metadata_id("level"), test_db.metadata_id("cohort")]),
        )
        .await
        .expect("first update");

        let student = get_student(&test_db.pool, student_id).await.expect("get");
        assert_eq!(student.metadata.len(), 2);

        // Submitting {track} supersedes the old set entirely.
        update_student(
            &test_db.pool,
            &test_db.audit(),
            student_id,
            &base_form(vec![test_db.metadata_id("track")]),
        )
        .await
        .expect("second update");

        let student = get_student(&test_db.pool, student_id).await.expect("get");
        let keys: Vec<&str> = student.metadata.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["track"]);
    }

    #[rocket::async_test]
    async fn deleting_a_tag_detaches_it_from_every_entity() {
        let test_db = TestDbBuilder::new()
            .metadata("level", "beginner")
            .student("Ada", "Lovelace", "ada@example.com", "1992-01-01")
            .course("CS101", "Intro to Computer Science")
            .build()
            .await
            .expect("test db");

        let tag_id = test_db.metadata_id("level");
        let student_id = test_db.student_id("ada@example.com");
        let course_id = test_db.course_id("CS101");

        update_student(
            &test_db.pool,
            &test_db.audit(),
            student_id,
            &StudentForm {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1992, 1, 1).unwrap(),
                metadata: vec![tag_id],
                remarks: None,
            },
        )
        .await
        .expect("tag student");

        update_course(
            &test_db.pool,
            &test_db.audit(),
            course_id,
            &CourseForm {
                name: "Intro to Computer Science".to_string(),
                course_code: "CS101".to_string(),
                description: String::new(),
                metadata: vec![tag_id],
                remarks: None,
            },
        )
        .await
        .expect("tag course");

        delete_metadata(&test_db.pool, tag_id).await.expect("delete tag");

        let student = get_student(&test_db.pool, student_id).await.expect("get student");
        assert!(student.metadata.is_empty());

        let course = get_course(&test_db.pool, course_id).await.expect("get course");
        assert!(course.metadata.is_empty());

        let remaining = list_metadata(&test_db.pool, &MetaDataFilter::default(), 15, 0)
            .await
            .expect("list metadata");
        assert!(remaining.is_empty());
    }

    #[rocket::async_test]
    async fn lists_filter_by_metadata_key() {
        let test_db = TestDbBuilder::new()
            .metadata("level", "beginner")
            .student("Ada", "Lovelace", "ada@example.com", "1992-01-01")
            .student("Grace", "Hopper", "grace@example.com", "1990-12-09")
            .course("CS101", "Intro to Computer Science")
            .course("MATH1001", "Calculus I")
            .build()
            .await
            .expect("test db");

        let tag_id = test_db.metadata_id("level");

        update_student(
            &test_db.pool,
            &test_db.audit(),
            test_db.student_id("ada@example.com"),
            &StudentForm {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1992, 1, 1).unwrap(),
                metadata: vec![tag_id],
                remarks: None,
            },
        )
        .await
        .expect("tag student");

        update_course(
            &test_db.pool,
            &test_db.audit(),
            test_db.course_id("CS101"),
            &CourseForm {
                name: "Intro to Computer Science".to_string(),
                course_code: "CS101".to_string(),
                description: String::new(),
                metadata: vec![tag_id],
                remarks: None,
            },
        )
        .await
        .expect("tag course");

        let students = list_students(
            &test_db.pool,
            &StudentFilter {
                metadata: Some("level".to_string()),
                ..Default::default()
            },
            15,
            0,
        )
        .await
        .expect("filter students");
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].email, "ada@example.com");

        let courses = list_courses(
            &test_db.pool,
            &CourseFilter {
                metadata: Some("level".to_string()),
                ..Default::default()
            },
            15,
            0,
        )
        .await
        .expect("filter courses");
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].course_code, "CS101");

        // An unknown key matches nothing rather than erroring.
        let none = list_students(
            &test_db.pool,
            &StudentFilter {
                metadata: Some("nope".to_string()),
                ..Default::default()
            },
            15,
            0,
        )
        .await
        .expect("filter students");
        assert!(none.is_empty());
    }

    #[rocket::async_test]
    async fn inactive_tags_are_left_out_of_the_selection_pool() {
        let test_db = TestDbBuilder::new()
            .metadata("level", "beginner")
            .metadata("cohort", "2025")
            .build()
            .await
            .expect("test db");

        sqlx::query("UPDATE metadata SET is_active = FALSE WHERE key = 'cohort'")
            .execute(&test_db.pool)
            .await
            .expect("deactivate tag");

        let pool = active_tags(&test_db.pool).await.expect("active tags");
        let keys: Vec<&str> = pool.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["level"]);
    }
}
