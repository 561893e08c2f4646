#[cfg(test)]
mod tests {
    use crate::db::AuditContext;
    use crate::db::students::{
        StudentFilter, count_students, create_student, email_taken, get_student, list_students,
        update_student,
    };
    use crate::forms::StudentForm;
    use crate::test::utils::TestDbBuilder;
    use chrono::NaiveDate;

    fn ada_form() -> StudentForm {
        StudentForm {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1992, 1, 1).unwrap(),
            metadata: vec![],
            remarks: None,
        }
    }

    #[rocket::async_test]
    async fn created_student_appears_in_list_with_empty_metadata() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");

        let student = create_student(&test_db.pool, &test_db.audit(), &ada_form())
            .await
            .expect("create student");
        assert!(student.is_active);
        assert!(student.metadata.is_empty());

        let listed = list_students(&test_db.pool, &StudentFilter::default(), 15, 0)
            .await
            .expect("list students");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].email, "ada@example.com");
        assert!(listed[0].metadata.is_empty());
    }

    #[rocket::async_test]
    async fn audit_fields_are_stamped_from_the_context() {
        let test_db = TestDbBuilder::new()
            .superuser("second_admin")
            .build()
            .await
            .expect("test db");

        let student = create_student(&test_db.pool, &test_db.audit(), &ada_form())
            .await
            .expect("create student");
        assert_eq!(student.created_by, Some(test_db.user_id("admin")));
        assert_eq!(student.updated_by, Some(test_db.user_id("admin")));

        let other_actor = AuditContext {
            actor_id: test_db.user_id("second_admin"),
        };
        let mut form = ada_form();
        form.remarks = Some("transferred".to_string());
        let updated = update_student(&test_db.pool, &other_actor, student.id, &form)
            .await
            .expect("update student");

        assert_eq!(updated.created_by, Some(test_db.user_id("admin")));
        assert_eq!(updated.updated_by, Some(test_db.user_id("second_admin")));
    }

    #[rocket::async_test]
    async fn email_uniqueness_excludes_the_row_being_edited() {
        let test_db = TestDbBuilder::new()
            .student("Ada", "Lovelace", "ada@example.com", "1992-01-01")
            .student("Grace", "Hopper", "grace@example.com", "1990-12-09")
            .build()
            .await
            .expect("test db");

        assert!(
            email_taken(&test_db.pool, "ada@example.com", None)
                .await
                .expect("email check")
        );
        // Editing Ada herself is not a collision.
        assert!(
            !email_taken(
                &test_db.pool,
                "ada@example.com",
                Some(test_db.student_id("ada@example.com"))
            )
            .await
            .expect("email check")
        );
        // Editing Grace into Ada's email is.
        assert!(
            email_taken(
                &test_db.pool,
                "ada@example.com",
                Some(test_db.student_id("grace@example.com"))
            )
            .await
            .expect("email check")
        );
    }

    #[rocket::async_test]
    async fn search_matches_name_and_email_substrings() {
        let test_db = TestDbBuilder::new()
            .student("Ada", "Lovelace", "ada@example.com", "1992-01-01")
            .student("Grace", "Hopper", "grace@example.com", "1990-12-09")
            .build()
            .await
            .expect("test db");

        let filter = StudentFilter {
            search: Some("love".to_string()),
            ..Default::default()
        };
        let matched = list_students(&test_db.pool, &filter, 15, 0)
            .await
            .expect("search students");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].last_name, "Lovelace");

        assert_eq!(
            count_students(&test_db.pool, &filter).await.expect("count"),
            1
        );
    }

    #[rocket::async_test]
    async fn missing_student_is_a_not_found_error() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");

        let result = get_student(&test_db.pool, 4242).await;
        assert!(matches!(
            result,
            Err(crate::error::AppError::NotFound(_))
        ));
    }
}
