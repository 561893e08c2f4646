#[cfg(test)]
mod tests {
    use crate::api::auth::{LoginResponse, UserData};
    use crate::test::utils::{TestDbBuilder, ajax, login_test_user, setup_test_client};
    use rocket::http::{ContentType, Status};
    use serde_json::{Value, json};

    #[rocket::async_test]
    async fn login_succeeds_and_rejects_bad_credentials() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let (client, _test_db) = setup_test_client(test_db).await;

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({"username": "admin", "password": "password123"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let login: LoginResponse = serde_json::from_str(&body).unwrap();
        assert!(login.success);
        assert_eq!(login.user.unwrap().username, "admin");

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({"username": "admin", "password": "wrong"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let login: LoginResponse = serde_json::from_str(&body).unwrap();
        assert!(!login.success);
        assert!(login.error.is_some());
    }

    #[rocket::async_test]
    async fn protected_endpoints_require_authentication() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let (client, _test_db) = setup_test_client(test_db).await;

        for endpoint in ["/api/me", "/api/students", "/api/navigation", "/api/dashboard"] {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
        }
    }

    #[rocket::async_test]
    async fn me_returns_the_authenticated_principal() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let (client, _test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "admin", "password123").await;

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let user: UserData = serde_json::from_str(&body).unwrap();
        assert_eq!(user.username, "admin");
        assert!(user.is_superuser);
    }

    #[rocket::async_test]
    async fn student_create_round_trip_with_empty_metadata() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let (client, _test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "admin", "password123").await;

        let response = client
            .post("/api/students/add")
            .header(ContentType::JSON)
            .header(ajax())
            .body(
                json!({
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "email": "ada@example.com",
                    "date_of_birth": "1992-01-01"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["redirect_url"], json!("/api/students"));

        let response = client.get("/api/students").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["total_count"], json!(1));
        assert_eq!(body["page"], json!(1));
        assert_eq!(body["has_next"], json!(false));
        assert_eq!(body["items"][0]["email"], json!("ada@example.com"));
        assert_eq!(body["items"][0]["metadata"], json!([]));
    }

    #[rocket::async_test]
    async fn invalid_student_submission_returns_field_errors() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let (client, _test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "admin", "password123").await;

        let response = client
            .post("/api/students/add")
            .header(ContentType::JSON)
            .header(ajax())
            .body(
                json!({
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "email": "not-an-email",
                    "date_of_birth": "2999-01-01"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["success"], json!(false));
        assert!(body["errors"]["email"].is_array());
        assert!(body["errors"]["date_of_birth"].is_array());
    }

    #[rocket::async_test]
    async fn browser_submissions_are_answered_with_a_redirect() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let (client, _test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "admin", "password123").await;

        let response = client
            .post("/api/students/add")
            .header(ContentType::JSON)
            .body(
                json!({
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "email": "ada@example.com",
                    "date_of_birth": "1992-01-01"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::SeeOther);
        let location = response.headers().get_one("Location").unwrap();
        assert_eq!(location, "/api/students");
    }

    #[rocket::async_test]
    async fn duplicate_enrollment_cites_both_fields() {
        let test_db = TestDbBuilder::new()
            .student("Ada", "Lovelace", "ada@example.com", "1992-01-01")
            .course("CS101", "Intro to Computer Science")
            .build()
            .await
            .expect("test db");
        let student_id = test_db.student_id("ada@example.com");
        let course_id = test_db.course_id("CS101");
        let (client, _test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "admin", "password123").await;

        let payload = json!({"student": student_id, "course": course_id}).to_string();

        let response = client
            .post("/api/enrollments/add")
            .header(ContentType::JSON)
            .header(ajax())
            .body(payload.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let response = client
            .post("/api/enrollments/add")
            .header(ContentType::JSON)
            .header(ajax())
            .body(payload)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(
            body["errors"]["student"][0],
            json!("This student is already enrolled in this course.")
        );
        assert_eq!(
            body["errors"]["course"][0],
            json!("This student is already enrolled in this course.")
        );
    }

    #[rocket::async_test]
    async fn list_endpoint_refuses_a_principal_without_the_view_capability() {
        let test_db = TestDbBuilder::new()
            .group("Viewers", &["students.view_student"])
            .staff("jsmith", &["Viewers"])
            .build()
            .await
            .expect("test db");
        let (client, _test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "jsmith", "password123").await;

        let response = client.get("/api/students").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/courses").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client.get("/api/staffs").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn navigation_is_filtered_per_principal() {
        let test_db = TestDbBuilder::new()
            .group("Viewers", &["students.view_student"])
            .staff("jsmith", &["Viewers"])
            .build()
            .await
            .expect("test db");
        let (client, _test_db) = setup_test_client(test_db).await;

        // The superuser sees every configured branch.
        login_test_user(&client, "admin", "password123").await;
        let response = client.get("/api/navigation").dispatch().await;
        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let menu = body["menu"].as_array().unwrap();
        assert_eq!(menu.len(), 5);
        assert_eq!(body["role_display"], json!("Super Admin"));

        // A student viewer sees only the Students leaf under its header.
        login_test_user(&client, "jsmith", "password123").await;
        let response = client
            .get("/api/navigation?path=/api/students")
            .dispatch()
            .await;
        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let menu = body["menu"].as_array().unwrap();
        assert_eq!(menu.len(), 1);
        assert_eq!(menu[0]["name"], json!("Account Management"));
        let children = menu[0]["children"].as_array().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0]["name"], json!("Students"));
        assert_eq!(children[0]["active"], json!(true));
        assert_eq!(menu[0]["active"], json!(true));
    }

    #[rocket::async_test]
    async fn toggle_endpoint_flips_and_reports_the_new_value() {
        let test_db = TestDbBuilder::new()
            .student("Ada", "Lovelace", "ada@example.com", "1992-01-01")
            .build()
            .await
            .expect("test db");
        let student_id = test_db.student_id("ada@example.com");
        let (client, _test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "admin", "password123").await;

        let response = client
            .post(format!("/api/toggle/student/{}", student_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["is_active"], json!(false));
        assert_eq!(body["display_name"], json!("Ada"));
        assert_eq!(body["model_name"], json!("student"));

        // Unknown entities are rejected before any lookup.
        let response = client.post("/api/toggle/widget/1").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn check_enrollment_probe_validates_and_reports() {
        let test_db = TestDbBuilder::new()
            .student("Ada", "Lovelace", "ada@example.com", "1992-01-01")
            .course("CS101", "Intro to Computer Science")
            .enrollment("ada@example.com", "CS101")
            .build()
            .await
            .expect("test db");
        let student_id = test_db.student_id("ada@example.com");
        let course_id = test_db.course_id("CS101");
        let (client, _test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "admin", "password123").await;

        let response = client.get("/api/check-enrollment").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);

        let response = client
            .get("/api/check-enrollment?student=abc&course=1")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let response = client
            .get(format!(
                "/api/check-enrollment?student={}&course={}",
                student_id, course_id
            ))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["exists"], json!(true));
        assert_eq!(
            body["enrollment_details"]["student_name"],
            json!("Ada Lovelace")
        );

        // Excluding the only enrollment reports no duplicate.
        let enrollment_id = _test_db.enrollment_id("ada@example.com", "CS101");
        let response = client
            .get(format!(
                "/api/check-enrollment?student={}&course={}&exclude={}",
                student_id, course_id, enrollment_id
            ))
            .dispatch()
            .await;
        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["exists"], json!(false));
    }

    #[rocket::async_test]
    async fn course_codes_are_normalized_on_the_way_in() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let (client, _test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "admin", "password123").await;

        let response = client
            .post("/api/courses/add")
            .header(ContentType::JSON)
            .header(ajax())
            .body(
                json!({
                    "name": "Intro to Computer Science",
                    "course_code": "cs101"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let response = client.get("/api/courses").dispatch().await;
        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["items"][0]["course_code"], json!("CS101"));

        // A code that stays malformed after normalization is a field error.
        let response = client
            .post("/api/courses/add")
            .header(ContentType::JSON)
            .header(ajax())
            .body(
                json!({
                    "name": "Bad Course",
                    "course_code": "101cs"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(body["errors"]["course_code"].is_array());
    }
}
