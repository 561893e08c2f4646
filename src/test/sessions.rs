#[cfg(test)]
mod tests {
    use crate::auth::UserSession;
    use crate::db::sessions::{
        clean_expired_sessions, create_user_session, get_session_by_token, invalidate_session,
    };
    use crate::error::AppError;
    use crate::test::utils::TestDbBuilder;
    use chrono::{Duration, Utc};

    #[rocket::async_test]
    async fn create_and_get_session() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let user_id = test_db.user_id("admin");

        let token = UserSession::generate_token();
        let expires_at = (Utc::now() + Duration::hours(1)).naive_utc();

        let session_id = create_user_session(&test_db.pool, user_id, &token, expires_at)
            .await
            .expect("create session");
        assert!(session_id > 0);

        let session = get_session_by_token(&test_db.pool, &token)
            .await
            .expect("get session");
        assert_eq!(session.user_id, user_id);
        assert!(session.is_valid());
    }

    #[rocket::async_test]
    async fn nonexistent_token_is_an_authentication_error() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");

        let result = get_session_by_token(&test_db.pool, "nonexistent_token").await;
        match result {
            Err(AppError::Authentication(msg)) => assert_eq!(msg, "Invalid session token"),
            other => panic!("Expected Authentication error, got {:?}", other),
        }
    }

    #[rocket::async_test]
    async fn invalidated_sessions_stop_resolving() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let user_id = test_db.user_id("admin");

        let token = UserSession::generate_token();
        let expires_at = (Utc::now() + Duration::hours(1)).naive_utc();
        create_user_session(&test_db.pool, user_id, &token, expires_at)
            .await
            .expect("create session");

        invalidate_session(&test_db.pool, &token)
            .await
            .expect("invalidate");

        assert!(get_session_by_token(&test_db.pool, &token).await.is_err());
    }

    #[rocket::async_test]
    async fn sweeper_removes_only_expired_sessions() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let user_id = test_db.user_id("admin");

        let expired_token = UserSession::generate_token();
        let live_token = UserSession::generate_token();

        create_user_session(
            &test_db.pool,
            user_id,
            &expired_token,
            (Utc::now() - Duration::hours(2)).naive_utc(),
        )
        .await
        .expect("create expired session");
        create_user_session(
            &test_db.pool,
            user_id,
            &live_token,
            (Utc::now() + Duration::hours(1)).naive_utc(),
        )
        .await
        .expect("create live session");

        let removed = clean_expired_sessions(&test_db.pool)
            .await
            .expect("sweep sessions");
        assert_eq!(removed, 1);

        assert!(get_session_by_token(&test_db.pool, &expired_token).await.is_err());
        assert!(get_session_by_token(&test_db.pool, &live_token).await.is_ok());
    }

    #[rocket::async_test]
    async fn expired_session_is_not_valid() {
        let test_db = TestDbBuilder::new().build().await.expect("test db");
        let user_id = test_db.user_id("admin");

        let token = UserSession::generate_token();
        create_user_session(
            &test_db.pool,
            user_id,
            &token,
            (Utc::now() - Duration::minutes(1)).naive_utc(),
        )
        .await
        .expect("create session");

        let session = get_session_by_token(&test_db.pool, &token)
            .await
            .expect("get session");
        assert!(!session.is_valid());
    }
}
