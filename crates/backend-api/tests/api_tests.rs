use std::str::FromStr;

use axum::{
    body::Body,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS,
            ACCESS_CONTROL_REQUEST_METHOD, AUTHORIZATION, CONTENT_TYPE, ORIGIN,
        },
        Method, Request, StatusCode,
    },
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tempfile::TempDir;
use tower::ServiceExt;
use whisperwall_api::{build_router, AppState, ServerEvent};
use whisperwall_auth::Authenticator;
use whisperwall_config::AppConfig;

type TestResult<T = ()> = anyhow::Result<T>;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../database/migrations");

struct TestContext {
    temp_dir: TempDir,
    pool: SqlitePool,
    state: AppState,
}

struct Session {
    token: String,
    anonymous_id: String,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        Self::with_config(AppConfig::default()).await
    }

    async fn with_config(mut config: AppConfig) -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("backend_api.sqlite");
        let db_url = format!("sqlite://{}", db_path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;

        config.storage.upload_dir = temp_dir.path().join("uploads").display().to_string();

        let authenticator = Authenticator::new(pool.clone(), config.auth.clone());
        let state = AppState::new(pool.clone(), authenticator, config);

        Ok(Self {
            temp_dir,
            pool,
            state,
        })
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResult<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok((status, payload))
    }

    async fn register(&self) -> TestResult<Session> {
        let (status, body) = self
            .send(Method::POST, "/api/auth/register", None, None)
            .await?;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        Ok(Session {
            token: body["token"].as_str().unwrap_or_default().to_string(),
            anonymous_id: body["user"]["anonymousId"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        })
    }

    async fn create_post(&self, session: &Session, body: Value) -> TestResult<String> {
        let (status, payload) = self
            .send(Method::POST, "/api/posts", Some(&session.token), Some(body))
            .await?;
        assert_eq!(status, StatusCode::CREATED, "{payload}");
        Ok(payload["post"]["id"].as_str().unwrap_or_default().to_string())
    }

    async fn user_id(&self, session: &Session) -> TestResult<i64> {
        let (user, _) = self
            .state
            .authenticate(&session.token)
            .await
            .map_err(|error| anyhow::anyhow!(error.message))?;
        Ok(user.id)
    }
}

fn multipart_body(boundary: &str, files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, content_type, data) in files {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

mod router_tests {
    use super::*;

    #[tokio::test]
    async fn health_endpoints_report_status() -> TestResult {
        let ctx = TestContext::new().await?;

        let (status, body) = ctx.send(Method::GET, "/health", None, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = ctx.send(Method::GET, "/api/health", None, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "OK", "message": "Backend working"}));

        Ok(())
    }

    #[tokio::test]
    async fn openapi_document_is_served() -> TestResult {
        let ctx = TestContext::new().await?;
        let response = ctx
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await?.to_bytes();
        let document: Value = serde_json::from_slice(&body)?;
        assert!(document["paths"]["/api/posts/feed"].is_object());

        Ok(())
    }

    #[tokio::test]
    async fn cors_layer_allows_any_origin() -> TestResult {
        let ctx = TestContext::new().await?;
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/posts")
            .header(ORIGIN, "https://example.com")
            .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(
                ACCESS_CONTROL_REQUEST_HEADERS,
                "authorization, content-type",
            )
            .body(Body::empty())?;

        let response = ctx.router().oneshot(request).await?;
        assert!(matches!(
            response.status(),
            StatusCode::NO_CONTENT | StatusCode::OK
        ));

        let header = |name| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_ascii_lowercase()
        };
        assert_eq!(header(ACCESS_CONTROL_ALLOW_ORIGIN), "*");
        assert!(header(ACCESS_CONTROL_ALLOW_METHODS).contains("patch"));
        assert!(header(ACCESS_CONTROL_ALLOW_HEADERS).contains("authorization"));

        Ok(())
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn register_issues_a_working_session() -> TestResult {
        let ctx = TestContext::new().await?;
        let (status, body) = ctx
            .send(Method::POST, "/api/auth/register", None, None)
            .await?;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        let anonymous_id = body["user"]["anonymousId"].as_str().unwrap_or_default();
        assert_eq!(anonymous_id.len(), 16);
        assert!(body["user"]["displayName"]
            .as_str()
            .unwrap_or_default()
            .starts_with("User"));
        assert!(body["expiresAt"].is_string());

        let token = body["token"].as_str().unwrap_or_default();
        let (status, me) = ctx.send(Method::GET, "/api/auth/me", Some(token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["user"]["anonymousId"], anonymous_id);

        Ok(())
    }

    #[tokio::test]
    async fn protected_routes_require_a_session() -> TestResult {
        let ctx = TestContext::new().await?;

        let (status, body) = ctx.send(Method::GET, "/api/posts/feed", None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());

        let (status, _) = ctx
            .send(Method::GET, "/api/auth/me", Some("not-a-token"), None)
            .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        Ok(())
    }

    #[tokio::test]
    async fn device_token_and_logout() -> TestResult {
        let ctx = TestContext::new().await?;
        let session = ctx.register().await?;

        let (status, body) = ctx
            .send(
                Method::PUT,
                "/api/auth/device-token",
                Some(&session.token),
                Some(json!({"deviceToken": "apns-token-123"})),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["hasDeviceToken"], true);

        let (status, _) = ctx
            .send(Method::POST, "/api/auth/logout", Some(&session.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = ctx
            .send(Method::GET, "/api/auth/me", Some(&session.token), None)
            .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        Ok(())
    }
}

mod request_validation_tests {
    use super::*;

    #[tokio::test]
    async fn missing_body_fields_answer_bad_request() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;

        let (status, body) = ctx
            .send(Method::POST, "/api/likes/toggle", Some(&alice.token), Some(json!({})))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"]
            .as_str()
            .unwrap_or_default()
            .contains("postId"));

        let (status, body) = ctx
            .send(
                Method::POST,
                "/api/reactions/toggle",
                Some(&alice.token),
                Some(json!({"postId": "abc"})),
            )
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        Ok(())
    }

    #[tokio::test]
    async fn malformed_json_answers_bad_request() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/comments")
            .header(AUTHORIZATION, format!("Bearer {}", alice.token))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{\"postId\": "))?;
        let response = ctx.router().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await?.to_bytes();
        let body: Value = serde_json::from_slice(&bytes)?;
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());

        Ok(())
    }

    #[tokio::test]
    async fn bad_query_and_path_values_answer_bad_request() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;

        let (status, body) = ctx
            .send(Method::GET, "/api/posts/nearby?lng=13.4", Some(&alice.token), None)
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = ctx
            .send(Method::PATCH, "/api/notifications/read/latest", Some(&alice.token), None)
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        Ok(())
    }

    #[tokio::test]
    async fn authentication_runs_before_body_parsing() -> TestResult {
        let ctx = TestContext::new().await?;

        let (status, body) = ctx
            .send(Method::POST, "/api/likes/toggle", None, Some(json!({})))
            .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        Ok(())
    }
}

mod post_tests {
    use super::*;

    #[tokio::test]
    async fn create_and_list_posts() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;

        let (status, body) = ctx
            .send(
                Method::POST,
                "/api/posts",
                Some(&alice.token),
                Some(json!({"content": "  hello city  ", "category": "city"})),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["post"]["content"], "hello city");
        assert_eq!(body["post"]["author"]["anonymousId"], alice.anonymous_id);
        assert_eq!(body["post"]["reactionCounts"]["funny"], 0);

        let (status, feed) = ctx
            .send(Method::GET, "/api/posts/feed?limit=5", Some(&bob.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(feed["posts"].as_array().map(Vec::len), Some(1));
        assert_eq!(feed["pagination"]["limit"], 5);

        let uri = format!("/api/users/{}/posts", alice.anonymous_id);
        let (status, mine) = ctx.send(Method::GET, &uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine["posts"][0]["content"], "hello city");

        Ok(())
    }

    #[tokio::test]
    async fn rejects_empty_posts_and_profanity() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;

        let (status, body) = ctx
            .send(Method::POST, "/api/posts", Some(&alice.token), Some(json!({"content": "   "})))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = ctx
            .send(
                Method::POST,
                "/api/posts",
                Some(&alice.token),
                Some(json!({"content": "well damn"})),
            )
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        Ok(())
    }

    #[tokio::test]
    async fn one_time_posts_open_once_per_viewer() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;

        let post_id = ctx
            .create_post(&alice, json!({"content": "secret", "oneTime": {"enabled": true}}))
            .await?;

        let (_, feed) = ctx
            .send(Method::GET, "/api/posts/feed", Some(&bob.token), None)
            .await?;
        assert_eq!(feed["posts"][0]["oneTime"]["sealed"], true);
        assert!(feed["posts"][0]["content"].is_null());

        let uri = format!("/api/posts/{post_id}");
        let (status, body) = ctx.send(Method::GET, &uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["post"]["content"], "secret");

        let (status, _) = ctx.send(Method::GET, &uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::GONE);

        let (status, _) = ctx.send(Method::GET, &uri, Some(&alice.token), None).await?;
        assert_eq!(status, StatusCode::OK);

        let (_, feed) = ctx
            .send(Method::GET, "/api/posts/feed", Some(&bob.token), None)
            .await?;
        assert_eq!(feed["posts"].as_array().map(Vec::len), Some(0));

        Ok(())
    }

    #[tokio::test]
    async fn opened_one_time_posts_refuse_further_interaction() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;

        let post_id = ctx
            .create_post(&alice, json!({"content": "once", "oneTime": {"enabled": true}}))
            .await?;

        let uri = format!("/api/posts/{post_id}");
        let (status, _) = ctx.send(Method::GET, &uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::OK);

        let attempts = [
            (Method::POST, "/api/comments".to_string(), Some(json!({"postId": post_id, "text": "late"}))),
            (Method::POST, "/api/likes/toggle".to_string(), Some(json!({"postId": post_id}))),
            (
                Method::POST,
                "/api/reactions/toggle".to_string(),
                Some(json!({"postId": post_id, "reactionType": "love"})),
            ),
            (Method::GET, format!("/api/posts/{post_id}/comments"), None),
        ];
        for (method, uri, body) in attempts {
            let (status, payload) = ctx.send(method, &uri, Some(&bob.token), body).await?;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}: {payload}");
        }

        let (_, count) = ctx
            .send(Method::GET, "/api/notifications/unread/count", Some(&alice.token), None)
            .await?;
        assert_eq!(count["count"], 0);

        Ok(())
    }

    #[tokio::test]
    async fn vanished_posts_answer_gone() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;

        let post_id = ctx
            .create_post(
                &alice,
                json!({"content": "brief", "vanishMode": {"enabled": true, "duration": "1hour"}}),
            )
            .await?;

        sqlx::query("UPDATE posts SET vanish_at = '2000-01-01T00:00:00.000Z' WHERE public_id = ?")
            .bind(&post_id)
            .execute(&ctx.pool)
            .await?;

        let uri = format!("/api/posts/{post_id}");
        let (status, _) = ctx.send(Method::GET, &uri, Some(&alice.token), None).await?;
        assert_eq!(status, StatusCode::GONE);

        let (_, feed) = ctx
            .send(Method::GET, "/api/posts/feed", Some(&alice.token), None)
            .await?;
        assert_eq!(feed["posts"].as_array().map(Vec::len), Some(0));

        Ok(())
    }

    #[tokio::test]
    async fn nearby_returns_posts_within_radius() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;

        ctx.create_post(
            &alice,
            json!({"content": "near", "location": {"latitude": 52.52, "longitude": 13.405}}),
        )
        .await?;
        ctx.create_post(
            &alice,
            json!({"content": "far", "location": {"latitude": 48.8566, "longitude": 2.3522}}),
        )
        .await?;

        let (status, body) = ctx
            .send(
                Method::GET,
                "/api/posts/nearby?lat=52.5&lng=13.4&radiusKm=10",
                Some(&alice.token),
                None,
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        let posts = body["posts"].as_array().cloned().unwrap_or_default();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["content"], "near");
        assert!(posts[0]["distanceKm"].as_f64().unwrap_or(f64::MAX) < 10.0);
        assert_eq!(body["radiusKm"], 10.0);

        Ok(())
    }

    #[tokio::test]
    async fn only_the_author_deletes_a_post() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;
        let post_id = ctx.create_post(&alice, json!({"content": "mine"})).await?;

        let uri = format!("/api/posts/{post_id}");
        let (status, _) = ctx.send(Method::DELETE, &uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = ctx.send(Method::DELETE, &uri, Some(&alice.token), None).await?;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = ctx.send(Method::GET, &uri, Some(&alice.token), None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);

        Ok(())
    }
}

mod interaction_tests {
    use super::*;

    #[tokio::test]
    async fn likes_notify_the_author() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;
        let post_id = ctx.create_post(&alice, json!({"content": "like me"})).await?;

        let (status, body) = ctx
            .send(
                Method::POST,
                "/api/likes/toggle",
                Some(&bob.token),
                Some(json!({"postId": post_id})),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["likesCount"], 1);
        assert_eq!(body["isLiked"], true);

        let (_, count) = ctx
            .send(Method::GET, "/api/notifications/unread/count", Some(&alice.token), None)
            .await?;
        assert_eq!(count["count"], 1);

        let (_, unread) = ctx
            .send(Method::GET, "/api/notifications/unread", Some(&alice.token), None)
            .await?;
        assert_eq!(unread["notifications"][0]["type"], "like");
        assert_eq!(unread["notifications"][0]["sourceUser"], bob.anonymous_id);
        assert_eq!(unread["notifications"][0]["postId"], post_id);

        let (_, body) = ctx
            .send(
                Method::POST,
                "/api/likes/toggle",
                Some(&bob.token),
                Some(json!({"postId": post_id})),
            )
            .await?;
        assert_eq!(body["likesCount"], 0);
        assert_eq!(body["isLiked"], false);

        Ok(())
    }

    #[tokio::test]
    async fn reactions_toggle_and_validate_type() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;
        let post_id = ctx.create_post(&alice, json!({"content": "react"})).await?;

        let (status, body) = ctx
            .send(
                Method::POST,
                "/api/reactions/toggle",
                Some(&bob.token),
                Some(json!({"postId": post_id, "reactionType": "funny"})),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reactions"]["funny"], json!([bob.anonymous_id]));
        assert_eq!(body["reactions"]["love"], json!([]));
        assert_eq!(body["reactions"].as_object().map(|map| map.len()), Some(6));

        let (status, body) = ctx
            .send(
                Method::POST,
                "/api/reactions/toggle",
                Some(&bob.token),
                Some(json!({"postId": post_id, "reactionType": "meh"})),
            )
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid reaction type");

        Ok(())
    }

    #[tokio::test]
    async fn comments_respect_locks_and_ownership() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;
        let open = ctx.create_post(&alice, json!({"content": "talk"})).await?;
        let locked = ctx
            .create_post(
                &alice,
                json!({"content": "quiet", "interactions": {"commentsLocked": true}}),
            )
            .await?;

        let (status, body) = ctx
            .send(
                Method::POST,
                "/api/comments",
                Some(&bob.token),
                Some(json!({"postId": open, "text": "nice"})),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        let comment_id = body["comment"]["id"].as_str().unwrap_or_default().to_string();

        let (status, _) = ctx
            .send(
                Method::POST,
                "/api/comments",
                Some(&bob.token),
                Some(json!({"postId": locked, "text": "hello?"})),
            )
            .await?;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = ctx
            .send(
                Method::POST,
                "/api/comments",
                Some(&bob.token),
                Some(json!({"postId": open, "text": "  "})),
            )
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/api/posts/{open}/comments");
        let (_, list) = ctx.send(Method::GET, &uri, Some(&alice.token), None).await?;
        assert_eq!(list["comments"][0]["text"], "nice");
        assert_eq!(list["comments"][0]["isMine"], false);

        let uri = format!("/api/comments/{comment_id}");
        let (status, _) = ctx.send(Method::DELETE, &uri, Some(&alice.token), None).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = ctx.send(Method::DELETE, &uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::OK);

        Ok(())
    }

    #[tokio::test]
    async fn notifications_can_be_marked_read() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;
        let post_id = ctx.create_post(&alice, json!({"content": "ping"})).await?;

        for reaction in ["funny", "love"] {
            ctx.send(
                Method::POST,
                "/api/reactions/toggle",
                Some(&bob.token),
                Some(json!({"postId": post_id, "reactionType": reaction})),
            )
            .await?;
        }

        let (_, unread) = ctx
            .send(Method::GET, "/api/notifications/unread", Some(&alice.token), None)
            .await?;
        let first_id = unread["notifications"][0]["id"].as_i64().unwrap_or_default();

        let uri = format!("/api/notifications/read/{first_id}");
        let (status, _) = ctx.send(Method::PATCH, &uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = ctx.send(Method::PATCH, &uri, Some(&alice.token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notification"]["read"], true);

        let (_, body) = ctx
            .send(Method::PATCH, "/api/notifications/read-all", Some(&alice.token), None)
            .await?;
        assert_eq!(body["updated"], 1);

        Ok(())
    }
}

mod user_tests {
    use super::*;

    #[tokio::test]
    async fn echo_profile_and_search() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;

        let uri = format!("/api/users/{}/echo", alice.anonymous_id);
        let (status, body) = ctx.send(Method::POST, &uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isEchoing"], true);

        let (status, _) = ctx.send(Method::POST, &uri, Some(&alice.token), None).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let profile_uri = format!("/api/users/{}", alice.anonymous_id);
        let (status, profile) = ctx
            .send(Method::GET, &profile_uri, Some(&bob.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["user"]["echoesCount"], 1);
        assert_eq!(profile["user"]["isEchoing"], true);

        let (_, count) = ctx
            .send(Method::GET, "/api/notifications/unread/count", Some(&alice.token), None)
            .await?;
        assert_eq!(count["count"], 1);

        let search_uri = format!("/api/users/search?q={}", &alice.anonymous_id[..6]);
        let (status, found) = ctx.send(Method::GET, &search_uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert!(found["users"]
            .as_array()
            .map(|users| users.iter().any(|user| user["anonymousId"] == alice.anonymous_id.as_str()))
            .unwrap_or(false));

        let (status, body) = ctx.send(Method::DELETE, &uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isEchoing"], false);

        let (status, _) = ctx
            .send(Method::GET, "/api/users/ffffffffffffffff", Some(&bob.token), None)
            .await?;
        assert_eq!(status, StatusCode::NOT_FOUND);

        Ok(())
    }
}

mod chat_tests {
    use super::*;

    #[tokio::test]
    async fn direct_messages_flow() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;

        let uri = format!("/api/chat/{}/messages", bob.anonymous_id);
        let (status, body) = ctx
            .send(Method::POST, &uri, Some(&alice.token), Some(json!({"text": "hi bob"})))
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"]["isMine"], true);
        assert_eq!(body["message"]["recipientId"], bob.anonymous_id);

        let (_, conversations) = ctx
            .send(Method::GET, "/api/chat/conversations", Some(&bob.token), None)
            .await?;
        assert_eq!(conversations["conversations"][0]["peer"]["anonymousId"], alice.anonymous_id);
        assert_eq!(conversations["conversations"][0]["unreadCount"], 1);
        assert_eq!(conversations["conversations"][0]["lastMessage"]["text"], "hi bob");

        let history_uri = format!("/api/chat/{}/messages", alice.anonymous_id);
        let (_, history) = ctx.send(Method::GET, &history_uri, Some(&bob.token), None).await?;
        assert_eq!(history["messages"][0]["isMine"], false);

        let read_uri = format!("/api/chat/{}/read", alice.anonymous_id);
        let (status, body) = ctx.send(Method::PATCH, &read_uri, Some(&bob.token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], 1);

        let (_, unread) = ctx
            .send(Method::GET, "/api/notifications/unread", Some(&bob.token), None)
            .await?;
        assert_eq!(unread["notifications"][0]["type"], "message");

        Ok(())
    }

    #[tokio::test]
    async fn rejects_self_and_unknown_peers() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;

        let uri = format!("/api/chat/{}/messages", alice.anonymous_id);
        let (status, body) = ctx
            .send(Method::POST, &uri, Some(&alice.token), Some(json!({"text": "me"})))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "You cannot message yourself");

        let (status, _) = ctx
            .send(
                Method::POST,
                "/api/chat/0000000000000000/messages",
                Some(&alice.token),
                Some(json!({"text": "anyone?"})),
            )
            .await?;
        assert_eq!(status, StatusCode::NOT_FOUND);

        Ok(())
    }
}

mod media_tests {
    use super::*;

    async fn upload(
        ctx: &TestContext,
        token: &str,
        files: &[(&str, &str, &[u8])],
    ) -> TestResult<(StatusCode, Value)> {
        let boundary = "whisperwall-test-boundary";
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/media")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(multipart_body(boundary, files)))?;

        let response = ctx.router().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    #[tokio::test]
    async fn uploads_are_stored_and_served() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;

        let (status, body) = upload(&ctx, &alice.token, &[("photo.png", "image/png", &b"\x89PNG"[..])]).await?;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let file = &body["files"][0];
        assert_eq!(file["originalName"], "photo.png");
        assert_eq!(file["mimetype"], "image/png");
        assert_eq!(file["size"], 4);

        let filename = file["filename"].as_str().unwrap_or_default();
        assert!(ctx.temp_dir.path().join("uploads").join(filename).exists());

        let url = file["url"].as_str().unwrap_or_default();
        assert!(url.starts_with("/uploads/"));
        let response = ctx
            .router()
            .oneshot(Request::builder().uri(url).body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);

        Ok(())
    }

    #[tokio::test]
    async fn rejected_uploads_leave_no_files_behind() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let upload_dir = ctx.temp_dir.path().join("uploads");

        let (status, _) = upload(
            &ctx,
            &alice.token,
            &[("a.png", "image/png", &b"\x89PNG"[..]), ("b.txt", "text/plain", &b"notes"[..])],
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let six: Vec<(&str, &str, &[u8])> = (0..6).map(|_| ("a.png", "image/png", &b"x"[..])).collect();
        let (status, _) = upload(&ctx, &alice.token, &six).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let leftovers = match std::fs::read_dir(&upload_dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        };
        assert_eq!(leftovers, 0);

        Ok(())
    }

    #[tokio::test]
    async fn rejects_non_media_and_too_many_files() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;

        let (status, body) = upload(&ctx, &alice.token, &[("notes.txt", "text/plain", &b"hi"[..])]).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Only image, video and audio files are allowed");

        let six: Vec<(&str, &str, &[u8])> = (0..6).map(|_| ("a.png", "image/png", &b"x"[..])).collect();
        let (status, _) = upload(&ctx, &alice.token, &six).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        Ok(())
    }
}

mod realtime_tests {
    use super::*;

    #[tokio::test]
    async fn websocket_requires_a_session() -> TestResult {
        let ctx = TestContext::new().await?;

        let (status, body) = ctx.send(Method::GET, "/ws", None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = ctx.send(Method::GET, "/ws?token=bogus", None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let alice = ctx.register().await?;
        let uri = format!("/ws?token={}", alice.token);
        let (status, _) = ctx.send(Method::GET, &uri, None, None).await?;
        assert_eq!(status, StatusCode::UPGRADE_REQUIRED);

        Ok(())
    }

    #[tokio::test]
    async fn notifications_and_messages_are_pushed_live() -> TestResult {
        let ctx = TestContext::new().await?;
        let alice = ctx.register().await?;
        let bob = ctx.register().await?;
        let mut alice_events = ctx.state.subscribe(ctx.user_id(&alice).await?).await;

        let post_id = ctx.create_post(&alice, json!({"content": "live"})).await?;
        ctx.send(
            Method::POST,
            "/api/likes/toggle",
            Some(&bob.token),
            Some(json!({"postId": post_id})),
        )
        .await?;

        match alice_events.recv().await? {
            ServerEvent::Notification { notification } => {
                assert_eq!(notification.kind, "like");
                assert_eq!(notification.source_user, bob.anonymous_id);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let uri = format!("/api/chat/{}/messages", alice.anonymous_id);
        ctx.send(Method::POST, &uri, Some(&bob.token), Some(json!({"text": "psst"})))
            .await?;

        match alice_events.recv().await? {
            ServerEvent::ChatMessage { message } => {
                assert_eq!(message.text, "psst");
                assert_eq!(message.sender_id, bob.anonymous_id);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match alice_events.recv().await? {
            ServerEvent::Notification { notification } => assert_eq!(notification.kind, "message"),
            other => panic!("unexpected event {other:?}"),
        }

        Ok(())
    }
}
