//! Test utilities for service layer testing

use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqliteJournalMode, SqlitePool};
use tempfile::TempDir;
use whisperwall_auth::{timestamp, User};

use crate::routes::models::CreatePostRequest;
use crate::services::post;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../database/migrations");

/// Creates a test database with the full schema applied
pub async fn create_test_db() -> (SqlitePool, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");

    let connect_options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Memory)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(connect_options)
        .await
        .expect("Failed to create test database");

    MIGRATOR.run(&pool).await.expect("Failed to run migrations");

    (pool, temp_dir)
}

/// Creates a test user in the database
pub async fn create_test_user(
    pool: &SqlitePool,
    anonymous_id: &str,
    display_name: &str,
) -> Result<User, sqlx::Error> {
    let now = timestamp(Utc::now());

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (anonymous_id, display_name, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(anonymous_id)
    .bind(display_name)
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await?;

    Ok(User {
        id,
        anonymous_id: anonymous_id.to_string(),
        display_name: display_name.to_string(),
        device_token: None,
        created_at: now,
    })
}

/// Creates a plain text post and returns its public id
pub async fn create_text_post(pool: &SqlitePool, author: &User, content: &str) -> String {
    let request = CreatePostRequest {
        content: Some(content.to_string()),
        ..Default::default()
    };

    post::create_post(pool, author, request, Utc::now())
        .await
        .expect("Failed to create test post")
        .id
}

/// Test fixtures and common data
pub mod fixtures {
    pub const ALICE_ID: &str = "a11ce0000000000a";
    pub const ALICE_NAME: &str = "User1001";
    pub const BOB_ID: &str = "b0b0000000000000";
    pub const BOB_NAME: &str = "User2002";
    pub const CAROL_ID: &str = "ca401000000000c0";
    pub const CAROL_NAME: &str = "User3003";
}
