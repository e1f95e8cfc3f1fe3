//! Shared fixtures for the database integration tests.
//!
//! Tests connect to TEST_DATABASE_URL (falling back to DATABASE_URL) and
//! return early when neither is set. Every fixture name carries a fresh
//! UUID so tests can share one database and run in parallel.

#![allow(dead_code)]

use blog_backend::auth::Actor;
use blog_backend::db::{self, DbConfig};
use blog_backend::services::post_write::NewPost;
use blog_backend::services::taxonomy::{self, NewCategory};
use sqlx::PgPool;
use uuid::Uuid;

pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

pub async fn test_pool() -> Option<PgPool> {
    let Some(url) = test_database_url() else {
        eprintln!("skipping: TEST_DATABASE_URL / DATABASE_URL not set");
        return None;
    };

    let config = DbConfig {
        url,
        max_connections: 5,
        min_connections: 0,
        ..DbConfig::default()
    };
    let pool = db::connect(&config)
        .await
        .expect("Failed to connect to test database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    Some(pool)
}

pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

pub async fn create_user(pool: &PgPool, role: &str) -> Actor {
    let user_id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, display_name, role) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(format!("{}@example.com", unique("user")))
    .bind("Test User")
    .bind(role)
    .fetch_one(pool)
    .await
    .expect("insert user");

    Actor {
        user_id,
        role: role.to_string(),
    }
}

pub async fn create_language(pool: &PgPool) -> i64 {
    sqlx::query_scalar("INSERT INTO languages (locale, name) VALUES ($1, $2) RETURNING id")
        .bind(unique("xx"))
        .bind("Test Language")
        .fetch_one(pool)
        .await
        .expect("insert language")
}

pub async fn create_category(pool: &PgPool, parent_id: Option<i64>) -> i64 {
    taxonomy::create_category(
        pool,
        NewCategory {
            name: unique("category"),
            slug: None,
            parent_id,
        },
    )
    .await
    .expect("create category")
    .id
}

pub fn new_post(language_id: i64, categories: Vec<i64>) -> NewPost {
    NewPost {
        title: unique("Post"),
        slug: None,
        summary: Some("Short abstract".to_string()),
        content: "<p>Body</p>".to_string(),
        description: Some("Description".to_string()),
        language_id,
        original_post_id: None,
        categories,
    }
}
