//! Blog Backend - library for app logic and testing

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod routes;
pub mod services;

use axum::{
    http::Method,
    middleware,
    routing::{get, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use crate::config::ServerConfig;

/// CORS restricted to the configured frontend origins.
pub fn configure_cors(config: &ServerConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(config.origin_headers())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(config: &ServerConfig) -> Router {
    let cors = configure_cors(config);
    tracing::info!(origins = ?config.allowed_origins, "CORS configured");

    Router::new()
        .route(
            "/api/posts",
            get(routes::posts::list_posts).post(routes::posts::create_post),
        )
        .route("/api/posts/search", get(routes::posts::search_posts))
        .route(
            "/api/posts/stats/date-range",
            get(routes::posts::stats_date_range),
        )
        .route(
            "/api/posts/stats/dashboard",
            get(routes::posts::stats_dashboard),
        )
        .route(
            "/api/posts/category/{category_id}",
            get(routes::posts::posts_by_category),
        )
        .route("/api/posts/user/{user_id}", get(routes::posts::posts_by_user))
        .route(
            "/api/posts/original/{original_post_id}",
            get(routes::posts::post_translations),
        )
        .route(
            "/api/posts/{id}",
            get(routes::posts::get_post)
                .put(routes::posts::update_post)
                .delete(routes::posts::delete_post),
        )
        .route(
            "/api/categories",
            get(routes::categories::list_categories).post(routes::categories::create_category),
        )
        .route(
            "/api/categories/{id}",
            put(routes::categories::update_category).delete(routes::categories::delete_category),
        )
        .route(
            "/api/languages",
            get(routes::languages::list_languages).post(routes::languages::create_language),
        )
        .route("/health", get(routes::health::health_ping))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/ready", get(routes::health::health_ready))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br/zstd automatically
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .layer(cors)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the programme's lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init(&logging::LogConfig::from_env());

    routes::health::init_start_time();

    let config = ServerConfig::from_env();

    // Refuse to start in production with the insecure default JWT secret.
    if config.is_production() && auth::uses_default_secret() {
        panic!(
            "FATAL: JWT_SECRET must be set to a secure, unique value in production. \
             Refusing to start with the default secret."
        );
    }

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Post endpoints will answer 503.",
                    e
                );
            }
        }
    } else {
        tracing::warn!("DATABASE_URL not set. Post endpoints will answer 503.");
    }

    let app = create_app(&config);

    let addr = config.bind_addr().expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_static_routes_win_over_post_identifier() {
        let app = create_app(&ServerConfig::default());

        // Resolved by the search handler (400), not by GET /api/posts/{id} (503).
        let req = Request::get("/api/posts/search").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let app = create_app(&ServerConfig::default());
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let config = ServerConfig {
            body_limit_bytes: 16,
            ..ServerConfig::default()
        };
        let app = create_app(&config);
        let req = Request::post("/api/posts")
            .header("content-type", "application/json")
            .header("content-length", "64")
            .body(Body::from("x".repeat(64)))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
