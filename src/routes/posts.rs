/**
 * Post Routes
 * Listing, CRUD, search, translations and statistics for blog posts
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{flag, parse_param, parse_path, require_pool, DataResponse};
use crate::auth::authenticate;
use crate::error::{AppError, Result};
use crate::services::post_query::{self, PostListOptions, DEFAULT_LIMIT, DEFAULT_PAGE};
use crate::services::post_write::{self, NewPost, UpdatePost};
use crate::services::stats::{self, parse_date_param, DashboardOptions, DateRangeOptions, StatsFilter};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters shared by every post listing. Values stay strings until
/// [`PostListQuery::into_options`] so malformed input answers with our 400 body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub q: Option<String>,
    #[serde(alias = "categoryId")]
    pub category: Option<String>,
    #[serde(alias = "languageId")]
    pub language: Option<String>,
    #[serde(alias = "userId")]
    pub user: Option<String>,
    pub order_by: Option<String>,
    pub order: Option<String>,
    pub include_relations: Option<String>,
    pub original_post: Option<String>,
    pub from_original_post_id: Option<String>,
}

impl PostListQuery {
    pub fn into_options(self) -> Result<PostListOptions> {
        let options = PostListOptions {
            page: parse_param(self.page.as_deref(), "page")?.unwrap_or(DEFAULT_PAGE),
            limit: parse_param(self.limit.as_deref(), "limit")?.unwrap_or(DEFAULT_LIMIT),
            search: self.search,
            category_id: parse_param(self.category.as_deref(), "category")?,
            language_id: parse_param(self.language.as_deref(), "language")?,
            user_id: parse_param::<Uuid>(self.user.as_deref(), "user")?,
            order_by: parse_param(self.order_by.as_deref(), "orderBy")?.unwrap_or_default(),
            order: parse_param(self.order.as_deref(), "order")?.unwrap_or_default(),
            include_relations: flag(self.include_relations.as_deref()),
            original_post: flag(self.original_post.as_deref()),
            from_original_post_id: parse_param(
                self.from_original_post_id.as_deref(),
                "fromOriginalPostId",
            )?,
        };
        options.normalized()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    pub view: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub group_by: Option<String>,
    #[serde(alias = "languageId")]
    pub language: Option<String>,
    #[serde(alias = "categoryId")]
    pub category: Option<String>,
    #[serde(alias = "userId")]
    pub user: Option<String>,
    pub include_total: Option<String>,
}

impl StatsQuery {
    fn dates(&self) -> Result<(Option<chrono::DateTime<chrono::Utc>>, Option<chrono::DateTime<chrono::Utc>>)> {
        let start = match self.start_date.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(parse_date_param(raw, false)?),
            None => None,
        };
        let end = match self.end_date.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(parse_date_param(raw, true)?),
            None => None,
        };
        Ok((start, end))
    }

    pub fn into_date_range(self) -> Result<DateRangeOptions> {
        let (start_date, end_date) = self.dates()?;
        Ok(DateRangeOptions {
            start_date,
            end_date,
            group_by: parse_param(self.group_by.as_deref(), "groupBy")?.unwrap_or_default(),
            filter: StatsFilter {
                language_id: parse_param(self.language.as_deref(), "language")?,
                category_id: parse_param(self.category.as_deref(), "category")?,
                user_id: parse_param(self.user.as_deref(), "user")?,
            },
            include_total: flag(self.include_total.as_deref()),
        })
    }

    pub fn into_dashboard(self) -> Result<DashboardOptions> {
        let (start_date, end_date) = self.dates()?;
        Ok(DashboardOptions {
            start_date,
            end_date,
            group_by: parse_param(self.group_by.as_deref(), "groupBy")?.unwrap_or_default(),
        })
    }
}

/// Body of a successful delete
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: bool,
    pub id: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/posts - List posts with filters and pagination
pub async fn list_posts(Query(query): Query<PostListQuery>) -> Result<impl IntoResponse> {
    let options = query.into_options()?;
    let pool = require_pool()?;
    let page = post_query::get_all_posts(&pool, options).await?;
    Ok(Json(page))
}

/// GET /api/posts/{id} - Single post by id or slug; `?view=true` counts a view
pub async fn get_post(
    Path(identifier): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Result<impl IntoResponse> {
    let pool = require_pool()?;
    let post =
        post_query::get_post_by_id_or_slug(&pool, &identifier, flag(query.view.as_deref())).await?;
    Ok(Json(DataResponse::new(post)))
}

/// POST /api/posts - Create a post owned by the caller
pub async fn create_post(headers: HeaderMap, Json(body): Json<NewPost>) -> Result<impl IntoResponse> {
    let actor = authenticate(&headers)?;
    let pool = require_pool()?;
    let post = post_write::create_post(&pool, body, &actor).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(post))))
}

/// PUT /api/posts/{id} - Partial update; owner or admin only
pub async fn update_post(
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdatePost>,
) -> Result<impl IntoResponse> {
    let id: i64 = parse_path(&id, "id")?;
    let actor = authenticate(&headers)?;
    let pool = require_pool()?;
    let post = post_write::update_post(&pool, id, body, &actor).await?;
    Ok(Json(DataResponse::new(post)))
}

/// DELETE /api/posts/{id} - owner or admin only
pub async fn delete_post(Path(id): Path<String>, headers: HeaderMap) -> Result<impl IntoResponse> {
    let id: i64 = parse_path(&id, "id")?;
    let actor = authenticate(&headers)?;
    let pool = require_pool()?;
    post_write::delete_post(&pool, id, &actor).await?;
    Ok(Json(DataResponse::new(DeletedResponse { deleted: true, id })))
}

/// GET /api/posts/category/{categoryId}
pub async fn posts_by_category(
    Path(category_id): Path<String>,
    Query(query): Query<PostListQuery>,
) -> Result<impl IntoResponse> {
    let category_id: i64 = parse_path(&category_id, "categoryId")?;
    let options = query.into_options()?;
    let pool = require_pool()?;
    Ok(Json(post_query::get_posts_by_category(&pool, category_id, options).await?))
}

/// GET /api/posts/user/{userId}
pub async fn posts_by_user(
    Path(user_id): Path<String>,
    Query(query): Query<PostListQuery>,
) -> Result<impl IntoResponse> {
    let user_id: Uuid = parse_path(&user_id, "userId")?;
    let options = query.into_options()?;
    let pool = require_pool()?;
    Ok(Json(post_query::get_posts_by_user(&pool, user_id, options).await?))
}

/// GET /api/posts/search?q=
pub async fn search_posts(Query(mut query): Query<PostListQuery>) -> Result<impl IntoResponse> {
    let term = query.q.take().or_else(|| query.search.take()).unwrap_or_default();
    if term.trim().is_empty() {
        return Err(AppError::BadRequest("Search query is required".to_string()));
    }
    let options = query.into_options()?;
    let pool = require_pool()?;
    Ok(Json(post_query::search_posts(&pool, &term, options).await?))
}

/// GET /api/posts/original/{originalPostId} - Translations of a post
pub async fn post_translations(
    Path(original_post_id): Path<String>,
    Query(query): Query<PostListQuery>,
) -> Result<impl IntoResponse> {
    let original_post_id: i64 = parse_path(&original_post_id, "originalPostId")?;
    let options = query.into_options()?;
    let pool = require_pool()?;
    Ok(Json(post_query::get_translations(&pool, original_post_id, options).await?))
}

/// GET /api/posts/stats/date-range
pub async fn stats_date_range(Query(query): Query<StatsQuery>) -> Result<impl IntoResponse> {
    let options = query.into_date_range()?;
    let pool = require_pool()?;
    let stats = stats::get_posts_by_date_range(&pool, options).await?;
    Ok(Json(DataResponse::new(stats)))
}

/// GET /api/posts/stats/dashboard
pub async fn stats_dashboard(Query(query): Query<StatsQuery>) -> Result<impl IntoResponse> {
    let options = query.into_dashboard()?;
    let pool = require_pool()?;
    let stats = stats::get_post_stats(&pool, options).await?;
    Ok(Json(DataResponse::new(stats)))
}
