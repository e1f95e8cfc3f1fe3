/**
 * Category Routes
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use super::{parse_path, require_pool, DataResponse};
use crate::auth::authenticate;
use crate::error::Result;
use crate::services::taxonomy::{self, NewCategory, UpdateCategory};

/// GET /api/categories
pub async fn list_categories() -> Result<impl IntoResponse> {
    let pool = require_pool()?;
    let categories = taxonomy::list_categories(&pool).await?;
    Ok(Json(DataResponse::new(categories)))
}

/// POST /api/categories
pub async fn create_category(
    headers: HeaderMap,
    Json(body): Json<NewCategory>,
) -> Result<impl IntoResponse> {
    authenticate(&headers)?;
    let pool = require_pool()?;
    let category = taxonomy::create_category(&pool, body).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(category))))
}

/// PUT /api/categories/{id}
pub async fn update_category(
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateCategory>,
) -> Result<impl IntoResponse> {
    let id: i64 = parse_path(&id, "id")?;
    authenticate(&headers)?;
    let pool = require_pool()?;
    let category = taxonomy::update_category(&pool, id, body).await?;
    Ok(Json(DataResponse::new(category)))
}

/// DELETE /api/categories/{id}
pub async fn delete_category(Path(id): Path<String>, headers: HeaderMap) -> Result<impl IntoResponse> {
    let id: i64 = parse_path(&id, "id")?;
    authenticate(&headers)?;
    let pool = require_pool()?;
    taxonomy::delete_category(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
