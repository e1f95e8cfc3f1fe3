/**
 * Language Routes
 */
use axum::{extract::Query, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;

use super::{flag, require_pool, DataResponse};
use crate::auth::authenticate;
use crate::error::Result;
use crate::services::languages::{self, NewLanguage};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageQuery {
    pub active: Option<String>,
}

/// GET /api/languages - `?active=true` hides disabled locales
pub async fn list_languages(Query(query): Query<LanguageQuery>) -> Result<impl IntoResponse> {
    let pool = require_pool()?;
    let languages = languages::list_languages(&pool, flag(query.active.as_deref())).await?;
    Ok(Json(DataResponse::new(languages)))
}

/// POST /api/languages
pub async fn create_language(
    headers: HeaderMap,
    Json(body): Json<NewLanguage>,
) -> Result<impl IntoResponse> {
    authenticate(&headers)?;
    let pool = require_pool()?;
    let language = languages::create_language(&pool, body).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(language))))
}
