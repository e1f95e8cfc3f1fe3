use serde::Deserialize;
use sqlx::{PgConnection, PgPool};

use super::required_text;
use crate::db::models::Language;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLanguage {
    pub locale: String,
    pub name: String,
    #[serde(default = "default_active", alias = "is_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

pub async fn list_languages(pool: &PgPool, active_only: bool) -> Result<Vec<Language>> {
    let languages = sqlx::query_as::<_, Language>(
        r#"
        SELECT id, locale, name, is_active
        FROM languages
        WHERE (NOT $1 OR is_active)
        ORDER BY id
        "#,
    )
    .bind(active_only)
    .fetch_all(pool)
    .await?;

    Ok(languages)
}

pub async fn ensure_language_exists(conn: &mut PgConnection, id: i64) -> Result<()> {
    let found = sqlx::query_scalar::<_, i64>("SELECT id FROM languages WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound("Language not found".to_string())),
    }
}

pub async fn create_language(pool: &PgPool, input: NewLanguage) -> Result<Language> {
    let locale = required_text(&input.locale, "Locale")?;
    let name = required_text(&input.name, "Name")?;

    let language = sqlx::query_as::<_, Language>(
        r#"
        INSERT INTO languages (locale, name, is_active)
        VALUES ($1, $2, $3)
        RETURNING id, locale, name, is_active
        "#,
    )
    .bind(&locale)
    .bind(&name)
    .bind(input.is_active)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_unique_violation)?;

    tracing::info!(language_id = language.id, locale = %language.locale, "language created");
    Ok(language)
}
