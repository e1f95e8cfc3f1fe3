//! Translation graph: posts linked to the original they translate.
//!
//! Links are kept a flat star (one root, many translations). A link is
//! refused when it would point a post at itself, at another translation, or
//! turn a post that already has translations into a translation.

use sqlx::PgConnection;

use crate::db::models::TranslationRef;
use crate::error::{AppError, Result};

const TRANSLATION_COLUMNS: &str = "id, title, slug, language_id, original_post_id";

/// Checks a proposed `post_id -> target` link against the star shape.
/// `post_id` is `None` while the post is still being created.
pub fn check_translation_link(
    post_id: Option<i64>,
    target: &TranslationRef,
    post_has_translations: bool,
) -> Result<()> {
    if post_id == Some(target.id) {
        return Err(AppError::BadRequest(
            "A post cannot be a translation of itself".to_string(),
        ));
    }
    if target.original_post_id.is_some() {
        return Err(AppError::BadRequest(
            "The original post is itself a translation; link to its original instead".to_string(),
        ));
    }
    if post_has_translations {
        return Err(AppError::BadRequest(
            "A post that has translations cannot become a translation".to_string(),
        ));
    }
    Ok(())
}

/// Reads the link target with a share lock held until the caller's
/// transaction ends, so it cannot become a translation in the meantime.
async fn lock_ref(conn: &mut PgConnection, id: i64) -> Result<Option<TranslationRef>> {
    let sql = format!("SELECT {} FROM posts WHERE id = $1 FOR SHARE", TRANSLATION_COLUMNS);
    let found = sqlx::query_as::<_, TranslationRef>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found)
}

/// Validates linking `post_id` (if it exists yet) to `original_id`.
pub async fn validate_original(
    conn: &mut PgConnection,
    post_id: Option<i64>,
    original_id: i64,
) -> Result<()> {
    let target = lock_ref(conn, original_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Original post not found".to_string()))?;

    let has_translations = match post_id {
        Some(id) => {
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM posts WHERE original_post_id = $1)",
            )
            .bind(id)
            .fetch_one(&mut *conn)
            .await?
        }
        None => false,
    };

    check_translation_link(post_id, &target, has_translations)
}

/// All translations whose original is one of `original_ids`.
pub async fn translations_of(
    conn: &mut PgConnection,
    original_ids: &[i64],
) -> Result<Vec<TranslationRef>> {
    if original_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM posts WHERE original_post_id = ANY($1) ORDER BY language_id, id",
        TRANSLATION_COLUMNS
    );
    let refs = sqlx::query_as::<_, TranslationRef>(&sql)
        .bind(original_ids)
        .fetch_all(&mut *conn)
        .await?;

    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: i64, original: Option<i64>) -> TranslationRef {
        TranslationRef {
            id,
            title: format!("post {}", id),
            slug: format!("post-{}", id),
            language_id: 1,
            original_post_id: original,
        }
    }

    #[test]
    fn test_link_to_root_is_accepted() {
        assert!(check_translation_link(None, &target(1, None), false).is_ok());
        assert!(check_translation_link(Some(2), &target(1, None), false).is_ok());
    }

    #[test]
    fn test_self_link_is_rejected() {
        let err = check_translation_link(Some(1), &target(1, None), false).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_chain_through_translation_is_rejected() {
        let err = check_translation_link(Some(3), &target(2, Some(1)), false).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_root_with_translations_cannot_be_relinked() {
        let err = check_translation_link(Some(1), &target(5, None), true).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
