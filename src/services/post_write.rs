//! Post writes. Each operation is one transaction over the post row and its
//! category associations; an early `?` drops the transaction, which rolls it
//! back before the error reaches the caller.

use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::{
    distinct_ids, double_option, languages, post_query, required_text, resolve_slug, taxonomy,
    translations,
};
use crate::auth::Actor;
use crate::db::models::{Post, PostView, POST_COLUMNS};
use crate::error::{AppError, Result};

/// Request body for creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, rename = "abstract")]
    pub summary: Option<String>,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(alias = "languageId")]
    pub language_id: i64,
    #[serde(default, alias = "originalPostId")]
    pub original_post_id: Option<i64>,
    #[serde(default, alias = "categoryIds")]
    pub categories: Vec<i64>,
}

/// Request body for updating a post; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePost {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, rename = "abstract")]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "languageId")]
    pub language_id: Option<i64>,
    /// `null` unlinks the post from its original.
    #[serde(default, alias = "originalPostId", deserialize_with = "double_option")]
    pub original_post_id: Option<Option<i64>>,
    /// Complete desired category set.
    #[serde(default, alias = "categoryIds")]
    pub categories: Option<Vec<i64>>,
}

/// Association changes needed to move from one category set to another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryDiff {
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
}

impl CategoryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn diff_categories(current: &[i64], desired: &[i64]) -> CategoryDiff {
    let current: BTreeSet<i64> = current.iter().copied().collect();
    let desired: BTreeSet<i64> = desired.iter().copied().collect();

    CategoryDiff {
        added: desired.difference(&current).copied().collect(),
        removed: current.difference(&desired).copied().collect(),
    }
}

/// Sanitize HTML content using ammonia
fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

async fn ensure_title_available(conn: &mut PgConnection, title: &str, except: Option<i64>) -> Result<()> {
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM posts WHERE title = $1 AND ($2::bigint IS NULL OR id <> $2))",
    )
    .bind(title)
    .bind(except)
    .fetch_one(&mut *conn)
    .await?;

    if taken {
        return Err(AppError::Conflict("A post with this title already exists".to_string()));
    }
    Ok(())
}

async fn ensure_slug_available(conn: &mut PgConnection, slug: &str, except: Option<i64>) -> Result<()> {
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM posts WHERE slug = $1 AND ($2::bigint IS NULL OR id <> $2))",
    )
    .bind(slug)
    .bind(except)
    .fetch_one(&mut *conn)
    .await?;

    if taken {
        return Err(AppError::Conflict("A post with this slug already exists".to_string()));
    }
    Ok(())
}

async fn ensure_categories_exist(conn: &mut PgConnection, ids: &[i64]) -> Result<()> {
    let missing = taxonomy::missing_categories(conn, ids).await?;
    if !missing.is_empty() {
        tracing::debug!(missing = ?missing, "unknown category ids");
        return Err(AppError::NotFound(
            "One or more categories do not exist".to_string(),
        ));
    }
    Ok(())
}

async fn insert_associations(conn: &mut PgConnection, post_id: i64, category_ids: &[i64]) -> Result<()> {
    if category_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO post_categories (post_id, category_id)
        SELECT $1, UNNEST($2::bigint[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(post_id)
    .bind(category_ids)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Brings the post's associations to exactly `desired`, touching only the
/// rows that change. Caller holds the post row lock.
async fn sync_categories(conn: &mut PgConnection, post_id: i64, desired: &[i64]) -> Result<CategoryDiff> {
    let desired = distinct_ids(desired);
    ensure_categories_exist(conn, &desired).await?;

    let current = sqlx::query_scalar::<_, i64>(
        "SELECT category_id FROM post_categories WHERE post_id = $1",
    )
    .bind(post_id)
    .fetch_all(&mut *conn)
    .await?;

    let diff = diff_categories(&current, &desired);

    if !diff.removed.is_empty() {
        sqlx::query("DELETE FROM post_categories WHERE post_id = $1 AND category_id = ANY($2)")
            .bind(post_id)
            .bind(&diff.removed)
            .execute(&mut *conn)
            .await?;
    }
    insert_associations(conn, post_id, &diff.added).await?;

    Ok(diff)
}

pub async fn create_post(pool: &PgPool, input: NewPost, owner: &Actor) -> Result<PostView> {
    let title = required_text(&input.title, "Title")?;
    let content = required_text(&input.content, "Content")?;
    let slug = resolve_slug(input.slug, &title)?;
    let category_ids = distinct_ids(&input.categories);

    let mut tx = pool.begin().await?;

    ensure_title_available(&mut tx, &title, None).await?;
    ensure_slug_available(&mut tx, &slug, None).await?;
    languages::ensure_language_exists(&mut tx, input.language_id).await?;
    if let Some(original_id) = input.original_post_id {
        translations::validate_original(&mut tx, None, original_id).await?;
    }
    ensure_categories_exist(&mut tx, &category_ids).await?;

    let post_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO posts (user_id, title, "abstract", content, description, slug, language_id, original_post_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(owner.user_id)
    .bind(&title)
    .bind(&input.summary)
    .bind(sanitize_html(&content))
    .bind(&input.description)
    .bind(&slug)
    .bind(input.language_id)
    .bind(input.original_post_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(AppError::from_unique_violation)?;

    insert_associations(&mut tx, post_id, &category_ids).await?;

    tx.commit().await?;

    tracing::info!(
        post_id,
        user_id = %owner.user_id,
        categories = category_ids.len(),
        "post created"
    );

    post_query::fetch_post_view(pool, post_id).await
}

async fn lock_post(conn: &mut PgConnection, id: i64) -> Result<Post> {
    let sql = format!("SELECT {} FROM posts p WHERE p.id = $1 FOR UPDATE", POST_COLUMNS);
    sqlx::query_as::<_, Post>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
}

pub async fn update_post(pool: &PgPool, id: i64, input: UpdatePost, actor: &Actor) -> Result<PostView> {
    let mut tx = pool.begin().await?;

    let existing = lock_post(&mut tx, id).await?;
    actor.ensure_can_modify(existing.user_id)?;

    let title = match input.title {
        Some(title) => {
            let title = required_text(&title, "Title")?;
            if title != existing.title {
                ensure_title_available(&mut tx, &title, Some(id)).await?;
            }
            title
        }
        None => existing.title,
    };

    let slug = match input.slug {
        Some(slug) => {
            let slug = resolve_slug(Some(slug), &title)?;
            if slug != existing.slug {
                ensure_slug_available(&mut tx, &slug, Some(id)).await?;
            }
            slug
        }
        None => existing.slug,
    };

    let content = match input.content {
        Some(content) => sanitize_html(&required_text(&content, "Content")?),
        None => existing.content,
    };

    let language_id = match input.language_id {
        Some(language_id) if language_id != existing.language_id => {
            languages::ensure_language_exists(&mut tx, language_id).await?;
            language_id
        }
        _ => existing.language_id,
    };

    let original_post_id = match input.original_post_id {
        Some(Some(original_id)) if Some(original_id) != existing.original_post_id => {
            translations::validate_original(&mut tx, Some(id), original_id).await?;
            Some(original_id)
        }
        Some(link) => link,
        None => existing.original_post_id,
    };

    sqlx::query(
        r#"
        UPDATE posts
        SET title = $1, slug = $2, "abstract" = $3, content = $4, description = $5,
            language_id = $6, original_post_id = $7, updated_at = now()
        WHERE id = $8
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(input.summary.or(existing.summary))
    .bind(&content)
    .bind(input.description.or(existing.description))
    .bind(language_id)
    .bind(original_post_id)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(AppError::from_unique_violation)?;

    let diff = match input.categories {
        Some(categories) => sync_categories(&mut tx, id, &categories).await?,
        None => CategoryDiff::default(),
    };

    tx.commit().await?;

    tracing::info!(
        post_id = id,
        user_id = %actor.user_id,
        categories_added = diff.added.len(),
        categories_removed = diff.removed.len(),
        "post updated"
    );

    post_query::fetch_post_view(pool, id).await
}

pub async fn delete_post(pool: &PgPool, id: i64, actor: &Actor) -> Result<()> {
    let mut tx = pool.begin().await?;

    let owner_id = sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM posts WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    actor.ensure_can_modify(owner_id)?;

    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(post_id = id, user_id = %actor.user_id, "post deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_replaces_whole_set() {
        let diff = diff_categories(&[1, 2, 3], &[3, 4]);
        assert_eq!(diff.added, vec![4]);
        assert_eq!(diff.removed, vec![1, 2]);
    }

    #[test]
    fn test_diff_to_empty_removes_everything() {
        let diff = diff_categories(&[5, 6], &[]);
        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, vec![5, 6]);
    }

    #[test]
    fn test_diff_same_set_is_noop() {
        assert!(diff_categories(&[2, 1], &[1, 2, 2]).is_empty());
    }

    #[test]
    fn test_new_post_accepts_snake_and_camel_keys() {
        let snake: NewPost = serde_json::from_str(
            r#"{"title":"T","content":"C","language_id":1,"categories":[1,1,2]}"#,
        )
        .unwrap();
        let camel: NewPost =
            serde_json::from_str(r#"{"title":"T","content":"C","languageId":1,"originalPostId":9}"#)
                .unwrap();
        assert_eq!(snake.language_id, 1);
        assert_eq!(snake.categories, vec![1, 1, 2]);
        assert_eq!(camel.original_post_id, Some(9));
        assert!(camel.categories.is_empty());
    }

    #[test]
    fn test_update_post_distinguishes_unlink_from_absent() {
        let untouched: UpdatePost = serde_json::from_str(r#"{"title":"New"}"#).unwrap();
        let unlink: UpdatePost = serde_json::from_str(r#"{"original_post_id":null}"#).unwrap();
        let clear: UpdatePost = serde_json::from_str(r#"{"categories":[]}"#).unwrap();
        assert_eq!(untouched.original_post_id, None);
        assert_eq!(untouched.categories, None);
        assert_eq!(unlink.original_post_id, Some(None));
        assert_eq!(clear.categories, Some(vec![]));
    }

    #[test]
    fn test_sanitize_strips_scripts() {
        let clean = sanitize_html("<p>hi</p><script>alert(1)</script>");
        assert!(clean.contains("<p>hi</p>"));
        assert!(!clean.contains("script"));
    }
}
