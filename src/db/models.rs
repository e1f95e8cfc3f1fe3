//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Column list for `posts p`, shared by every query that maps into [`Post`].
pub const POST_COLUMNS: &str = r#"p.id, p.user_id, p.title, p."abstract", p.content, p.description, p.slug, p.views, p.language_id, p.original_post_id, p.created_at, p.updated_at"#;

/// Post model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub summary: Option<String>,
    pub content: String,
    pub description: Option<String>,
    pub slug: String,
    pub views: i64,
    pub language_id: i64,
    pub original_post_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public projection of the owning user
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOwner {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}

/// Language model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    pub id: i64,
    pub locale: String,
    pub name: String,
    pub is_active: bool,
}

/// Category model
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<i64>,
}

/// Category joined through `post_categories`, tagged with the post it belongs to
#[derive(Debug, Clone, FromRow)]
pub struct PostCategoryRow {
    pub post_id: i64,
    #[sqlx(flatten)]
    pub category: Category,
}

/// Comment model (read-only here)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Lightweight reference to a post inside the translation graph
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRef {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub language_id: i64,
    pub original_post_id: Option<i64>,
}

/// Post together with whichever relations the caller asked for
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<PostOwner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translations: Option<Vec<TranslationRef>>,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            post,
            owner: None,
            language: None,
            categories: None,
            comments: None,
            translations: None,
        }
    }
}

/// Pagination block of a list response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Paginated list envelope
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(Pagination::new(0, 1, 10).total_pages, 0);
        assert_eq!(Pagination::new(10, 1, 10).total_pages, 1);
        assert_eq!(Pagination::new(11, 2, 10).total_pages, 2);
    }

    #[test]
    fn test_post_view_omits_unloaded_relations() {
        let post = Post {
            id: 7,
            user_id: Uuid::nil(),
            title: "Hello".into(),
            summary: Some("short".into()),
            content: "body".into(),
            description: None,
            slug: "hello".into(),
            views: 3,
            language_id: 1,
            original_post_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(PostView::from(post)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["abstract"], "short");
        assert_eq!(json["languageId"], 1);
        assert!(json.get("categories").is_none());
        assert!(json.get("owner").is_none());
    }
}
