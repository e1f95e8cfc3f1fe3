//! Post reads: filtered/paginated listing, single-post fetch with optional
//! view increment, and relation hydration shared with the write path.

use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::translations;
use crate::db::models::{
    Category, Comment, Language, Paginated, Pagination, Post, PostCategoryRow, PostOwner,
    PostView, TranslationRef, POST_COLUMNS,
};
use crate::error::{AppError, Result};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;
/// Highest page whose offset still fits in an i64 at the largest limit.
pub const MAX_PAGE: i64 = i64::MAX / MAX_LIMIT;

/// Columns a listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostSortColumn {
    Id,
    Title,
    Slug,
    Views,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl PostSortColumn {
    fn column(self) -> &'static str {
        match self {
            PostSortColumn::Id => "p.id",
            PostSortColumn::Title => "p.title",
            PostSortColumn::Slug => "p.slug",
            PostSortColumn::Views => "p.views",
            PostSortColumn::CreatedAt => "p.created_at",
            PostSortColumn::UpdatedAt => "p.updated_at",
        }
    }
}

impl FromStr for PostSortColumn {
    type Err = AppError;

    /// Accepts camelCase and snake_case spellings.
    fn from_str(s: &str) -> Result<Self> {
        match s.replace('_', "").to_ascii_lowercase().as_str() {
            "id" => Ok(PostSortColumn::Id),
            "title" => Ok(PostSortColumn::Title),
            "slug" => Ok(PostSortColumn::Slug),
            "views" => Ok(PostSortColumn::Views),
            "createdat" => Ok(PostSortColumn::CreatedAt),
            "updatedat" => Ok(PostSortColumn::UpdatedAt),
            _ => Err(AppError::BadRequest(format!(
                "Cannot order by '{}'. Allowed: id, title, slug, views, createdAt, updatedAt",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(AppError::BadRequest(format!(
                "Invalid order '{}'. Use asc or desc",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostListOptions {
    pub page: i64,
    pub limit: i64,
    pub search: Option<String>,
    pub category_id: Option<i64>,
    pub language_id: Option<i64>,
    pub user_id: Option<Uuid>,
    pub order_by: PostSortColumn,
    pub order: SortOrder,
    pub include_relations: bool,
    /// Only posts that are not translations.
    pub original_post: bool,
    /// Only translations of this post.
    pub from_original_post_id: Option<i64>,
}

impl Default for PostListOptions {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            search: None,
            category_id: None,
            language_id: None,
            user_id: None,
            order_by: PostSortColumn::default(),
            order: SortOrder::default(),
            include_relations: false,
            original_post: false,
            from_original_post_id: None,
        }
    }
}

impl PostListOptions {
    /// Clamps paging, drops blank searches and rejects contradictory filters.
    pub fn normalized(mut self) -> Result<Self> {
        if self.original_post && self.from_original_post_id.is_some() {
            return Err(AppError::BadRequest(
                "originalPost and fromOriginalPostId cannot be combined".to_string(),
            ));
        }

        self.page = self.page.clamp(1, MAX_PAGE);
        self.limit = self.limit.clamp(1, MAX_LIMIT);
        self.search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(self)
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// How the `/posts/{id}` segment is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostIdentifier {
    Id(i64),
    Slug(String),
}

impl PostIdentifier {
    /// Anything that parses as an integer is an id, so an all-digit slug can
    /// only be reached through listings.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(id) => PostIdentifier::Id(id),
            Err(_) => PostIdentifier::Slug(raw.to_string()),
        }
    }
}

/// Which relations to attach to each post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Relations {
    pub owner: bool,
    pub language: bool,
    pub categories: bool,
    pub comments: bool,
    pub translations: bool,
}

impl Relations {
    pub const NONE: Relations = Relations {
        owner: false,
        language: false,
        categories: false,
        comments: false,
        translations: false,
    };

    pub const LIST: Relations = Relations {
        owner: true,
        language: true,
        categories: true,
        comments: false,
        translations: false,
    };

    pub const FULL: Relations = Relations {
        owner: true,
        language: true,
        categories: true,
        comments: true,
        translations: true,
    };
}

/// Escapes LIKE wildcards so user input matches literally.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

const LIST_FILTERS: &str = r#"
    WHERE ($1::text IS NULL
           OR p.title ILIKE '%' || $1 || '%' ESCAPE '\'
           OR p.description ILIKE '%' || $1 || '%' ESCAPE '\')
      AND ($2::bigint IS NULL OR EXISTS (
            SELECT 1 FROM post_categories pc
            WHERE pc.post_id = p.id AND pc.category_id = $2))
      AND ($3::bigint IS NULL OR p.language_id = $3)
      AND ($4::uuid IS NULL OR p.user_id = $4)
      AND (NOT $5::boolean OR p.original_post_id IS NULL)
      AND ($6::bigint IS NULL OR p.original_post_id = $6)
"#;

pub async fn get_all_posts(pool: &PgPool, options: PostListOptions) -> Result<Paginated<PostView>> {
    let options = options.normalized()?;
    let search = options.search.as_deref().map(escape_like);

    let count_sql = format!("SELECT COUNT(*) FROM posts p {}", LIST_FILTERS);
    let total = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind(&search)
        .bind(options.category_id)
        .bind(options.language_id)
        .bind(options.user_id)
        .bind(options.original_post)
        .bind(options.from_original_post_id)
        .fetch_one(pool)
        .await?;

    let direction = options.order.keyword();
    let select_sql = format!(
        "SELECT {} FROM posts p {} ORDER BY {} {}, p.id {} LIMIT $7 OFFSET $8",
        POST_COLUMNS,
        LIST_FILTERS,
        options.order_by.column(),
        direction,
        direction
    );
    let posts = sqlx::query_as::<_, Post>(&select_sql)
        .bind(&search)
        .bind(options.category_id)
        .bind(options.language_id)
        .bind(options.user_id)
        .bind(options.original_post)
        .bind(options.from_original_post_id)
        .bind(options.limit)
        .bind(options.offset())
        .fetch_all(pool)
        .await?;

    let relations = if options.include_relations {
        Relations::LIST
    } else {
        Relations::NONE
    };

    let mut conn = pool.acquire().await?;
    let data = hydrate(&mut conn, posts, relations).await?;

    Ok(Paginated {
        data,
        pagination: Pagination::new(total, options.page, options.limit),
    })
}

pub async fn get_posts_by_category(
    pool: &PgPool,
    category_id: i64,
    options: PostListOptions,
) -> Result<Paginated<PostView>> {
    get_all_posts(
        pool,
        PostListOptions {
            category_id: Some(category_id),
            ..options
        },
    )
    .await
}

pub async fn get_posts_by_user(
    pool: &PgPool,
    user_id: Uuid,
    options: PostListOptions,
) -> Result<Paginated<PostView>> {
    get_all_posts(
        pool,
        PostListOptions {
            user_id: Some(user_id),
            ..options
        },
    )
    .await
}

pub async fn search_posts(
    pool: &PgPool,
    query: &str,
    options: PostListOptions,
) -> Result<Paginated<PostView>> {
    if query.trim().is_empty() {
        return Err(AppError::BadRequest("Search query is required".to_string()));
    }

    get_all_posts(
        pool,
        PostListOptions {
            search: Some(query.to_string()),
            ..options
        },
    )
    .await
}

pub async fn get_translations(
    pool: &PgPool,
    original_post_id: i64,
    options: PostListOptions,
) -> Result<Paginated<PostView>> {
    get_all_posts(
        pool,
        PostListOptions {
            from_original_post_id: Some(original_post_id),
            original_post: false,
            ..options
        },
    )
    .await
}

async fn find_post(conn: &mut PgConnection, identifier: &PostIdentifier) -> Result<Option<Post>> {
    let post = match identifier {
        PostIdentifier::Id(id) => {
            let sql = format!("SELECT {} FROM posts p WHERE p.id = $1", POST_COLUMNS);
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?
        }
        PostIdentifier::Slug(slug) => {
            let sql = format!("SELECT {} FROM posts p WHERE p.slug = $1", POST_COLUMNS);
            sqlx::query_as::<_, Post>(&sql)
                .bind(slug)
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    Ok(post)
}

/// Single post by numeric id or slug, with every relation attached.
///
/// With `increment_views` the counter is bumped by one atomic statement and
/// the value that statement produced is echoed back; under concurrent reads
/// it may already be stale by the time the caller sees it.
pub async fn get_post_by_id_or_slug(
    pool: &PgPool,
    identifier: &str,
    increment_views: bool,
) -> Result<PostView> {
    let identifier = PostIdentifier::parse(identifier);
    let mut conn = pool.acquire().await?;

    let mut post = find_post(&mut conn, &identifier)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if increment_views {
        let views = sqlx::query_scalar::<_, i64>(
            "UPDATE posts SET views = views + 1 WHERE id = $1 RETURNING views",
        )
        .bind(post.id)
        .fetch_optional(&mut *conn)
        .await?;
        post.views = views.ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    }

    single(hydrate(&mut conn, vec![post], Relations::FULL).await?)
}

/// Read-your-writes fetch used at the end of every post write.
pub async fn fetch_post_view(pool: &PgPool, id: i64) -> Result<PostView> {
    let mut conn = pool.acquire().await?;
    let post = find_post(&mut conn, &PostIdentifier::Id(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    single(hydrate(&mut conn, vec![post], Relations::FULL).await?)
}

fn single(mut views: Vec<PostView>) -> Result<PostView> {
    views
        .pop()
        .ok_or_else(|| AppError::Internal("Hydration returned no post".to_string()))
}

/// Attaches the requested relations with one batched query per relation.
pub async fn hydrate(
    conn: &mut PgConnection,
    posts: Vec<Post>,
    relations: Relations,
) -> Result<Vec<PostView>> {
    if posts.is_empty() || relations == Relations::NONE {
        return Ok(posts.into_iter().map(PostView::from).collect());
    }

    let post_ids: Vec<i64> = posts.iter().map(|p| p.id).collect();

    let owners: HashMap<Uuid, PostOwner> = if relations.owner {
        let mut user_ids: Vec<Uuid> = posts.iter().map(|p| p.user_id).collect();
        user_ids.sort();
        user_ids.dedup();
        sqlx::query_as::<_, PostOwner>(
            "SELECT id, email, display_name FROM users WHERE id = ANY($1)",
        )
        .bind(&user_ids)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|owner| (owner.id, owner))
        .collect()
    } else {
        HashMap::new()
    };

    let languages: HashMap<i64, Language> = if relations.language {
        let mut language_ids: Vec<i64> = posts.iter().map(|p| p.language_id).collect();
        language_ids.sort_unstable();
        language_ids.dedup();
        sqlx::query_as::<_, Language>(
            "SELECT id, locale, name, is_active FROM languages WHERE id = ANY($1)",
        )
        .bind(&language_ids)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|language| (language.id, language))
        .collect()
    } else {
        HashMap::new()
    };

    let mut categories: HashMap<i64, Vec<Category>> = HashMap::new();
    if relations.categories {
        let rows = sqlx::query_as::<_, PostCategoryRow>(
            r#"
            SELECT pc.post_id, c.id, c.name, c.slug, c.parent_id
            FROM post_categories pc
            JOIN categories c ON c.id = pc.category_id
            WHERE pc.post_id = ANY($1)
            ORDER BY c.name, c.id
            "#,
        )
        .bind(&post_ids)
        .fetch_all(&mut *conn)
        .await?;
        for row in rows {
            categories.entry(row.post_id).or_default().push(row.category);
        }
    }

    let mut comments: HashMap<i64, Vec<Comment>> = HashMap::new();
    if relations.comments {
        let rows = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, user_id, content, created_at
            FROM comments
            WHERE post_id = ANY($1)
            ORDER BY created_at, id
            "#,
        )
        .bind(&post_ids)
        .fetch_all(&mut *conn)
        .await?;
        for comment in rows {
            comments.entry(comment.post_id).or_default().push(comment);
        }
    }

    let mut translated: HashMap<i64, Vec<TranslationRef>> = HashMap::new();
    if relations.translations {
        for tr in translations::translations_of(conn, &post_ids).await? {
            if let Some(original) = tr.original_post_id {
                translated.entry(original).or_default().push(tr);
            }
        }
    }

    let views = posts
        .into_iter()
        .map(|post| {
            let id = post.id;
            PostView {
                owner: relations.owner.then(|| owners.get(&post.user_id).cloned()).flatten(),
                language: relations
                    .language
                    .then(|| languages.get(&post.language_id).cloned())
                    .flatten(),
                categories: relations
                    .categories
                    .then(|| categories.remove(&id).unwrap_or_default()),
                comments: relations
                    .comments
                    .then(|| comments.remove(&id).unwrap_or_default()),
                translations: relations
                    .translations
                    .then(|| translated.remove(&id).unwrap_or_default()),
                post,
            }
        })
        .collect();

    Ok(views)
}
