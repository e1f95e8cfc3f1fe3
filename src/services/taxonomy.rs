//! Category taxonomy: the existence check consumed by post writes, plus the
//! category writes that keep the parent tree acyclic.

use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use std::collections::{HashMap, HashSet};

use super::{distinct_ids, double_option, required_text, resolve_slug};
use crate::db::models::Category;
use crate::error::{AppError, Result};

const CATEGORY_COLUMNS: &str = "id, name, slug, parent_id";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, alias = "parent_id")]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategory {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, alias = "parent_id", deserialize_with = "double_option")]
    pub parent_id: Option<Option<i64>>,
}

/// Ids from `ids` that have no category row, de-duplicated and ascending.
pub async fn missing_categories(conn: &mut PgConnection, ids: &[i64]) -> Result<Vec<i64>> {
    let wanted = distinct_ids(ids);
    if wanted.is_empty() {
        return Ok(wanted);
    }

    let found: HashSet<i64> = sqlx::query_scalar::<_, i64>("SELECT id FROM categories WHERE id = ANY($1)")
        .bind(&wanted)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();

    Ok(wanted.into_iter().filter(|id| !found.contains(id)).collect())
}

/// Whether re-parenting `id` under `proposed_parent` would close a loop.
///
/// Walks up from the proposed parent; reaching `id`, or revisiting a node
/// (a loop already present in stored data), counts as a cycle.
pub fn creates_cycle(parents: &HashMap<i64, Option<i64>>, id: i64, proposed_parent: i64) -> bool {
    let mut visited = HashSet::new();
    let mut cursor = Some(proposed_parent);

    while let Some(current) = cursor {
        if current == id || !visited.insert(current) {
            return true;
        }
        cursor = parents.get(&current).copied().flatten();
    }

    false
}

pub async fn list_categories(pool: &PgPool) -> Result<Vec<Category>> {
    let sql = format!("SELECT {} FROM categories ORDER BY name, id", CATEGORY_COLUMNS);
    let categories = sqlx::query_as::<_, Category>(&sql).fetch_all(pool).await?;
    Ok(categories)
}

async fn find_category(conn: &mut PgConnection, id: i64) -> Result<Option<Category>> {
    let sql = format!("SELECT {} FROM categories WHERE id = $1", CATEGORY_COLUMNS);
    let category = sqlx::query_as::<_, Category>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(category)
}

async fn ensure_parent_exists(conn: &mut PgConnection, parent_id: i64) -> Result<()> {
    if find_category(conn, parent_id).await?.is_none() {
        return Err(AppError::NotFound("Parent category not found".to_string()));
    }
    Ok(())
}

pub async fn create_category(pool: &PgPool, input: NewCategory) -> Result<Category> {
    let name = required_text(&input.name, "Name")?;
    let slug = resolve_slug(input.slug, &name)?;

    let mut tx = pool.begin().await?;

    if let Some(parent_id) = input.parent_id {
        ensure_parent_exists(&mut tx, parent_id).await?;
    }

    let sql = format!(
        "INSERT INTO categories (name, slug, parent_id) VALUES ($1, $2, $3) RETURNING {}",
        CATEGORY_COLUMNS
    );
    let category = sqlx::query_as::<_, Category>(&sql)
        .bind(&name)
        .bind(&slug)
        .bind(input.parent_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from_unique_violation)?;

    tx.commit().await?;

    tracing::info!(category_id = category.id, name = %category.name, "category created");
    Ok(category)
}

pub async fn update_category(pool: &PgPool, id: i64, input: UpdateCategory) -> Result<Category> {
    let mut tx = pool.begin().await?;

    let existing = find_category(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;

    let name = match input.name {
        Some(name) => required_text(&name, "Name")?,
        None => existing.name,
    };
    let slug = match input.slug {
        Some(slug) => resolve_slug(Some(slug), &name)?,
        None => existing.slug,
    };
    let parent_id = input.parent_id.unwrap_or(existing.parent_id);

    if let Some(parent) = parent_id {
        if parent_id != existing.parent_id {
            // Serialize re-parenting so two concurrent moves cannot form a loop.
            sqlx::query("LOCK TABLE categories IN SHARE ROW EXCLUSIVE MODE")
                .execute(&mut *tx)
                .await?;

            ensure_parent_exists(&mut tx, parent).await?;

            let parents: HashMap<i64, Option<i64>> =
                sqlx::query_as::<_, (i64, Option<i64>)>("SELECT id, parent_id FROM categories")
                    .fetch_all(&mut *tx)
                    .await?
                    .into_iter()
                    .collect();

            if creates_cycle(&parents, id, parent) {
                return Err(AppError::BadRequest(
                    "A category cannot be placed under itself or one of its descendants".to_string(),
                ));
            }
        }
    }

    let sql = format!(
        "UPDATE categories SET name = $1, slug = $2, parent_id = $3, updated_at = now() WHERE id = $4 RETURNING {}",
        CATEGORY_COLUMNS
    );
    let category = sqlx::query_as::<_, Category>(&sql)
        .bind(&name)
        .bind(&slug)
        .bind(parent_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from_unique_violation)?;

    tx.commit().await?;

    tracing::info!(category_id = id, "category updated");
    Ok(category)
}

pub async fn delete_category(pool: &PgPool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Category not found".to_string()));
    }

    tracing::info!(category_id = id, "category deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(edges: &[(i64, Option<i64>)]) -> HashMap<i64, Option<i64>> {
        edges.iter().copied().collect()
    }

    #[test]
    fn test_moving_under_unrelated_branch_is_fine() {
        // 1 -> (2, 3), 3 -> 4
        let parents = tree(&[(1, None), (2, Some(1)), (3, Some(1)), (4, Some(3))]);
        assert!(!creates_cycle(&parents, 2, 4));
        assert!(!creates_cycle(&parents, 4, 2));
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let parents = tree(&[(1, None)]);
        assert!(creates_cycle(&parents, 1, 1));
    }

    #[test]
    fn test_moving_under_descendant_is_a_cycle() {
        let parents = tree(&[(1, None), (2, Some(1)), (3, Some(2))]);
        assert!(creates_cycle(&parents, 1, 3));
        assert!(creates_cycle(&parents, 2, 3));
    }

    #[test]
    fn test_pre_existing_loop_terminates() {
        // 5 <-> 6 loop already stored; 7 is unrelated
        let parents = tree(&[(5, Some(6)), (6, Some(5)), (7, None)]);
        assert!(creates_cycle(&parents, 7, 5));
    }

    #[test]
    fn test_update_category_parent_null_is_explicit() {
        let patch: UpdateCategory = serde_json::from_str(r#"{"parentId": null}"#).unwrap();
        assert_eq!(patch.parent_id, Some(None));
    }
}
