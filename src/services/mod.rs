//! Post domain services. Route handlers parse requests into the option and
//! input types defined here; every function is one unit of work.

pub mod languages;
pub mod post_query;
pub mod post_write;
pub mod stats;
pub mod taxonomy;
pub mod translations;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeSet;

use crate::error::{AppError, Result};

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

/// Lowercase ASCII slug built from arbitrary text; runs of anything that is
/// not a letter or digit collapse into a single hyphen.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Explicit slug if given (validated), otherwise one derived from `fallback`.
pub(crate) fn resolve_slug(explicit: Option<String>, fallback: &str) -> Result<String> {
    let slug = match explicit {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => slugify(fallback),
    };

    if !is_valid_slug(&slug) {
        return Err(AppError::BadRequest(
            "Slug must contain only lowercase letters, numbers, and hyphens".to_string(),
        ));
    }

    Ok(slug)
}

pub(crate) fn required_text(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Sorted, de-duplicated copy of a list of ids.
pub fn distinct_ids(ids: &[i64]) -> Vec<i64> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust   2024 -- edition "), "rust-2024-edition");
        assert_eq!(slugify("¿Qué tal?"), "qu-tal");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_resolve_slug() {
        assert_eq!(resolve_slug(None, "My First Post").unwrap(), "my-first-post");
        assert_eq!(resolve_slug(Some("custom-1".into()), "ignored").unwrap(), "custom-1");
        assert!(resolve_slug(Some("Bad Slug".into()), "x").is_err());
        assert!(resolve_slug(None, "???").is_err());
    }

    #[test]
    fn test_distinct_ids() {
        assert_eq!(distinct_ids(&[3, 1, 3, 2, 1]), vec![1, 2, 3]);
        assert!(distinct_ids(&[]).is_empty());
    }

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        parent: Option<Option<i64>>,
    }

    #[test]
    fn test_double_option_distinguishes_null_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"parent": null}"#).unwrap();
        let set: Patch = serde_json::from_str(r#"{"parent": 4}"#).unwrap();
        assert_eq!(absent.parent, None);
        assert_eq!(null.parent, Some(None));
        assert_eq!(set.parent, Some(Some(4)));
    }
}
