//! Categories and posts as returned by the content API.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use super::error::ApiError;
use super::pagination::collect_all;
use crate::download::HttpClient;
use crate::parser::strip_html;

/// A category id and its display name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    /// Category id.
    pub id: u64,
    /// Display name, entity-decoded and trimmed after [`fetch_categories`].
    #[serde(default)]
    pub name: String,
}

/// An HTML field wrapped as `{"rendered": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Rendered {
    /// Rendered HTML.
    #[serde(default)]
    pub rendered: String,
}

/// A post as returned by the items endpoint. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Post {
    /// Post id.
    pub id: u64,
    /// Rendered title.
    #[serde(default)]
    pub title: Option<Rendered>,
    /// Rendered body.
    #[serde(default)]
    pub content: Option<Rendered>,
    /// Publication date string.
    #[serde(default)]
    pub date: Option<String>,
    /// Category ids in API order.
    #[serde(default)]
    pub categories: Option<Vec<u64>>,
}

impl Post {
    /// Decodes a raw collection item.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the item lacks an integer `id` or a field
    /// has the wrong type.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Title as plain text: tags stripped, entities decoded, trimmed.
    #[must_use]
    pub fn title_text(&self) -> String {
        let html = self.title.as_ref().map_or("", |t| t.rendered.as_str());
        let text = strip_html(html);
        html_escape::decode_html_entities(&text).trim().to_string()
    }

    /// Rendered body HTML, empty when absent.
    #[must_use]
    pub fn content_html(&self) -> &str {
        self.content.as_ref().map_or("", |c| c.rendered.as_str())
    }

    /// Publication date, empty when absent.
    #[must_use]
    pub fn date(&self) -> &str {
        self.date.as_deref().unwrap_or_default()
    }

    /// Category ids, empty when absent.
    #[must_use]
    pub fn category_ids(&self) -> &[u64] {
        self.categories.as_deref().unwrap_or_default()
    }
}

/// Best-effort id of a raw item that failed to decode, for log lines.
#[must_use]
pub fn post_id_hint(value: &Value) -> Option<u64> {
    value.get("id").and_then(Value::as_u64)
}

/// Lists every category with names entity-decoded and trimmed.
///
/// # Errors
///
/// Returns [`ApiError`] if any page fails or a category is malformed.
#[instrument(skip(client))]
pub async fn fetch_categories(
    client: &HttpClient,
    endpoint: &str,
    per_page: u32,
) -> Result<Vec<Category>, ApiError> {
    let raw = collect_all(client, endpoint, per_page).await?;

    let categories = raw
        .into_iter()
        .map(|value| {
            serde_json::from_value::<Category>(value)
                .map(|category| Category {
                    name: html_escape::decode_html_entities(&category.name)
                        .trim()
                        .to_string(),
                    ..category
                })
                .map_err(|e| ApiError::invalid_item(endpoint, e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(count = categories.len(), "categories fetched");
    Ok(categories)
}

/// Lists every post as raw JSON. Decoding is left to the caller so one
/// malformed post does not abort the listing.
///
/// # Errors
///
/// Returns [`ApiError`] if any page fails.
#[instrument(skip(client))]
pub async fn fetch_posts(
    client: &HttpClient,
    endpoint: &str,
    per_page: u32,
) -> Result<Vec<Value>, ApiError> {
    let posts = collect_all(client, endpoint, per_page).await?;
    info!(count = posts.len(), "posts fetched");
    Ok(posts)
}
