//! Page discovery for collection endpoints.
//!
//! Page 1 is always fetched first. When it advertises more than one page in
//! `X-WP-TotalPages`, the remaining pages are requested concurrently and
//! reassembled in page order. Without a usable count the collector probes
//! pages 2, 3, ... one at a time until a page comes back empty.

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::error::ApiError;
use crate::download::HttpClient;

/// Response header carrying the total page count.
pub const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";

/// Largest advertised page count that is fanned out; anything above falls
/// back to sequential probing.
pub const MAX_TOTAL_PAGES: u32 = 10_000;

struct Page {
    items: Vec<Value>,
    total_pages: Option<u32>,
}

/// Collects every item of `endpoint`, `per_page` at a time, in page order.
///
/// # Errors
///
/// Returns [`ApiError`] as soon as any page fails; no partial result is
/// returned.
#[instrument(skip(client), fields(endpoint = %endpoint))]
pub async fn collect_all(
    client: &HttpClient,
    endpoint: &str,
    per_page: u32,
) -> Result<Vec<Value>, ApiError> {
    let first = fetch_page(client, endpoint, per_page, 1).await?;
    let mut items = first.items;

    match first.total_pages {
        Some(total) if total > 1 => {
            debug!(total, "fetching remaining pages concurrently");
            let mut pending: FuturesUnordered<_> = (2..=total)
                .map(|page| async move {
                    fetch_page(client, endpoint, per_page, page)
                        .await
                        .map(|fetched| (page, fetched.items))
                })
                .collect();

            let mut pages = Vec::with_capacity(pending.len());
            while let Some(result) = pending.next().await {
                pages.push(result?);
            }

            // Completion order is arbitrary.
            pages.sort_unstable_by_key(|(page, _)| *page);
            for (_, page_items) in pages {
                items.extend(page_items);
            }
        }
        _ => {
            let mut page = 2;
            let mut last_empty = items.is_empty();
            while !last_empty {
                let next = fetch_page(client, endpoint, per_page, page).await?;
                last_empty = next.items.is_empty();
                items.extend(next.items);
                page += 1;
            }
            debug!(pages = page - 1, "sequential probing finished");
        }
    }

    debug!(count = items.len(), "collection complete");
    Ok(items)
}

async fn fetch_page(
    client: &HttpClient,
    endpoint: &str,
    per_page: u32,
    page: u32,
) -> Result<Page, ApiError> {
    let response = client
        .fetch_json(
            endpoint,
            &[("per_page", per_page.to_string()), ("page", page.to_string())],
        )
        .await
        .map_err(|source| ApiError::transport(endpoint, page, source))?;

    let items = match response.body {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(ApiError::UnexpectedShape {
                endpoint: endpoint.to_string(),
                page,
                found: json_type_name(&other),
            });
        }
    };

    let total_pages = response
        .headers
        .get(TOTAL_PAGES_HEADER)
        .and_then(|raw| parse_total_pages(endpoint, raw.to_str().unwrap_or_default()));

    debug!(page, count = items.len(), ?total_pages, "page fetched");
    Ok(Page { items, total_pages })
}

fn parse_total_pages(endpoint: &str, raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<u32>() {
        Ok(total) if total > MAX_TOTAL_PAGES => {
            warn!(
                endpoint,
                total,
                max = MAX_TOTAL_PAGES,
                "ignoring implausible total page count"
            );
            None
        }
        Ok(total) => Some(total),
        Err(e) => {
            warn!(endpoint, value = raw, error = %e, "ignoring malformed total page count");
            None
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_total_pages_accepts_integers() {
        assert_eq!(parse_total_pages("e", "4"), Some(4));
        assert_eq!(parse_total_pages("e", " 12 "), Some(12));
        assert_eq!(parse_total_pages("e", "0"), Some(0));
    }

    #[test]
    fn test_parse_total_pages_treats_garbage_as_absent() {
        assert_eq!(parse_total_pages("e", ""), None);
        assert_eq!(parse_total_pages("e", "many"), None);
        assert_eq!(parse_total_pages("e", "-1"), None);
        assert_eq!(parse_total_pages("e", "2.5"), None);
    }

    #[test]
    fn test_parse_total_pages_rejects_implausible_counts() {
        assert_eq!(
            parse_total_pages("e", &MAX_TOTAL_PAGES.to_string()),
            Some(MAX_TOTAL_PAGES)
        );
        assert_eq!(parse_total_pages("e", "10001"), None);
        assert_eq!(parse_total_pages("e", "4294967295"), None);
    }

    #[test]
    fn test_json_type_name() {
        assert_eq!(json_type_name(&serde_json::json!({"code": "x"})), "object");
        assert_eq!(json_type_name(&serde_json::json!("text")), "string");
    }
}
