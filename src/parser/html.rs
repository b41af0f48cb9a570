//! PDF link and plain-text extraction from rendered HTML fragments.

use std::collections::HashSet;

use scraper::{ElementRef, Html};
use tracing::trace;
use url::Url;

use super::Link;
use super::error::ParseError;

/// Extracts PDF links from an HTML fragment.
///
/// Every `<a href>` is resolved against `base_url` and kept when the absolute
/// URL contains `.pdf` (case-insensitive). The first occurrence of a URL wins;
/// its anchor text is entity-decoded and whitespace-collapsed. Order follows
/// the document.
///
/// # Errors
///
/// Returns [`ParseError::InvalidBaseUrl`] if `base_url` is not absolute.
pub fn extract_pdf_links(html: &str, base_url: &str) -> Result<Vec<Link>, ParseError> {
    let base = Url::parse(base_url)
        .map_err(|e| ParseError::invalid_base_url(base_url, &e.to_string()))?;
    let fragment = Html::parse_fragment(html);

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let anchors = fragment
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "a");

    for anchor in anchors {
        let Some(href) = anchor
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty())
        else {
            continue;
        };

        let url = match base.join(href) {
            Ok(url) => url.to_string(),
            Err(e) => {
                trace!(href, error = %e, "skipping unresolvable href");
                continue;
            }
        };

        if !url.to_ascii_lowercase().contains(".pdf") || !seen.insert(url.clone()) {
            continue;
        }

        // Anchor text is decoded once more, so `&amp;lt;` reads as `<`.
        let raw_text = anchor.text().collect::<String>();
        let text = collapse_whitespace(&html_escape::decode_html_entities(&raw_text));
        links.push(Link { url, text });
    }

    Ok(links)
}

/// Returns the text content of an HTML fragment with entities decoded.
#[must_use]
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    Html::parse_fragment(html).root_element().text().collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
