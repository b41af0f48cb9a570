//! Link extraction from rendered post content.
//!
//! Post bodies arrive as HTML fragments. This module pulls out the anchors
//! that point at PDF documents and turns titles into plain text.
//!
//! # Example
//!
//! ```
//! use pdf_mirror_core::parser::{HtmlLinkExtractor, LinkExtractor};
//!
//! let html = r#"<p><a href="/files/minutes.pdf">May minutes</a></p>"#;
//! let links = HtmlLinkExtractor.extract(html, "https://example.org").unwrap();
//!
//! assert_eq!(links.len(), 1);
//! assert_eq!(links[0].url, "https://example.org/files/minutes.pdf");
//! assert_eq!(links[0].text, "May minutes");
//! ```

mod error;
mod html;

pub use error::ParseError;
pub use html::{extract_pdf_links, strip_html};

/// A PDF link found in post content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Absolute URL of the document.
    pub url: String,
    /// Anchor text with whitespace collapsed. May be empty.
    pub text: String,
}

/// Source of PDF links for a post's rendered content.
///
/// The engine calls this once per post. An error fails that post only.
pub trait LinkExtractor: Send + Sync {
    /// Returns the PDF links in `html`, resolved against `base_url`,
    /// deduplicated by URL in document order.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the content or base URL cannot be processed.
    fn extract(&self, html: &str, base_url: &str) -> Result<Vec<Link>, ParseError>;
}

/// [`LinkExtractor`] backed by an HTML5 parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlLinkExtractor;

impl LinkExtractor for HtmlLinkExtractor {
    fn extract(&self, html: &str, base_url: &str) -> Result<Vec<Link>, ParseError> {
        extract_pdf_links(html, base_url)
    }
}
