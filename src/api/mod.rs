//! Paginated collection endpoints of the remote content API.
//!
//! [`collect_all`] gathers every raw item of a collection; [`fetch_categories`]
//! and [`fetch_posts`] build on it for the two collections the mirror reads.

mod error;
mod pagination;
mod resources;

pub use error::ApiError;
pub use pagination::{MAX_TOTAL_PAGES, TOTAL_PAGES_HEADER, collect_all};
pub use resources::{Category, Post, Rendered, fetch_categories, fetch_posts, post_id_hint};
