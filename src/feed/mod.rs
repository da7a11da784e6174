//! Feed collection: discovery, category extraction, fetching and parsing.
//!
//! This module provides the network-facing half of a collection run:
//!
//! - **Discovery**: find the feed directory linked from the site's front page
//! - **Categories**: turn the directory page into per-category feed targets
//! - **Parsing**: fetch each category feed and normalize its entries
//!
//! # Architecture
//!
//! - [`discovery`] - Two-tier HTML heuristic for feed links (never fails)
//! - [`categories`] - Structural traversal of the category table
//! - [`parser`] - RSS/Atom parsing with per-entry skip rules
//! - [`fetcher`] - HTTP fetching with timeouts and size limits
//!
//! # Example
//!
//! ```ignore
//! use boannews_collector::feed::{get_targets, parse_feed};
//!
//! let targets = get_targets(&client, "https://www.boannews.com/", marker, timeout).await?;
//! for target in &targets {
//!     let records = parse_feed(&client, target, "보안뉴스", timeout).await;
//! }
//! ```

pub mod categories;
pub mod discovery;
pub mod fetcher;
pub mod parser;

pub use categories::{extract_targets, get_targets, FeedTarget, DEFAULT_CATEGORY_MARKER};
pub use discovery::{discover_feeds, find_feed_links};
pub use fetcher::{build_client, FetchError, DEFAULT_USER_AGENT};
pub use parser::{parse_entries, parse_feed, records_from_entries, DEFAULT_CREATOR};
