//! Collects the Boannews category RSS feeds and upserts the articles into a
//! local SQLite table.
//!
//! A run is one pass of [`collector::Collector::run_collection`] followed by a
//! single [`storage::Database::upsert_many`] call.

pub mod collector;
pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
