use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::categories::FeedTarget;
use super::fetcher::fetch_bytes;
use crate::storage::NewsRecord;
use crate::util::query_param;

/// Site-name placeholder used when an entry carries no author.
pub const DEFAULT_CREATOR: &str = "보안뉴스";

/// Query parameter holding the article's numeric id.
pub const ID_PARAM: &str = "idx";

/// Date layout the source feed generator emits, e.g.
/// `Tue, 13, Jan, 2026, 09:30:00 +0900`. The weekday token is split off
/// before parsing, see [`parse_source_date`].
pub const SOURCE_DATE_FORMAT: &str = "%a, %d, %b, %Y, %H:%M:%S %z";
const SOURCE_DATE_FORMAT_NO_WEEKDAY: &str = "%d, %b, %Y, %H:%M:%S %z";

/// Layout stored in the `written_at` column.
pub const STORE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Feed document could not be read as RSS, Atom or JSON Feed.
#[derive(Debug, Error)]
#[error("Parse error: {0}")]
pub struct ParseError(String);

/// Why a single entry was dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntrySkip {
    #[error("entry has no link")]
    MissingLink,
    #[error("link has no idx parameter")]
    MissingId,
    #[error("idx value {0:?} is not an integer")]
    InvalidId(String),
    #[error("entry has no title")]
    MissingTitle,
}

/// Publication date as the feed library handed it over.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryDate {
    /// Unparsed string (RSS `pubDate`)
    Raw(String),
    /// Parsed by feed-rs through [`feed_timestamp`]: the feed's own
    /// wall-clock time, offset dropped
    Parsed(NaiveDateTime),
}

/// One feed item, normalized across RSS and Atom before record mapping.
#[derive(Debug, Clone, Default)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published: Option<EntryDate>,
    pub summary: Option<String>,
}

/// Fetches one category feed and maps its entries to [`NewsRecord`]s.
///
/// Never fails: a fetch or parse failure is logged and yields an empty list,
/// and entries that cannot be mapped are skipped individually.
pub async fn parse_feed(
    client: &reqwest::Client,
    target: &FeedTarget,
    default_creator: &str,
    timeout: Duration,
) -> Vec<NewsRecord> {
    tracing::debug!(category = %target.category, feed_url = %target.feed_url, "Parsing feed");

    let bytes = match fetch_bytes(client, &target.feed_url, timeout).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                category = %target.category,
                feed_url = %target.feed_url,
                error = %e,
                "Feed fetch failed, treating as empty"
            );
            return Vec::new();
        }
    };

    let entries = match parse_entries(&bytes) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(
                category = %target.category,
                feed_url = %target.feed_url,
                error = %e,
                "Feed document unreadable, treating as empty"
            );
            return Vec::new();
        }
    };

    if entries.is_empty() {
        tracing::info!(category = %target.category, "No new articles in category");
        return Vec::new();
    }

    let now = Local::now().naive_local();
    records_from_entries(entries, target, default_creator, now)
}

/// Parses feed bytes into entries.
///
/// RSS 2.0 is read with the `rss` crate so the raw `pubDate` string survives;
/// anything else (Atom, RSS 1.0, JSON Feed) goes through `feed-rs`.
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<FeedEntry>, ParseError> {
    match rss::Channel::read_from(bytes) {
        Ok(channel) => Ok(channel.items().iter().map(entry_from_rss).collect()),
        Err(rss_err) => {
            let feed = feed_rs::parser::Builder::new()
                .timestamp_parser(feed_timestamp)
                .build()
                .parse(bytes)
                .map_err(|e| ParseError(format!("not RSS ({rss_err}) nor Atom/JSON ({e})")))?;
            Ok(feed.entries.into_iter().map(entry_from_feed_rs).collect())
        }
    }
}

/// Timestamp hook for feed-rs.
///
/// feed-rs only hands out `DateTime<Utc>`, which would shift Atom dates to
/// UTC while RSS dates keep the feed's offset. The returned value carries
/// the feed's wall-clock time labelled as UTC, so `naive_utc()` on the
/// entry gives the same stored string for the same source text on either
/// path.
fn feed_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.naive_local())
        .or_else(|| parse_source_date(text))
        .map(|wall_clock| wall_clock.and_utc())
}

fn entry_from_rss(item: &rss::Item) -> FeedEntry {
    let author = non_blank(item.author()).or_else(|| {
        item.dublin_core_ext()
            .and_then(|dc| dc.creators().iter().find_map(|c| non_blank(Some(c.as_str()))))
    });

    FeedEntry {
        title: item.title().map(str::to_owned),
        link: non_blank(item.link()),
        author,
        published: non_blank(item.pub_date()).map(EntryDate::Raw),
        summary: item.description().map(str::to_owned),
    }
}

fn entry_from_feed_rs(entry: feed_rs::model::Entry) -> FeedEntry {
    let author = entry
        .authors
        .iter()
        .find_map(|p| non_blank(Some(p.name.as_str())));

    FeedEntry {
        title: entry.title.map(|t| t.content),
        link: article_link(&entry.links),
        author,
        published: entry
            .published
            .or(entry.updated)
            .map(|dt| EntryDate::Parsed(dt.naive_utc())),
        summary: entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body)),
    }
}

/// Picks the article link: `rel="alternate"` or no `rel` first, then
/// whatever comes first (Atom often lists `self` or `edit` links too).
fn article_link(links: &[feed_rs::model::Link]) -> Option<String> {
    links
        .iter()
        .find(|l| {
            l.rel
                .as_deref()
                .map_or(true, |rel| rel.trim().eq_ignore_ascii_case("alternate"))
        })
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Maps entries to records in feed order, logging and dropping the ones
/// that cannot be mapped.
pub fn records_from_entries(
    entries: Vec<FeedEntry>,
    target: &FeedTarget,
    default_creator: &str,
    now: NaiveDateTime,
) -> Vec<NewsRecord> {
    let base = Url::parse(&target.feed_url).ok();
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        match build_record(entry, target, base.as_ref(), default_creator, now) {
            Ok(record) => records.push(record),
            Err((skip, title)) => {
                let title: String = title.unwrap_or_default().chars().take(15).collect();
                tracing::warn!(
                    category = %target.category,
                    title = %title,
                    reason = %skip,
                    "Skipping feed entry"
                );
            }
        }
    }

    records
}

fn build_record(
    entry: FeedEntry,
    target: &FeedTarget,
    base: Option<&Url>,
    default_creator: &str,
    now: NaiveDateTime,
) -> Result<NewsRecord, (EntrySkip, Option<String>)> {
    let FeedEntry {
        title,
        link,
        author,
        published,
        summary,
    } = entry;

    let Some(link) = link else {
        return Err((EntrySkip::MissingLink, title));
    };
    let unique_id = match extract_unique_id(&link, base) {
        Ok(id) => id,
        Err(skip) => return Err((skip, title)),
    };
    let Some(title) = title else {
        return Err((EntrySkip::MissingTitle, None));
    };

    Ok(NewsRecord {
        unique_id,
        title: title.trim().to_owned(),
        link,
        creator: author.unwrap_or_else(|| default_creator.to_owned()),
        published_at: published_at(published.as_ref(), now),
        description: summary.unwrap_or_default(),
        category: target.category.clone(),
    })
}

/// Extracts the numeric `idx` query parameter from an article link.
///
/// Relative links are resolved against `base` (the feed URL) first.
pub fn extract_unique_id(link: &str, base: Option<&Url>) -> Result<i64, EntrySkip> {
    let url = match base {
        Some(base) => base.join(link.trim()),
        None => Url::parse(link.trim()),
    }
    .map_err(|_| EntrySkip::MissingId)?;

    let raw = query_param(&url, ID_PARAM).ok_or(EntrySkip::MissingId)?;
    raw.parse::<i64>().map_err(|_| EntrySkip::InvalidId(raw))
}

/// Formats the entry date for storage, substituting `now` when the date is
/// absent or unparseable. Only an unparseable date is logged.
pub fn published_at(date: Option<&EntryDate>, now: NaiveDateTime) -> String {
    let resolved = match date {
        None => now,
        Some(EntryDate::Parsed(dt)) => *dt,
        Some(EntryDate::Raw(raw)) => parse_source_date(raw).unwrap_or_else(|| {
            tracing::warn!(raw = %raw, "Date conversion failed, using current time");
            now
        }),
    };
    resolved.format(STORE_DATE_FORMAT).to_string()
}

/// Parses the source feed's date string, keeping the wall-clock time in the
/// feed's own offset.
///
/// The comma-separated source layout is tried first. Like `strptime`, the
/// leading weekday is not checked against the date. RFC 2822 is accepted as
/// a fallback for standard feed generators.
pub fn parse_source_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    let source_layout = raw
        .split_once(',')
        .filter(|(weekday, _)| !weekday.is_empty() && weekday.chars().all(char::is_alphabetic))
        .and_then(|(_, rest)| {
            DateTime::parse_from_str(rest.trim_start(), SOURCE_DATE_FORMAT_NO_WEEKDAY).ok()
        });

    source_layout
        .or_else(|| DateTime::parse_from_rfc2822(raw).ok())
        .map(|dt| dt.naive_local())
}
