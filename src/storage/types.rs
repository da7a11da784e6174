use serde::Serialize;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("Database is locked by another process")]
    Locked,

    /// Table creation failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Table name would not be a safe SQL identifier
    #[error("Invalid table name {0:?}: use letters, digits and underscores only")]
    InvalidTableName(String),

    /// Bulk upsert failed and the whole batch was rolled back
    #[error("Bulk upsert failed, batch rolled back: {0}")]
    Persistence(#[source] sqlx::Error),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Table Name
// ============================================================================

/// A table name that is safe to interpolate into SQL.
///
/// SQL placeholders cannot bind identifiers, so the name is restricted to
/// `[A-Za-z_][A-Za-z0-9_]*` (at most 64 characters) at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    const MAX_LEN: usize = 64;

    pub fn new(name: &str) -> Result<Self, DatabaseError> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || name.len() > Self::MAX_LEN {
            return Err(DatabaseError::InvalidTableName(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// One normalized news article, the unit of persistence.
///
/// `unique_id` comes from the article link's `idx` parameter and is the
/// upsert conflict key; every other field is always populated, using the
/// feed parser's fallbacks where the feed had nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsRecord {
    pub unique_id: i64,
    pub title: String,
    pub link: String,
    pub creator: String,
    /// `YYYY-MM-DD HH:MM:SS`, stored in the `written_at` column
    pub published_at: String,
    pub description: String,
    pub category: String,
}

/// A persisted row: the record plus its server-assigned `saved_at`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredRecord {
    pub unique_id: i64,
    pub title: String,
    pub link: String,
    pub creator: String,
    pub written_at: String,
    pub description: String,
    pub category: String,
    pub saved_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_accepts_identifiers() {
        assert_eq!(TableName::new("boannews_rss").unwrap().as_str(), "boannews_rss");
        assert!(TableName::new("_staging2").is_ok());
        assert_eq!(TableName::new("News").unwrap().to_string(), "News");
    }

    #[test]
    fn test_table_name_rejects_injection_and_junk() {
        for bad in ["", "1news", "news rss", "news;drop", "news\"", "뉴스", "a-b"] {
            assert!(
                matches!(TableName::new(bad), Err(DatabaseError::InvalidTableName(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(TableName::new(&"t".repeat(65)).is_err());
        assert!(TableName::new(&"t".repeat(64)).is_ok());
    }
}
