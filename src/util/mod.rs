//! URL helpers shared by discovery, category extraction and feed parsing.

mod url_validator;

pub use url_validator::{query_param, resolve_url, validate_url, UrlError};
