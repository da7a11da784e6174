mod articles;
mod schema;
mod types;

pub use schema::Database;
pub use types::{DatabaseError, NewsRecord, StoredRecord, TableName};
