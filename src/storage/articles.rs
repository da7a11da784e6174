use sqlx::{QueryBuilder, Sqlite, Transaction};
use std::collections::HashMap;

use super::schema::{Database, NOW_EXPR};
use super::types::{DatabaseError, NewsRecord, StoredRecord, TableName};

/// Rows per INSERT statement: 7 binds * 50 = 350, well under SQLite's
/// bound-parameter limit.
const BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Record Upsert
    // ========================================================================

    /// Upsert a batch of records keyed on `unique_id`, returns the number of
    /// distinct records written.
    ///
    /// New ids are inserted; existing ids get every non-key column replaced
    /// and `saved_at` refreshed. The batch is all-or-nothing: on any failure
    /// the transaction is rolled back explicitly and
    /// [`DatabaseError::Persistence`] is returned, so no row of the batch
    /// becomes visible.
    ///
    /// If the same `unique_id` appears more than once (an article listed in
    /// two categories), the last occurrence wins, as with row-by-row upserts.
    pub async fn upsert_many(
        &self,
        table: &TableName,
        records: &[NewsRecord],
    ) -> Result<usize, DatabaseError> {
        if records.is_empty() {
            tracing::warn!(table = %table, "No records to save, skipping write");
            return Ok(0);
        }

        let batch = last_occurrence_per_id(records);
        if batch.len() < records.len() {
            tracing::debug!(
                received = records.len(),
                distinct = batch.len(),
                "Collapsed duplicate unique_ids in batch"
            );
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            tracing::error!(table = %table, error = %e, "Could not start upsert transaction");
            DatabaseError::Persistence(e)
        })?;

        if let Err(e) = write_chunks(&mut tx, table, &batch).await {
            tracing::error!(table = %table, error = %e, "Bulk upsert failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback reported an error");
            }
            return Err(DatabaseError::Persistence(e));
        }

        tx.commit().await.map_err(DatabaseError::Persistence)?;

        tracing::info!(table = %table, records = batch.len(), "Records saved");
        Ok(batch.len())
    }

    /// Prepares the table, upserts the batch and closes the handle, whatever
    /// the outcome. Returns the number of records written.
    pub async fn save_and_close(
        self,
        table: &TableName,
        records: &[NewsRecord],
    ) -> Result<usize, DatabaseError> {
        let outcome = match self.ensure_table(table).await {
            Ok(()) => self.upsert_many(table, records).await,
            Err(e) => Err(e),
        };

        self.close().await;
        tracing::info!("Database connection closed");
        outcome
    }

    // ========================================================================
    // Record Queries
    // ========================================================================

    /// Get a stored record by its unique id.
    pub async fn get_record(
        &self,
        table: &TableName,
        unique_id: i64,
    ) -> Result<Option<StoredRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, StoredRecord>(&format!(
            r#"
            SELECT unique_id, title, link, creator, written_at, description, category, saved_at
            FROM {table}
            WHERE unique_id = ?
        "#
        ))
        .bind(unique_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Count stored records.
    pub async fn count_records(&self, table: &TableName) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn write_chunks(
    tx: &mut Transaction<'_, Sqlite>,
    table: &TableName,
    records: &[&NewsRecord],
) -> Result<(), sqlx::Error> {
    for chunk in records.chunks(BATCH_SIZE) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {table} (unique_id, title, link, creator, written_at, description, category) "
        ));

        builder.push_values(chunk, |mut b, record| {
            b.push_bind(record.unique_id)
                .push_bind(record.title.clone())
                .push_bind(record.link.clone())
                .push_bind(record.creator.clone())
                .push_bind(record.published_at.clone())
                .push_bind(record.description.clone())
                .push_bind(record.category.clone());
        });

        builder.push(format!(
            " ON CONFLICT(unique_id) DO UPDATE SET \
             title = excluded.title, \
             link = excluded.link, \
             creator = excluded.creator, \
             written_at = excluded.written_at, \
             description = excluded.description, \
             category = excluded.category, \
             saved_at = {NOW_EXPR}"
        ));

        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

/// Keeps one record per `unique_id` (the last one), in first-seen order.
fn last_occurrence_per_id(records: &[NewsRecord]) -> Vec<&NewsRecord> {
    let mut slot_of: HashMap<i64, usize> = HashMap::with_capacity(records.len());
    let mut batch: Vec<&NewsRecord> = Vec::with_capacity(records.len());

    for record in records {
        match slot_of.get(&record.unique_id) {
            Some(&slot) => batch[slot] = record,
            None => {
                slot_of.insert(record.unique_id, batch.len());
                batch.push(record);
            }
        }
    }

    batch
}
