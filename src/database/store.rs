//! Seeded store handle
//!
//! `TestDatabase` is what a build returns: a connection to the store, the
//! translated schema model it was created from, and a list of tracked records
//! that have not been written yet.

use crate::database::core::{quote_ident, DatabaseConn, StoreIdentity};
use crate::error::SeedError;
use crate::model::{Entity, FieldKind, Row, SchemaModel, SeedRecord, TableDescriptor, Value};
use anyhow::anyhow;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::debug;

/// One parameterized INSERT
struct InsertStatement {
    sql: String,
    params: Vec<Value>,
}

/// Handle on a built test database
pub struct TestDatabase {
    conn: DatabaseConn,
    model: Arc<SchemaModel>,
    tracked: Vec<Arc<dyn SeedRecord>>,
}

impl std::fmt::Debug for TestDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDatabase")
            .field("store", self.conn.identity())
            .field("tables", &self.model.tables().len())
            .field("pending_changes", &self.tracked.len())
            .finish()
    }
}

impl TestDatabase {
    pub(crate) fn new(conn: DatabaseConn, model: Arc<SchemaModel>) -> Self {
        Self {
            conn,
            model,
            tracked: Vec::new(),
        }
    }

    /// A fresh handle on the same store with nothing tracked
    pub(crate) fn new_handle(&self) -> Result<TestDatabase, SeedError> {
        let conn = self.conn.reopen().map_err(SeedError::Engine)?;
        Ok(TestDatabase::new(conn, self.model.clone()))
    }

    pub fn store_id(&self) -> &StoreIdentity {
        self.conn.identity()
    }

    pub fn connection(&self) -> &DatabaseConn {
        &self.conn
    }

    /// The translated schema model the store was created from
    pub fn model(&self) -> &SchemaModel {
        &self.model
    }

    /// Number of tracked records not yet saved
    pub fn pending_changes(&self) -> usize {
        self.tracked.len()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.tracked.is_empty()
    }

    /// Track a record for insertion on the next [`save_changes`](Self::save_changes)
    pub fn add<T: Entity>(&mut self, record: T) {
        self.tracked.push(Arc::new(record));
    }

    pub fn add_record(&mut self, record: Arc<dyn SeedRecord>) {
        self.tracked.push(record);
    }

    /// Write every tracked record in a single transaction
    ///
    /// Principals are inserted before their dependents; records of the same
    /// table keep the order they were added in. Nothing is written, and the
    /// records stay tracked, when any insert fails.
    pub async fn save_changes(&mut self) -> Result<usize, SeedError> {
        if self.tracked.is_empty() {
            return Ok(0);
        }

        let statements = self.insert_statements()?;
        let count = statements.len();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let tx = conn
                    .unchecked_transaction()
                    .map_err(|e| anyhow!("Failed to begin transaction: {}", e))?;
                for statement in &statements {
                    let mut stmt = tx
                        .prepare_cached(&statement.sql)
                        .map_err(|e| anyhow!("Failed to prepare insert: {}", e))?;
                    stmt.execute(rusqlite::params_from_iter(statement.params.iter()))
                        .map_err(|e| anyhow!("Failed to insert record: {}", e))?;
                }
                tx.commit()
                    .map_err(|e| anyhow!("Failed to commit transaction: {}", e))
            })
        })
        .await
        .map_err(|e| SeedError::Engine(anyhow!("Seeding task failed: {}", e)))?
        .map_err(SeedError::Engine)?;

        self.tracked.clear();
        debug!("Saved {} records to {}", count, self.conn.identity());
        Ok(count)
    }

    fn insert_statements(&self) -> Result<Vec<InsertStatement>, SeedError> {
        let ranks = self.model.dependency_ranks();

        let mut ordered = Vec::with_capacity(self.tracked.len());
        for record in &self.tracked {
            let descriptor = record.record_descriptor();
            let table = self.table_for(descriptor.name)?;
            let rank = ranks.get(table.entity.as_str()).copied().unwrap_or(0);
            ordered.push((rank, table, record.record_row()));
        }
        // stable, so insertion order is kept within a rank
        ordered.sort_by_key(|(rank, _, _)| *rank);

        Ok(ordered
            .into_iter()
            .map(|(_, table, row)| insert_statement(table, &row))
            .collect())
    }

    fn table_for(&self, entity: &str) -> Result<&TableDescriptor, SeedError> {
        self.model.table(entity).ok_or_else(|| {
            SeedError::Configuration(format!(
                "Record type {} is not part of the schema model",
                entity
            ))
        })
    }

    /// Name of the table records of `T` are stored in
    pub fn table_name<T: Entity>(&self) -> Result<&str, SeedError> {
        Ok(self.table_for(T::descriptor().name)?.name.as_str())
    }

    /// Read every record of type `T`
    pub fn query<T: Entity>(&self) -> Result<Vec<T>, SeedError> {
        let descriptor = T::descriptor();
        let table = self.table_for(descriptor.name)?;

        let columns: Vec<(String, FieldKind)> = table
            .columns
            .iter()
            .map(|column| {
                let kind = descriptor
                    .find_field(&column.name)
                    .map(|f| f.kind)
                    .unwrap_or(FieldKind::Scalar(column.column_type));
                (column.name.clone(), kind)
            })
            .collect();

        let sql = format!(
            "SELECT {} FROM {}",
            columns
                .iter()
                .map(|(name, _)| quote_ident(name))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(&table.name)
        );

        let rows = self
            .conn
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(|e| anyhow!("Failed to prepare query: {}", e))?;
                let mut result = stmt
                    .query([])
                    .map_err(|e| anyhow!("Failed to execute query: {}", e))?;

                let mut rows = Vec::new();
                while let Some(sql_row) = result
                    .next()
                    .map_err(|e| anyhow!("Failed to read row: {}", e))?
                {
                    let mut row = Row::new();
                    for (index, (name, kind)) in columns.iter().enumerate() {
                        let value = sql_row
                            .get_ref(index)
                            .map_err(|e| anyhow!("Failed to read column {}: {}", name, e))?;
                        row.set(name, Value::from_sql(name, value, kind)?);
                    }
                    rows.push(row);
                }
                Ok(rows)
            })
            .map_err(into_seed_error)?;

        rows.iter().map(T::from_row).collect()
    }

    /// Number of stored records of type `T`
    pub fn count<T: Entity>(&self) -> Result<u64, SeedError> {
        let table = self.table_name::<T>()?;
        self.conn.table_count(table).map_err(SeedError::Engine)
    }

    /// Run raw SQL against the store
    pub fn with_connection<R>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R, SeedError> {
        self.conn
            .with_conn(|conn| f(conn).map_err(|e| anyhow!("Query failed: {}", e)))
            .map_err(SeedError::Engine)
    }
}

/// Build the INSERT for one record
///
/// Computed columns are never written. A `Null` for a column that has a
/// default is left out so the default applies.
fn insert_statement(table: &TableDescriptor, row: &Row) -> InsertStatement {
    let mut names = Vec::new();
    let mut params = Vec::new();
    for column in &table.columns {
        if column.computed_sql.is_some() {
            continue;
        }
        let value = row.get(&column.name).cloned().unwrap_or(Value::Null);
        if value.is_null() && column.default_sql.is_some() {
            continue;
        }
        names.push(quote_ident(&column.name));
        params.push(value);
    }

    let sql = if names.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&table.name))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&table.name),
            names.join(", "),
            (1..=names.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    InsertStatement { sql, params }
}

// conversion failures inside a query keep their own variant
fn into_seed_error(e: anyhow::Error) -> SeedError {
    match e.downcast::<SeedError>() {
        Ok(seed) => seed,
        Err(other) => SeedError::Engine(other),
    }
}
