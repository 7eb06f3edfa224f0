//! Database schema management
//!
//! Turns a translated [`SchemaModel`] into SQLite DDL and applies it. Every
//! statement uses `IF NOT EXISTS`, so initializing a store that already holds
//! the schema is a no-op.

use crate::database::core::connection::{quote_ident, table_exists};
use crate::model::{ColumnDescriptor, SchemaModel, TableDescriptor};
use anyhow::{anyhow, Result};
use rusqlite::Connection;
use tracing::debug;

/// Generates DDL for the tables of a schema model
pub struct SchemaDefinitions<'a> {
    model: &'a SchemaModel,
}

impl<'a> SchemaDefinitions<'a> {
    pub fn new(model: &'a SchemaModel) -> Self {
        Self { model }
    }

    /// `CREATE TABLE` statements, principals before their dependents
    pub fn create_statements(&self) -> Result<Vec<String>> {
        let duplicates = self.model.duplicate_table_names();
        if !duplicates.is_empty() {
            return Err(anyhow!(
                "Table names are not unique after translation: {}",
                duplicates.join(", ")
            ));
        }

        let ranks = self.model.dependency_ranks();
        let mut tables: Vec<&TableDescriptor> = self.model.tables().iter().collect();
        tables.sort_by_key(|t| ranks.get(t.entity.as_str()).copied().unwrap_or(0));

        tables.into_iter().map(|t| self.create_table(t)).collect()
    }

    pub fn create_table(&self, table: &TableDescriptor) -> Result<String> {
        if table.schema.is_some() {
            return Err(anyhow!(
                "Table {} still carries a schema; SQLite tables are not namespaced",
                table.display_name()
            ));
        }

        let mut lines: Vec<String> = table.columns.iter().map(column_definition).collect();

        if !table.primary_key.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", column_list(&table.primary_key)));
        }

        for fk in &table.foreign_keys {
            let principal = self.model.table(&fk.principal).ok_or_else(|| {
                anyhow!(
                    "Foreign key on table {} references '{}', which is not part of the model",
                    table.name,
                    fk.principal
                )
            })?;
            lines.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                column_list(&fk.columns),
                quote_ident(&principal.name),
                column_list(&fk.principal_columns)
            ));
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&table.name),
            lines.join(",\n    ")
        ))
    }
}

fn column_definition(column: &ColumnDescriptor) -> String {
    let mut definition = format!(
        "{} {}",
        quote_ident(&column.name),
        column.column_type.sql_type()
    );
    if let Some(expr) = &column.computed_sql {
        definition.push_str(&format!(" GENERATED ALWAYS AS ({}) VIRTUAL", expr));
        return definition;
    }
    if !column.nullable {
        definition.push_str(" NOT NULL");
    }
    if let Some(expr) = &column.default_sql {
        definition.push_str(&format!(" DEFAULT ({})", expr));
    }
    definition
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Schema manager for a seeded store
pub struct SchemaManager<'a> {
    conn: &'a Connection,
    model: &'a SchemaModel,
}

impl<'a> SchemaManager<'a> {
    /// Create a new schema manager for the given connection
    pub fn new(conn: &'a Connection, model: &'a SchemaModel) -> Self {
        Self { conn, model }
    }

    /// Create every table of the model that does not exist yet
    pub fn initialize(&self) -> Result<()> {
        let statements = SchemaDefinitions::new(self.model).create_statements()?;
        for sql in statements {
            debug!("{}", sql);
            self.conn
                .execute(&sql, [])
                .map_err(|e| anyhow!("Failed to create table: {}", e))?;
        }
        Ok(())
    }

    /// Check the current schema status
    pub fn check_status(&self) -> Result<SchemaStatus> {
        let mut missing = Vec::new();
        for table in self.model.tables() {
            if !table_exists(self.conn, &table.name)? {
                missing.push(table.name.clone());
            }
        }

        if missing.is_empty() {
            Ok(SchemaStatus::Current)
        } else if missing.len() == self.model.tables().len() {
            Ok(SchemaStatus::NotInitialized)
        } else {
            Ok(SchemaStatus::Partial { missing })
        }
    }
}

/// Status of the database schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    /// None of the model's tables exist (fresh database)
    NotInitialized,

    /// Every table of the model exists
    Current,

    /// Some tables exist, the listed ones are missing
    Partial { missing: Vec<String> },
}
