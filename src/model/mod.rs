//! Schema model
//!
//! In-memory description of tables, columns and foreign keys as authored for
//! the production database. A [`SchemaModel`] is produced by a
//! [`SchemaProvider`], rewritten by the dialect adapter during schema creation,
//! and then turned into SQLite DDL.
//!
//! ```text
//! model/
//! ├── value    # Value, ValueType, Row
//! ├── entity   # Entity, EntityDescriptor, FieldDescriptor
//! └── builder  # ModelBuilder, SchemaProvider
//! ```

pub mod builder;
pub mod entity;
pub mod value;

pub use builder::{ModelBuilder, SchemaProvider};
pub use entity::{Entity, EntityDescriptor, EntityRef, FieldDescriptor, FieldKind, SeedRecord};
pub use value::{FromValue, Row, Value, ValueType};

use std::collections::{HashMap, HashSet};

/// A column of a table
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ValueType,
    pub nullable: bool,
    /// Default value expression, dialect specific
    pub default_sql: Option<String>,
    /// Computed value expression, dialect specific
    pub computed_sql: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ValueType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            default_sql: None,
            computed_sql: None,
        }
    }
}

/// A foreign key from a dependent table to its principal
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDescriptor {
    pub columns: Vec<String>,
    /// Entity key of the principal table
    pub principal: String,
    pub principal_columns: Vec<String>,
}

/// A table of the schema model
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    /// Stable key of the record type (or link table) behind this table
    pub entity: String,
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    /// Reference and collection navigations of the record type, backed by a
    /// foreign key or not
    pub navigation_count: usize,
}

impl TableDescriptor {
    pub fn new(entity: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            schema: None,
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            navigation_count: 0,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Qualified display name, `schema.table` when a schema is set
    pub fn display_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

/// The full set of tables to create
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaModel {
    tables: Vec<TableDescriptor>,
}

impl SchemaModel {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut [TableDescriptor] {
        &mut self.tables
    }

    pub fn add_table(&mut self, table: TableDescriptor) {
        self.tables.push(table);
    }

    /// Look up a table by the entity key it was created for
    pub fn table(&self, entity: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.entity == entity)
    }

    pub fn table_mut(&mut self, entity: &str) -> Option<&mut TableDescriptor> {
        self.tables.iter_mut().find(|t| t.entity == entity)
    }

    /// Table names that occur more than once, compared case-insensitively
    /// since SQLite identifiers are case-insensitive
    pub fn duplicate_table_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for table in &self.tables {
            let key = table.name.to_lowercase();
            if !seen.insert(key) && !duplicates.contains(&table.name) {
                duplicates.push(table.name.clone());
            }
        }
        duplicates
    }

    /// Insert rank of every table: principals rank before their dependents
    ///
    /// Self references are ignored. Tables caught in a foreign key cycle keep
    /// the rank reached when the iteration bound is hit.
    pub fn dependency_ranks(&self) -> HashMap<&str, usize> {
        let mut ranks: HashMap<&str, usize> =
            self.tables.iter().map(|t| (t.entity.as_str(), 0)).collect();

        for _ in 0..self.tables.len() {
            let mut changed = false;
            for table in &self.tables {
                let required = table
                    .foreign_keys
                    .iter()
                    .filter(|fk| fk.principal != table.entity)
                    .filter_map(|fk| ranks.get(fk.principal.as_str()))
                    .map(|rank| rank + 1)
                    .max()
                    .unwrap_or(0);
                if let Some(rank) = ranks.get_mut(table.entity.as_str()) {
                    if required > *rank {
                        *rank = required;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        ranks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_fk(entity: &str, principal: Option<&str>) -> TableDescriptor {
        let mut table = TableDescriptor::new(entity, entity);
        if let Some(p) = principal {
            table.foreign_keys.push(ForeignKeyDescriptor {
                columns: vec![format!("{}Id", p)],
                principal: p.to_string(),
                principal_columns: vec!["Id".to_string()],
            });
        }
        table
    }

    #[test]
    fn test_duplicate_table_names_ignore_case() {
        let model = SchemaModel::new(vec![
            TableDescriptor::new("A", "dbo_Item"),
            TableDescriptor::new("B", "DBO_ITEM"),
            TableDescriptor::new("C", "dbo_Other"),
        ]);
        assert_eq!(model.duplicate_table_names(), vec!["DBO_ITEM".to_string()]);
    }

    #[test]
    fn test_dependency_ranks_put_principals_first() {
        let model = SchemaModel::new(vec![
            table_with_fk("Line", Some("Order")),
            table_with_fk("Order", Some("Customer")),
            table_with_fk("Customer", Some("Customer")),
        ]);
        let ranks = model.dependency_ranks();
        assert_eq!(ranks["Customer"], 0);
        assert_eq!(ranks["Order"], 1);
        assert_eq!(ranks["Line"], 2);
    }

    #[test]
    fn test_display_name() {
        let mut table = TableDescriptor::new("Person", "Person");
        assert_eq!(table.display_name(), "Person");
        table.schema = Some("HR".to_string());
        assert_eq!(table.display_name(), "HR.Person");
    }
}
