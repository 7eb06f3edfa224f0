//! Schema model discovery
//!
//! [`ModelBuilder`] turns registered record types into a [`SchemaModel`].
//! Record types reachable through navigations or foreign keys are discovered
//! automatically, and implicit many-to-many link tables can be declared
//! explicitly.

use crate::model::entity::{EntityDescriptor, EntityRef, FieldKind};
use crate::model::{ColumnDescriptor, ForeignKeyDescriptor, SchemaModel, TableDescriptor};
use crate::model::{Entity, ValueType};
use anyhow::{anyhow, Result};
use std::collections::HashSet;

/// Source of the schema model a database is built from
pub trait SchemaProvider: Send + Sync {
    fn schema_model(&self) -> Result<SchemaModel>;
}

impl SchemaProvider for SchemaModel {
    fn schema_model(&self) -> Result<SchemaModel> {
        Ok(self.clone())
    }
}

impl SchemaProvider for ModelBuilder {
    fn schema_model(&self) -> Result<SchemaModel> {
        self.build()
    }
}

#[derive(Debug, Clone)]
struct LinkTable {
    name: String,
    schema: Option<String>,
    left: EntityRef,
    right: EntityRef,
}

/// Collects record types and link tables into a schema model
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    entities: Vec<EntityRef>,
    links: Vec<LinkTable>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type
    pub fn entity<T: Entity>(self) -> Self {
        self.entity_ref(T::descriptor)
    }

    pub fn entity_ref(mut self, entity: EntityRef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Declare an implicit many-to-many link table between two record types
    ///
    /// The table gets one foreign key per side, a composite primary key and no
    /// navigations, which is the shape the dialect adapter treats as a join
    /// table.
    pub fn link_table(mut self, name: &str, left: EntityRef, right: EntityRef) -> Self {
        self.links.push(LinkTable {
            name: name.to_string(),
            schema: None,
            left,
            right,
        });
        self
    }

    /// Same as [`link_table`](Self::link_table) with an explicit schema
    pub fn link_table_in_schema(
        mut self,
        schema: &str,
        name: &str,
        left: EntityRef,
        right: EntityRef,
    ) -> Self {
        self.links.push(LinkTable {
            name: name.to_string(),
            schema: Some(schema.to_string()),
            left,
            right,
        });
        self
    }

    /// Build the schema model
    pub fn build(&self) -> Result<SchemaModel> {
        let mut model = SchemaModel::default();
        let mut seen = HashSet::new();
        let mut queue: Vec<EntityRef> = self.entities.clone();
        for link in &self.links {
            queue.push(link.left);
            queue.push(link.right);
        }

        let mut index = 0;
        while index < queue.len() {
            let descriptor = queue[index]();
            index += 1;
            if !seen.insert(descriptor.name) {
                continue;
            }

            for field in &descriptor.fields {
                match field.kind {
                    FieldKind::Reference(target) | FieldKind::Collection(target) => {
                        queue.push(target)
                    }
                    FieldKind::Owned(_) | FieldKind::Scalar(_) => {}
                }
                if let Some(principal) = field.references {
                    queue.push(principal);
                }
            }

            model.add_table(entity_table(&descriptor)?);
        }

        for link in &self.links {
            if model.table(&link.name).is_some() {
                return Err(anyhow!(
                    "Link table '{}' collides with an entity of the same name",
                    link.name
                ));
            }
            model.add_table(link_table(link)?);
        }

        Ok(model)
    }
}

fn entity_table(descriptor: &EntityDescriptor) -> Result<TableDescriptor> {
    if descriptor.table.is_empty() {
        return Err(anyhow!("Entity type {} has no table name", descriptor.name));
    }

    let mut table = TableDescriptor::new(descriptor.name, descriptor.table);
    table.schema = descriptor.schema.map(str::to_string);
    table.primary_key = descriptor
        .primary_key()
        .into_iter()
        .map(str::to_string)
        .collect();

    for field in descriptor.columns() {
        let column_type = field.kind.column_type().unwrap_or(ValueType::Text);
        table.columns.push(ColumnDescriptor {
            name: field.name.to_string(),
            column_type,
            nullable: field.nullable,
            default_sql: field.default_sql.map(str::to_string),
            computed_sql: field.computed_sql.map(str::to_string),
        });

        if let Some(principal) = field.references {
            let principal = principal();
            table.foreign_keys.push(ForeignKeyDescriptor {
                columns: vec![field.name.to_string()],
                principal: principal.name.to_string(),
                principal_columns: key_columns(&principal)?,
            });
        }
    }

    table.navigation_count = descriptor.navigations().count();

    Ok(table)
}

fn link_table(link: &LinkTable) -> Result<TableDescriptor> {
    let left = (link.left)();
    let right = (link.right)();
    let mut table = TableDescriptor::new(link.name.as_str(), link.name.as_str());
    table.schema = link.schema.clone();

    let sides = [(&left, ""), (&right, if left.name == right.name { "Related" } else { "" })];
    for (principal, prefix) in sides {
        let principal_columns = key_columns(principal)?;
        let mut columns = Vec::new();
        for key in &principal_columns {
            let key_type = principal
                .find_field(key)
                .and_then(|f| f.kind.column_type())
                .unwrap_or(ValueType::Integer);
            let name = format!("{}{}{}", prefix, principal.name, key);
            table.columns.push(ColumnDescriptor::new(name.clone(), key_type));
            table.primary_key.push(name.clone());
            columns.push(name);
        }
        table.foreign_keys.push(ForeignKeyDescriptor {
            columns,
            principal: principal.name.to_string(),
            principal_columns,
        });
    }

    Ok(table)
}

fn key_columns(descriptor: &EntityDescriptor) -> Result<Vec<String>> {
    let keys: Vec<String> = descriptor
        .primary_key()
        .into_iter()
        .map(str::to_string)
        .collect();
    if keys.is_empty() {
        return Err(anyhow!(
            "Entity type {} is referenced by a foreign key but has no primary key",
            descriptor.name
        ));
    }
    Ok(keys)
}
