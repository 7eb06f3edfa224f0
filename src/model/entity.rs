//! Record types and their field descriptors
//!
//! Record types describe themselves through an [`EntityDescriptor`] instead of
//! runtime reflection. The descriptor lists every field together with the
//! information the schema builder and the random generator need: the value
//! type, whether the field is an owned value or a navigation to another
//! record, and the column attributes authored for the production database.

use crate::error::SeedError;
use crate::model::value::{Row, ValueType};
use std::fmt::Debug;

/// Lazily evaluated descriptor of another record type
///
/// A function pointer rather than a value so that record types can refer to
/// each other (and to themselves) without building infinite descriptors.
pub type EntityRef = fn() -> EntityDescriptor;

/// Shape of a field
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// A plain column value
    Scalar(ValueType),
    /// A complex value owned by the record and stored inline
    Owned(EntityRef),
    /// Navigation to a single related record
    Reference(EntityRef),
    /// Navigation to a collection of related records
    Collection(EntityRef),
}

impl FieldKind {
    /// Navigation properties point at other records rather than holding a value
    pub fn is_navigation(&self) -> bool {
        matches!(self, FieldKind::Reference(_) | FieldKind::Collection(_))
    }

    /// Column type for the field, `None` for navigations
    pub fn column_type(&self) -> Option<ValueType> {
        match self {
            FieldKind::Scalar(t) => Some(*t),
            FieldKind::Owned(_) => Some(ValueType::Text),
            FieldKind::Reference(_) | FieldKind::Collection(_) => None,
        }
    }
}

/// Describes one field of a record type
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub primary_key: bool,
    /// Default value expression in the production dialect
    pub default_sql: Option<&'static str>,
    /// Computed value expression in the production dialect
    pub computed_sql: Option<&'static str>,
    /// Principal record type when the field is a foreign key column
    pub references: Option<EntityRef>,
}

impl FieldDescriptor {
    fn with_kind(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            primary_key: false,
            default_sql: None,
            computed_sql: None,
            references: None,
        }
    }

    pub fn scalar(name: &'static str, value_type: ValueType) -> Self {
        Self::with_kind(name, FieldKind::Scalar(value_type))
    }

    pub fn owned(name: &'static str, target: EntityRef) -> Self {
        Self::with_kind(name, FieldKind::Owned(target))
    }

    pub fn reference(name: &'static str, target: EntityRef) -> Self {
        Self::with_kind(name, FieldKind::Reference(target)).nullable()
    }

    pub fn collection(name: &'static str, target: EntityRef) -> Self {
        Self::with_kind(name, FieldKind::Collection(target)).nullable()
    }

    pub fn key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_sql(mut self, expr: &'static str) -> Self {
        self.default_sql = Some(expr);
        self
    }

    pub fn computed(mut self, expr: &'static str) -> Self {
        self.computed_sql = Some(expr);
        self
    }

    pub fn foreign_key(mut self, principal: EntityRef) -> Self {
        self.references = Some(principal);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.kind.is_navigation()
    }
}

/// Describes a record type: its identity, its production table and its fields
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    /// Stable identity of the record type
    pub name: &'static str,
    pub schema: Option<&'static str>,
    pub table: &'static str,
    pub fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// New descriptor whose table name defaults to the record name
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            schema: None,
            table: name,
            fields: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: &'static str) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn table(mut self, table: &'static str) -> Self {
        self.table = table;
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that map to columns
    pub fn columns(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.is_navigation())
    }

    pub fn navigations(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_navigation())
    }

    pub fn primary_key(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name)
            .collect()
    }
}

/// A record type that can be described, stored and rebuilt from a [`Row`]
///
/// `from_row` must tolerate `Null` for navigation fields and leave them empty.
pub trait Entity: Debug + Send + Sync + Sized + 'static {
    fn descriptor() -> EntityDescriptor;

    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self, SeedError>;
}

/// Object-safe view of a record waiting to be persisted
pub trait SeedRecord: Debug + Send + Sync {
    fn record_descriptor(&self) -> EntityDescriptor;

    fn record_row(&self) -> Row;
}

impl<T: Entity> SeedRecord for T {
    fn record_descriptor(&self) -> EntityDescriptor {
        T::descriptor()
    }

    fn record_row(&self) -> Row {
        self.to_row()
    }
}
