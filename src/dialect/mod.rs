//! Dialect adapter
//!
//! Rewrites a schema model authored for a production engine so that SQLite
//! accepts it. SQLite has no schemas, does not know the production engine's
//! default value functions, and evaluates computed columns with its own
//! function set. The adapter deals with each of these through a policy:
//!
//! | Concern | Default policy |
//! |---------|----------------|
//! | Table naming | prefix the table with its schema (`dbo` when absent) |
//! | Default values | case-insensitive lookup in a [`DefaultValueMap`], pass through when unmapped |
//! | Computed columns | strip the expression |
//! | Join tables | rename a table with exactly two foreign keys and no navigations to `{Left}_{Right}` |
//!
//! Each policy is either the default or a custom function, fixed when the
//! adapter is configured. All policies are total: unmapped or unsupported
//! input is handled by the policy and never raises an error.
//!
//! ```rust,ignore
//! use seedbed::dialect::{DialectAdapter, DefaultValuePolicy};
//!
//! let adapter = DialectAdapter::new()
//!     .with_default_value_mapping("(getdate())", "datetime('now')")
//!     .with_default_value_policy(DefaultValuePolicy::NullUnmapped);
//! ```

mod mssql;

pub use mssql::SQL_SERVER_DEFAULT_VALUES;

use crate::error::SeedError;
use crate::model::{ColumnDescriptor, SchemaModel, TableDescriptor};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Schema used by the default rename rule when a table has none
pub const DEFAULT_SCHEMA: &str = "dbo";

pub type RenameFn = Arc<dyn Fn(Option<&str>, &str) -> String + Send + Sync>;
pub type DefaultValueFn = Arc<dyn Fn(Option<&str>, &DefaultValueMap) -> Option<String> + Send + Sync>;
pub type ComputedColumnFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;
pub type JoinTableFn = Arc<dyn Fn(&TableDescriptor) -> bool + Send + Sync>;

/// How tables are renamed to make up for the missing schema support
#[derive(Clone)]
pub enum RenamePolicy {
    /// `{schema}_{table}`, skipped when the table already carries the prefix
    SchemaPrefix { default_schema: String },
    Custom(RenameFn),
}

/// How default value expressions are translated
#[derive(Clone)]
pub enum DefaultValuePolicy {
    /// Mapped values are replaced, unmapped values pass through unchanged
    PassThrough,
    /// Mapped values are replaced, unmapped values are removed
    NullUnmapped,
    Custom(DefaultValueFn),
}

/// What happens to computed column expressions
#[derive(Clone)]
pub enum ComputedColumnPolicy {
    /// Remove every computed expression
    Strip,
    /// Keep expressions as authored
    Keep,
    /// Rewrite an expression, `None` removes it
    Custom(ComputedColumnFn),
}

/// How join tables are recognized
#[derive(Clone)]
pub enum JoinTablePolicy {
    /// Exactly two foreign keys and no navigations at all
    TwoForeignKeys,
    Disabled,
    Custom(JoinTableFn),
}

impl std::fmt::Debug for RenamePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenamePolicy::SchemaPrefix { default_schema } => f
                .debug_struct("SchemaPrefix")
                .field("default_schema", default_schema)
                .finish(),
            RenamePolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl std::fmt::Debug for DefaultValuePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefaultValuePolicy::PassThrough => write!(f, "PassThrough"),
            DefaultValuePolicy::NullUnmapped => write!(f, "NullUnmapped"),
            DefaultValuePolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl std::fmt::Debug for ComputedColumnPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputedColumnPolicy::Strip => write!(f, "Strip"),
            ComputedColumnPolicy::Keep => write!(f, "Keep"),
            ComputedColumnPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl std::fmt::Debug for JoinTablePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinTablePolicy::TwoForeignKeys => write!(f, "TwoForeignKeys"),
            JoinTablePolicy::Disabled => write!(f, "Disabled"),
            JoinTablePolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Case-insensitive map from production default expressions to SQLite ones
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultValueMap {
    // lower-cased source -> (source as written, replacement)
    entries: BTreeMap<String, (String, String)>,
}

impl DefaultValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        self.entries.insert(from.to_lowercase(), (from, to.into()));
    }

    pub fn get(&self, expr: &str) -> Option<&str> {
        self.entries
            .get(&expr.to_lowercase())
            .map(|(_, to)| to.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(from, to)| (from.as_str(), to.as_str()))
    }
}

/// Translates a production schema model into one SQLite accepts
#[derive(Debug, Clone)]
pub struct DialectAdapter {
    rename: RenamePolicy,
    default_values: DefaultValuePolicy,
    default_value_map: DefaultValueMap,
    computed: ComputedColumnPolicy,
    join_tables: JoinTablePolicy,
}

impl Default for DialectAdapter {
    fn default() -> Self {
        Self {
            rename: RenamePolicy::SchemaPrefix {
                default_schema: DEFAULT_SCHEMA.to_string(),
            },
            default_values: DefaultValuePolicy::PassThrough,
            default_value_map: DefaultValueMap::new(),
            computed: ComputedColumnPolicy::Strip,
            join_tables: JoinTablePolicy::TwoForeignKeys,
        }
    }
}

impl DialectAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter preloaded with SQL Server default value translations
    ///
    /// SQL Server functions SQLite cannot evaluate are dropped, so unmapped
    /// defaults become `None`.
    pub fn for_sql_server() -> Self {
        SQL_SERVER_DEFAULT_VALUES
            .iter()
            .fold(Self::new(), |adapter, (from, to)| {
                adapter.with_default_value_mapping(from, to)
            })
            .with_default_value_policy(DefaultValuePolicy::NullUnmapped)
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    pub fn with_rename_rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(Option<&str>, &str) -> String + Send + Sync + 'static,
    {
        self.rename = RenamePolicy::Custom(Arc::new(rule));
        self
    }

    /// Keep the default rename rule but substitute a different default schema
    pub fn with_default_schema(mut self, schema: &str) -> Self {
        self.rename = RenamePolicy::SchemaPrefix {
            default_schema: schema.to_string(),
        };
        self
    }

    pub fn with_default_value_policy(mut self, policy: DefaultValuePolicy) -> Self {
        self.default_values = policy;
        self
    }

    pub fn with_default_value_mapping(mut self, from: &str, to: &str) -> Self {
        self.default_value_map.insert(from, to);
        self
    }

    pub fn with_computed_column_policy(mut self, policy: ComputedColumnPolicy) -> Self {
        self.computed = policy;
        self
    }

    pub fn with_join_table_policy(mut self, policy: JoinTablePolicy) -> Self {
        self.join_tables = policy;
        self
    }

    pub fn with_join_table_detector<F>(self, detector: F) -> Self
    where
        F: Fn(&TableDescriptor) -> bool + Send + Sync + 'static,
    {
        self.with_join_table_policy(JoinTablePolicy::Custom(Arc::new(detector)))
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn rename_policy(&self) -> &RenamePolicy {
        &self.rename
    }

    pub fn default_value_policy(&self) -> &DefaultValuePolicy {
        &self.default_values
    }

    pub fn default_value_map(&self) -> &DefaultValueMap {
        &self.default_value_map
    }

    pub fn computed_policy(&self) -> &ComputedColumnPolicy {
        &self.computed
    }

    pub fn join_table_policy(&self) -> &JoinTablePolicy {
        &self.join_tables
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// New name for a table once its schema is dropped
    pub fn rename_table(&self, schema: Option<&str>, table: &str) -> Result<String, SeedError> {
        if table.is_empty() {
            return Err(SeedError::Configuration(format!(
                "Table in schema '{}' has no name",
                schema.unwrap_or(DEFAULT_SCHEMA)
            )));
        }

        let renamed = match &self.rename {
            RenamePolicy::SchemaPrefix { default_schema } => {
                schema_prefix(schema.unwrap_or(default_schema), table)
            }
            RenamePolicy::Custom(rule) => rule(schema, table),
        };

        if renamed.is_empty() {
            return Err(SeedError::Configuration(format!(
                "Rename rule returned an empty name for table '{}'",
                table
            )));
        }
        Ok(renamed)
    }

    pub fn translate_default_value(&self, expr: Option<&str>) -> Option<String> {
        match &self.default_values {
            DefaultValuePolicy::PassThrough => {
                let expr = expr?;
                Some(
                    self.default_value_map
                        .get(expr)
                        .unwrap_or(expr)
                        .to_string(),
                )
            }
            DefaultValuePolicy::NullUnmapped => {
                expr.and_then(|e| self.default_value_map.get(e).map(str::to_string))
            }
            DefaultValuePolicy::Custom(policy) => policy(expr, &self.default_value_map),
        }
    }

    pub fn strip_computed_column(&self, column: &mut ColumnDescriptor) {
        let Some(expr) = column.computed_sql.take() else {
            return;
        };
        column.computed_sql = match &self.computed {
            ComputedColumnPolicy::Strip => None,
            ComputedColumnPolicy::Keep => Some(expr),
            ComputedColumnPolicy::Custom(rewrite) => rewrite(&expr),
        };
        if column.computed_sql.is_none() {
            // the column now holds plain stored values
            column.nullable = true;
        }
    }

    pub fn detect_join_table(&self, table: &TableDescriptor) -> bool {
        match &self.join_tables {
            JoinTablePolicy::TwoForeignKeys => {
                table.foreign_keys.len() == 2 && table.navigation_count == 0
            }
            JoinTablePolicy::Disabled => false,
            JoinTablePolicy::Custom(detector) => detector(table),
        }
    }

    /// Rewrite the whole model
    ///
    /// Tables are renamed and stripped of their schema first; join tables are
    /// renamed afterwards from their principals' translated names so the result
    /// does not depend on table order.
    pub fn translate(&self, model: &mut SchemaModel) -> Result<(), SeedError> {
        for table in model.tables_mut() {
            let renamed = self.rename_table(table.schema.as_deref(), &table.name)?;
            if renamed != table.name {
                debug!("Renaming table {} to {}", table.display_name(), renamed);
                table.name = renamed;
            }
            table.schema = None;

            for column in &mut table.columns {
                self.strip_computed_column(column);

                let translated = self.translate_default_value(column.default_sql.as_deref());
                if translated != column.default_sql {
                    debug!(
                        "Default value of {}.{}: {:?} -> {:?}",
                        table.name, column.name, column.default_sql, translated
                    );
                    column.default_sql = translated;
                }
            }
        }

        let join_names: Vec<(usize, String)> = model
            .tables()
            .iter()
            .enumerate()
            .filter(|(_, table)| self.detect_join_table(table))
            .filter_map(|(index, table)| {
                let left = model.table(&table.foreign_keys.first()?.principal)?;
                let right = model.table(&table.foreign_keys.get(1)?.principal)?;
                Some((index, format!("{}_{}", left.name, right.name)))
            })
            .collect();

        for (index, name) in join_names {
            let table = &mut model.tables_mut()[index];
            debug!("Renaming join table {} to {}", table.name, name);
            table.name = name;
        }

        Ok(())
    }
}

fn schema_prefix(schema: &str, table: &str) -> String {
    let prefix = format!("{}_", schema);
    if table.to_lowercase().starts_with(&prefix.to_lowercase()) {
        table.to_string()
    } else {
        format!("{}{}", prefix, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, ForeignKeyDescriptor, ModelBuilder, ValueType};
    use crate::testing::{OrderTag, Person, Tag};

    fn fk(principal: &str) -> ForeignKeyDescriptor {
        ForeignKeyDescriptor {
            columns: vec![format!("{}Id", principal)],
            principal: principal.to_string(),
            principal_columns: vec!["Id".to_string()],
        }
    }

    #[test]
    fn test_rename_with_default_rule() {
        let adapter = DialectAdapter::new();
        assert_eq!(
            adapter.rename_table(Some("Personnel"), "Person").unwrap(),
            "Personnel_Person"
        );
        assert_eq!(adapter.rename_table(None, "Person").unwrap(), "dbo_Person");
        assert_eq!(
            adapter.rename_table(Some("dbo"), "Person").unwrap(),
            "dbo_Person"
        );
        assert_eq!(
            adapter.rename_table(Some("dbo"), "dbo_Person").unwrap(),
            "dbo_Person"
        );
        assert_eq!(
            adapter.rename_table(Some("DBO"), "dbo_Person").unwrap(),
            "dbo_Person"
        );
    }

    #[test]
    fn test_rename_is_idempotent() {
        let adapter = DialectAdapter::new();
        let cases = [
            (Some("Sales"), "Order"),
            (None, "Tag"),
            (Some("HR"), "HR_Employee"),
            (Some("x"), "y"),
        ];
        for (schema, table) in cases {
            let once = adapter.rename_table(schema, table).unwrap();
            let twice = adapter.rename_table(schema, &once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_rename_with_custom_rule() {
        let adapter = DialectAdapter::new().with_rename_rule(|schema, table| {
            let prefix = format!("{}$", schema.unwrap_or("dbo"));
            if table.starts_with(&prefix) {
                table.to_string()
            } else {
                format!("{}{}", prefix, table)
            }
        });
        assert_eq!(
            adapter.rename_table(Some("Personnel"), "Person").unwrap(),
            "Personnel$Person"
        );
        assert_eq!(adapter.rename_table(None, "dbo$Person").unwrap(), "dbo$Person");
        assert!(matches!(adapter.rename_policy(), RenamePolicy::Custom(_)));
    }

    #[test]
    fn test_rename_with_different_default_schema() {
        let adapter = DialectAdapter::new().with_default_schema("main");
        assert_eq!(adapter.rename_table(None, "Tag").unwrap(), "main_Tag");
    }

    #[test]
    fn test_rename_without_name_is_configuration_error() {
        let adapter = DialectAdapter::new();
        assert!(matches!(
            adapter.rename_table(Some("dbo"), ""),
            Err(SeedError::Configuration(_))
        ));

        let empty = DialectAdapter::new().with_rename_rule(|_, _| String::new());
        assert!(empty.rename_table(None, "Tag").is_err());
    }

    #[test]
    fn test_translate_default_value_mapping() {
        let adapter = DialectAdapter::new()
            .with_default_value_mapping("(newid())", "lower(hex(randomblob(16)))")
            .with_default_value_mapping("(getdate())", "datetime('now')");
        assert_eq!(
            adapter.translate_default_value(Some("(newid())")).as_deref(),
            Some("lower(hex(randomblob(16)))")
        );
        assert_eq!(
            adapter.translate_default_value(Some("(GETDATE())")).as_deref(),
            Some("datetime('now')")
        );
        assert_eq!(
            adapter.translate_default_value(Some("(unknown)")).as_deref(),
            Some("(unknown)")
        );
        assert_eq!(adapter.translate_default_value(None), None);
        assert_eq!(adapter.default_value_map().len(), 2);
    }

    #[test]
    fn test_sql_server_preset_nulls_unmapped() {
        let adapter = DialectAdapter::for_sql_server();
        assert!(matches!(
            adapter.default_value_policy(),
            DefaultValuePolicy::NullUnmapped
        ));
        assert_eq!(adapter.translate_default_value(Some("(unknown value)")), None);
        assert_eq!(adapter.translate_default_value(Some("")), None);
        assert_eq!(adapter.translate_default_value(None), None);
        assert_eq!(
            adapter.translate_default_value(Some("(newid())")).as_deref(),
            Some("lower(hex(randomblob(16)))")
        );
    }

    #[test]
    fn test_custom_default_policy_overrides_preset() {
        let adapter = DialectAdapter::for_sql_server()
            .with_default_value_policy(DefaultValuePolicy::Custom(Arc::new(|_, _| None)));
        assert_eq!(adapter.translate_default_value(Some("(getdate())")), None);
        assert_eq!(adapter.translate_default_value(Some("(newid())")), None);
    }

    #[test]
    fn test_translate_default_value_custom() {
        let adapter = DialectAdapter::new().with_default_value_policy(DefaultValuePolicy::Custom(
            Arc::new(|expr, _| expr.map(|e| e.trim_matches(|c| c == '(' || c == ')').to_string())),
        ));
        assert_eq!(
            adapter.translate_default_value(Some("((0))")).as_deref(),
            Some("0")
        );
    }

    #[test]
    fn test_strip_computed_column_policies() {
        let mut column = ColumnDescriptor::new("FullName", ValueType::Text);
        column.computed_sql = Some("([First]+' '+[Last])".to_string());

        let mut stripped = column.clone();
        DialectAdapter::new().strip_computed_column(&mut stripped);
        assert_eq!(stripped.computed_sql, None);
        assert!(stripped.nullable);

        let mut kept = column.clone();
        DialectAdapter::new()
            .with_computed_column_policy(ComputedColumnPolicy::Keep)
            .strip_computed_column(&mut kept);
        assert_eq!(kept, column);

        let mut rewritten = column.clone();
        DialectAdapter::new()
            .with_computed_column_policy(ComputedColumnPolicy::Custom(Arc::new(|expr| {
                Some(expr.replace('+', "||"))
            })))
            .strip_computed_column(&mut rewritten);
        assert_eq!(
            rewritten.computed_sql.as_deref(),
            Some("([First]||' '||[Last])")
        );
    }

    #[test]
    fn test_detect_join_table() {
        let adapter = DialectAdapter::new();

        let mut join = TableDescriptor::new("PersonTag", "PersonTag");
        join.foreign_keys = vec![fk("Person"), fk("Tag")];
        assert!(adapter.detect_join_table(&join));

        let mut single = TableDescriptor::new("Order", "Order");
        single.foreign_keys = vec![fk("Person")];
        assert!(!adapter.detect_join_table(&single));

        let mut with_collection = join.clone();
        with_collection.navigation_count = 1;
        assert!(!adapter.detect_join_table(&with_collection));

        let disabled = DialectAdapter::new().with_join_table_policy(JoinTablePolicy::Disabled);
        assert!(!disabled.detect_join_table(&join));
    }

    #[test]
    fn test_translate_model() {
        let mut model = ModelBuilder::new()
            .entity::<Person>()
            .link_table("PersonTag", Person::descriptor, Tag::descriptor)
            .build()
            .unwrap();

        DialectAdapter::for_sql_server().translate(&mut model).unwrap();

        let person = model.table("Person").unwrap();
        assert_eq!(person.name, "Person_Person");
        assert_eq!(person.schema, None);
        assert_eq!(person.column("FullName").unwrap().computed_sql, None);
        assert_eq!(
            person.column("Rowguid").unwrap().default_sql.as_deref(),
            Some("lower(hex(randomblob(16)))")
        );
        assert_eq!(model.table("Order").unwrap().name, "Sales_SalesOrder");
        assert_eq!(model.table("Tag").unwrap().name, "dbo_Tag");
        assert_eq!(model.table("PersonTag").unwrap().name, "Person_Person_dbo_Tag");
        assert!(model.duplicate_table_names().is_empty());
    }

    #[test]
    fn test_explicit_join_entity_keeps_its_name() {
        let mut model = ModelBuilder::new().entity::<OrderTag>().build().unwrap();
        DialectAdapter::for_sql_server().translate(&mut model).unwrap();

        let join = model.table("OrderTag").unwrap();
        assert!(!DialectAdapter::for_sql_server().detect_join_table(join));
        assert_eq!(join.name, "Sales_OrderTag");
        assert_eq!(model.table("Order").unwrap().name, "Sales_SalesOrder");
    }

    #[test]
    fn test_translate_is_deterministic() {
        let builder = ModelBuilder::new()
            .entity::<Person>()
            .link_table("PersonTag", Person::descriptor, Tag::descriptor);
        let adapter = DialectAdapter::for_sql_server();

        let mut first = builder.build().unwrap();
        let mut second = builder.build().unwrap();
        adapter.translate(&mut first).unwrap();
        adapter.translate(&mut second).unwrap();
        assert_eq!(first, second);
    }
}
