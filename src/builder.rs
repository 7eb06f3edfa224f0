//! Seeded test database builder
//!
//! [`SeedBuilder`] collects the build configuration (engine, dialect adapter,
//! random generator, engine options and pending seed records) and turns it
//! into a ready [`TestDatabase`]:
//!
//! ```text
//! Configuring -> Connecting -> SchemaCreation -> Seeding -> Finalizing -> Ready
//! ```
//!
//! Configuration calls consume and return the builder; the ones that validate
//! their input return `Result<Self, SeedError>` and leave nothing behind on
//! failure. `build` only borrows the builder, so one configuration can produce
//! several stores.
//!
//! ```rust,ignore
//! let db = SeedBuilder::new(ModelBuilder::new().entity::<Person>())
//!     .use_sqlite_for_sql_server()
//!     .seed_with_random::<Person>(10)?
//!     .build()
//!     .await?;
//! assert_eq!(db.count::<Person>()?, 10);
//! ```

use crate::config::{EngineKind, SeedConfig};
use crate::database::{DatabaseConn, EngineOptions, SchemaManager, SchemaStatus, TestDatabase};
use crate::dialect::DialectAdapter;
use crate::error::SeedError;
use crate::generator::{FixtureGenerator, RandomRecordGenerator};
use crate::model::{Entity, SchemaModel, SchemaProvider, SeedRecord, Value};
use anyhow::anyhow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Embedded engine a build runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Engine {
    /// Fresh named shared-cache memory database for every build
    InMemory,
    /// One connection held by the builder: private `:memory:` without a path,
    /// a database file otherwise. Every build shares its store.
    ///
    /// Each build inserts the pending seed records again, so building twice
    /// with seeded records that have fixed keys fails with a unique
    /// constraint error from the second build.
    Sqlite { path: Option<PathBuf> },
}

/// Stages of a build, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    Configuring,
    Connecting,
    SchemaCreation,
    Seeding,
    Finalizing,
    Ready,
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BuildStage::Configuring => "configuring",
            BuildStage::Connecting => "connecting",
            BuildStage::SchemaCreation => "schema creation",
            BuildStage::Seeding => "seeding",
            BuildStage::Finalizing => "finalizing",
            BuildStage::Ready => "ready",
        };
        write!(f, "{}", name)
    }
}

/// Anything passed to [`SeedBuilder::seed_with`]
///
/// Only records (and sequences of records) are accepted; `Null` and scalar
/// items exist so that invalid input can be reported instead of silently
/// dropped.
#[derive(Debug, Clone)]
pub enum SeedItem {
    Record(Arc<dyn SeedRecord>),
    Many(Vec<SeedItem>),
    Null,
    Scalar(Value),
}

impl<T: Entity> From<T> for SeedItem {
    fn from(record: T) -> Self {
        SeedItem::Record(Arc::new(record))
    }
}

impl From<Arc<dyn SeedRecord>> for SeedItem {
    fn from(record: Arc<dyn SeedRecord>) -> Self {
        SeedItem::Record(record)
    }
}

impl<T: Into<SeedItem>> From<Option<T>> for SeedItem {
    fn from(item: Option<T>) -> Self {
        item.map(Into::into).unwrap_or(SeedItem::Null)
    }
}

impl<T: Into<SeedItem>> From<Vec<T>> for SeedItem {
    fn from(items: Vec<T>) -> Self {
        SeedItem::Many(items.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for SeedItem {
    fn from(s: &str) -> Self {
        SeedItem::Scalar(Value::from(s))
    }
}

impl From<String> for SeedItem {
    fn from(s: String) -> Self {
        SeedItem::Scalar(Value::from(s))
    }
}

impl From<i64> for SeedItem {
    fn from(i: i64) -> Self {
        SeedItem::Scalar(Value::from(i))
    }
}

impl From<Value> for SeedItem {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SeedItem::Null,
            other => SeedItem::Scalar(other),
        }
    }
}

impl SeedItem {
    /// Flatten into records, rejecting null and scalar items
    fn flatten_into(self, records: &mut Vec<Arc<dyn SeedRecord>>) -> Result<(), SeedError> {
        match self {
            SeedItem::Record(record) => records.push(record),
            SeedItem::Many(items) => {
                for item in items {
                    item.flatten_into(records)?;
                }
            }
            SeedItem::Null => {
                return Err(SeedError::validation(
                    "records",
                    "One of the records is null",
                ))
            }
            SeedItem::Scalar(value) => {
                return Err(SeedError::validation(
                    "records",
                    format!(
                        "Scalar and string values cannot be seeded, found {:?}; pass records instead",
                        value
                    ),
                ))
            }
        }
        Ok(())
    }
}

/// Builds seeded SQLite test databases from a schema model
pub struct SeedBuilder {
    provider: Arc<dyn SchemaProvider>,
    engine: Engine,
    dialect: DialectAdapter,
    generator: Arc<dyn RandomRecordGenerator>,
    options: EngineOptions,
    pending: Vec<Arc<dyn SeedRecord>>,
    // connection held for `Engine::Sqlite`, opened by the first build
    held: Mutex<Option<DatabaseConn>>,
}

impl std::fmt::Debug for SeedBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedBuilder")
            .field("engine", &self.engine)
            .field("dialect", &self.dialect)
            .field("options", &self.options)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl SeedBuilder {
    /// New builder for the given schema model source
    ///
    /// Defaults: in-memory engine, default dialect adapter, random fixture
    /// generator, no extra engine options and no seed records.
    pub fn new(provider: impl SchemaProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
            engine: Engine::InMemory,
            dialect: DialectAdapter::new(),
            generator: Arc::new(FixtureGenerator::new()),
            options: EngineOptions::new(),
            pending: Vec::new(),
            held: Mutex::new(None),
        }
    }

    /// New builder with engine, dialect and generator taken from a [`SeedConfig`]
    pub fn from_config(
        provider: impl SchemaProvider + 'static,
        config: &SeedConfig,
    ) -> Result<Self, SeedError> {
        let mut builder = Self::new(provider);

        builder = match config.engine {
            EngineKind::InMemory => builder.use_in_memory(),
            EngineKind::Sqlite => builder.use_sqlite(),
            EngineKind::SqliteFile => {
                std::fs::create_dir_all(&config.data_dir).map_err(|e| {
                    SeedError::Configuration(format!(
                        "Unable to create data directory '{}': {}",
                        config.data_dir, e
                    ))
                })?;
                builder.use_sqlite_file(config.sqlite_path())
            }
        };

        if let Some(schema) = &config.default_schema {
            builder = builder.with_dialect(DialectAdapter::new().with_default_schema(schema));
        }
        if let Some(seed) = config.random_seed {
            builder = builder.with_generator(FixtureGenerator::seeded(seed));
        }
        if !config.foreign_keys {
            builder = builder.with_engine_options(EngineOptions::new().pragma("foreign_keys", "OFF"));
        }

        debug!("Seed configuration:\n{}", config.summary());
        Ok(builder)
    }

    // -------------------------------------------------------------------------
    // Engine selection
    // -------------------------------------------------------------------------

    fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self.held = Mutex::new(None);
        self
    }

    /// Fresh, independent in-memory store for every build
    pub fn use_in_memory(self) -> Self {
        self.with_engine(Engine::InMemory)
    }

    /// SQLite `:memory:` store held open by the builder
    pub fn use_sqlite(self) -> Self {
        self.with_engine(Engine::Sqlite { path: None })
    }

    /// SQLite database file held open by the builder
    pub fn use_sqlite_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_engine(Engine::Sqlite {
            path: Some(path.into()),
        })
    }

    /// SQLite `:memory:` store with the SQL Server dialect preset
    pub fn use_sqlite_for_sql_server(self) -> Self {
        self.use_sqlite()
            .with_dialect(DialectAdapter::for_sql_server())
    }

    // -------------------------------------------------------------------------
    // Collaborators
    // -------------------------------------------------------------------------

    pub fn with_dialect(mut self, dialect: DialectAdapter) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_generator(mut self, generator: impl RandomRecordGenerator + 'static) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    /// Low level engine settings, applied after the required ones
    pub fn with_engine_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self.held = Mutex::new(None);
        self
    }

    // -------------------------------------------------------------------------
    // Seed records
    // -------------------------------------------------------------------------

    /// Add records to seed the database with
    ///
    /// Nested sequences are flattened. A null or scalar item rejects the
    /// whole call.
    pub fn seed_with(mut self, records: impl Into<SeedItem>) -> Result<Self, SeedError> {
        let mut flattened = Vec::new();
        records.into().flatten_into(&mut flattened)?;
        self.pending.extend(flattened);
        Ok(self)
    }

    /// Add `count` random records of type `T`
    pub fn seed_with_random<T: Entity>(self, count: usize) -> Result<Self, SeedError> {
        self.seed_with_random_using::<T, _>(count, |record, _| record)
    }

    /// Add `count` random records of type `T`, each passed through `transform`
    /// together with its index
    pub fn seed_with_random_using<T, F>(mut self, count: usize, mut transform: F) -> Result<Self, SeedError>
    where
        T: Entity,
        F: FnMut(T, usize) -> T,
    {
        if count < 1 {
            return Err(SeedError::validation(
                "count",
                format!("count must be at least 1, got {}", count),
            ));
        }

        let rows = self.generator.generate_rows(&T::descriptor(), count)?;
        let mut records: Vec<Arc<dyn SeedRecord>> = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let record = transform(T::from_row(row)?, index);
            records.push(Arc::new(record));
        }
        self.pending.extend(records);
        Ok(self)
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn dialect(&self) -> &DialectAdapter {
        &self.dialect
    }

    pub fn engine_options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn pending_seed_count(&self) -> usize {
        self.pending.len()
    }

    // -------------------------------------------------------------------------
    // Build
    // -------------------------------------------------------------------------

    /// Create the store, seed it and return a clean handle
    pub async fn build(&self) -> Result<TestDatabase, SeedError> {
        info!(
            "Building test database ({:?}, {} seed records)",
            self.engine,
            self.pending.len()
        );
        log_stage(BuildStage::Configuring);

        log_stage(BuildStage::Connecting);
        let conn = self.connect()?;

        log_stage(BuildStage::SchemaCreation);
        let model = self.create_schema(&conn).await?;

        log_stage(BuildStage::Seeding);
        let mut seeding = TestDatabase::new(conn, model);
        for record in &self.pending {
            seeding.add_record(record.clone());
        }
        seeding.save_changes().await?;

        log_stage(BuildStage::Finalizing);
        // bind the returned handle before the seeding handle goes away
        let handle = seeding.new_handle()?;
        drop(seeding);

        log_stage(BuildStage::Ready);
        info!("Test database {} is ready", handle.store_id());
        Ok(handle)
    }

    fn connect(&self) -> Result<DatabaseConn, SeedError> {
        match &self.engine {
            Engine::InMemory => DatabaseConn::open_shared_memory(&self.options).map_err(SeedError::Engine),
            Engine::Sqlite { path } => {
                let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(conn) = held.as_ref() {
                    return Ok(conn.clone());
                }

                let conn = match path {
                    Some(path) => {
                        check_parent_dir(path)?;
                        DatabaseConn::open_path(path, &self.options)
                    }
                    None => DatabaseConn::open_private_memory(&self.options),
                }
                .map_err(SeedError::Engine)?;
                *held = Some(conn.clone());
                Ok(conn)
            }
        }
    }

    async fn create_schema(&self, conn: &DatabaseConn) -> Result<Arc<SchemaModel>, SeedError> {
        let mut model = self
            .provider
            .schema_model()
            .map_err(SeedError::schema_creation)?;
        self.dialect.translate(&mut model)?;
        let model = Arc::new(model);

        let task_conn = conn.clone();
        let task_model = model.clone();
        tokio::task::spawn_blocking(move || {
            task_conn.with_conn(|c| {
                let manager = SchemaManager::new(c, &task_model);
                debug!("Schema status before creation: {:?}", manager.check_status()?);
                manager.initialize()?;
                match manager.check_status()? {
                    SchemaStatus::Current => Ok(()),
                    status => Err(anyhow!("Schema incomplete after creation: {:?}", status)),
                }
            })
        })
        .await
        .map_err(|e| SeedError::Engine(anyhow!("Schema creation task failed: {}", e)))?
        .map_err(SeedError::schema_creation)?;

        debug!("Created {} tables", model.tables().len());
        Ok(model)
    }
}

fn log_stage(stage: BuildStage) {
    debug!("Build stage: {}", stage);
}

fn check_parent_dir(path: &Path) -> Result<(), SeedError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(SeedError::Configuration(format!(
                "Directory for database file '{}' does not exist",
                path.display()
            )))
        }
        _ => Ok(()),
    }
}
