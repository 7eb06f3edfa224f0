#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Seedbed - seeded SQLite test databases
//!
//! Seedbed builds throw-away SQLite databases from a schema model written for
//! a production SQL dialect, fills them with fixed or randomly generated
//! records, and hands back a clean handle for the test to use.
//!
//! # Architecture
//!
//! - **[`model`]**: Schema model (tables, columns, foreign keys) and the
//!   `Entity` trait that record types implement
//! - **[`dialect`]**: `DialectAdapter`, which rewrites the model for SQLite
//!   (table renaming, default values, computed columns, join tables)
//! - **[`generator`]**: Random record synthesis with a recursion guard
//! - **[`database`]**: SQLite connections, DDL generation and the
//!   `TestDatabase` handle
//! - **[`builder`]**: `SeedBuilder`, the build orchestration
//! - **[`config`]**: File and environment based defaults
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use seedbed::{DialectAdapter, ModelBuilder, SeedBuilder};
//!
//! let db = SeedBuilder::new(ModelBuilder::new().entity::<Person>().entity::<Order>())
//!     .with_dialect(DialectAdapter::for_sql_server())
//!     .seed_with(vec![Person::new(1, "Ada", "Lovelace")])?
//!     .seed_with_random::<Person>(10)?
//!     .build()
//!     .await?;
//!
//! assert_eq!(db.count::<Person>()?, 11);
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! use seedbed::{SeedBuilder, SeedConfig};
//!
//! // ~/.seedbed/seedbed.toml, overridden by SEEDBED_* environment variables
//! let config = SeedConfig::new(None)?;
//! let builder = SeedBuilder::from_config(ModelBuilder::new().entity::<Person>(), &config)?;
//! ```

pub mod builder;
pub mod config;
pub mod database;
pub mod dialect;
pub mod error;
pub mod generator;
pub mod model;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Build orchestration
// =============================================================================

pub use builder::{BuildStage, Engine, SeedBuilder, SeedItem};
pub use config::{EngineKind, SeedConfig};
pub use error::{SeedError, SCHEMA_CREATION_HINT};

// =============================================================================
// Schema model and dialect translation
// =============================================================================

pub use dialect::{
    ComputedColumnPolicy, DefaultValueMap, DefaultValuePolicy, DialectAdapter, JoinTablePolicy,
    RenamePolicy,
};
pub use model::{
    ColumnDescriptor, Entity, EntityDescriptor, FieldDescriptor, ForeignKeyDescriptor, ModelBuilder,
    Row, SchemaModel, SchemaProvider, SeedRecord, TableDescriptor, Value, ValueType,
};

// =============================================================================
// Databases and generators
// =============================================================================

pub use database::{DatabaseConn, EngineOptions, SchemaManager, StoreIdentity, TestDatabase};
pub use generator::{generate, FixtureGenerator, RandomRecordGenerator};
