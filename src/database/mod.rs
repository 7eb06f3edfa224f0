//! Database module
//!
//! Physical SQLite stores built from a schema model.
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── connection  # shared DatabaseConn, EngineOptions, StoreIdentity
//! │   └── schema      # DDL generation and SchemaManager
//! │
//! └── store           # TestDatabase handle with change tracking
//! ```

pub mod core;
mod store;

pub use core::{DatabaseConn, EngineOptions, SchemaDefinitions, SchemaManager, SchemaStatus, StoreIdentity};
pub use store::TestDatabase;
