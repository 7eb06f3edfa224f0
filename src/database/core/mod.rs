//! Core database infrastructure
//!
//! - `DatabaseConn`: shared SQLite connection with engine settings
//! - `SchemaManager`: schema creation from a translated schema model
//! - `SchemaStatus`: schema state enumeration

mod connection;
mod schema;

pub(crate) use connection::quote_ident;
pub use connection::{DatabaseConn, EngineOptions, StoreIdentity};
pub use schema::{SchemaDefinitions, SchemaManager, SchemaStatus};
