//! Error types for seedbed
//!
//! Configuration mistakes are reported synchronously from the builder call that
//! made them. Engine failures are passed through without retries.

/// Remedy attached to every schema creation failure
pub const SCHEMA_CREATION_HINT: &str = "SQLite rejected the translated schema. \
Install a custom DialectAdapter with SeedBuilder::with_dialect and override the \
rename rule, default value policy, computed column policy or join table detector \
that produced the offending definition.";

/// Errors produced while configuring or building a seeded database
#[derive(Debug)]
pub enum SeedError {
    /// An argument passed to a configuration call is not acceptable
    Validation {
        parameter: &'static str,
        message: String,
    },

    /// A count passed to a generator is below 1
    OutOfRange { parameter: &'static str, value: usize },

    /// The builder or the adapter is configured in a way that cannot be built
    Configuration(String),

    /// SQLite rejected the translated schema
    SchemaCreation {
        source: anyhow::Error,
        hint: &'static str,
    },

    /// Connection or statement failure from SQLite
    Engine(anyhow::Error),

    /// A stored or generated value does not fit the field it is read into
    Record { field: String, message: String },
}

impl SeedError {
    pub(crate) fn validation(parameter: &'static str, message: impl Into<String>) -> Self {
        SeedError::Validation {
            parameter,
            message: message.into(),
        }
    }

    pub(crate) fn schema_creation(source: anyhow::Error) -> Self {
        SeedError::SchemaCreation {
            source,
            hint: SCHEMA_CREATION_HINT,
        }
    }

    pub(crate) fn record(field: impl Into<String>, message: impl Into<String>) -> Self {
        SeedError::Record {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Name of the offending parameter for validation and range errors
    pub fn parameter(&self) -> Option<&'static str> {
        match self {
            SeedError::Validation { parameter, .. } | SeedError::OutOfRange { parameter, .. } => {
                Some(*parameter)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for SeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedError::Validation { parameter, message } => {
                write!(f, "Invalid argument '{}': {}", parameter, message)
            }
            SeedError::OutOfRange { parameter, value } => write!(
                f,
                "Argument '{}' is out of range ({}): value cannot be less than 1",
                parameter, value
            ),
            SeedError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            SeedError::SchemaCreation { source, hint } => {
                write!(f, "Failed to create database schema: {:#}. {}", source, hint)
            }
            SeedError::Engine(e) => write!(f, "Database engine error: {:#}", e),
            SeedError::Record { field, message } => {
                write!(f, "Invalid value for field '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for SeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SeedError::SchemaCreation { source: e, .. } | SeedError::Engine(e) => {
                let cause: &(dyn std::error::Error + 'static) = e.as_ref();
                Some(cause)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_validation_display_names_parameter() {
        let err = SeedError::validation("records", "One of the records is null");
        assert!(err.to_string().contains("'records'"));
        assert_eq!(err.parameter(), Some("records"));
    }

    #[test]
    fn test_schema_creation_carries_hint_and_source() {
        let err = SeedError::schema_creation(anyhow::anyhow!("near \"(\": syntax error"));
        let text = err.to_string();
        assert!(text.contains("syntax error"));
        assert!(text.contains("DialectAdapter"));
        assert!(err.source().is_some());
        assert_eq!(err.parameter(), None);
    }
}
