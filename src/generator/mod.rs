//! Random record synthesis
//!
//! A [`RandomRecordGenerator`] produces populated rows for any record type
//! from its [`EntityDescriptor`]. The default [`FixtureGenerator`] fills every
//! scalar with a random value and applies two rules:
//!
//! - navigation fields (references to, or collections of, other records) are
//!   left `Null`, so seeded graphs stay one level deep
//! - an owned type that is already under construction is not entered again;
//!   the field is left `Null` instead of recursing

pub mod values;

use crate::error::SeedError;
use crate::model::{Entity, EntityDescriptor, FieldKind, Row, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Mutex;

/// Produces `count` rows for a record type
pub trait RandomRecordGenerator: Send + Sync {
    /// Fails with [`SeedError::OutOfRange`] when `count` is 0
    fn generate_rows(&self, entity: &EntityDescriptor, count: usize) -> Result<Vec<Row>, SeedError>;
}

/// Generate `count` typed records
pub fn generate<T: Entity>(
    generator: &(impl RandomRecordGenerator + ?Sized),
    count: usize,
) -> Result<Vec<T>, SeedError> {
    generator
        .generate_rows(&T::descriptor(), count)?
        .iter()
        .map(T::from_row)
        .collect()
}

/// Record types currently under construction
#[derive(Debug, Default)]
pub struct RecursionGuard {
    in_progress: HashSet<&'static str>,
}

impl RecursionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a type as under construction, `false` when it already is
    pub fn enter(&mut self, entity: &'static str) -> bool {
        self.in_progress.insert(entity)
    }

    pub fn leave(&mut self, entity: &'static str) {
        self.in_progress.remove(entity);
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.in_progress.contains(entity)
    }
}

struct FixtureState {
    rng: StdRng,
    next_integer: i64,
}

/// Default generator backed by a [`StdRng`]
pub struct FixtureGenerator {
    state: Mutex<FixtureState>,
}

impl std::fmt::Debug for FixtureGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureGenerator").finish_non_exhaustive()
    }
}

impl Default for FixtureGenerator {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl FixtureGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator that produces the same records for the same seed
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(FixtureState {
                rng,
                next_integer: 0,
            }),
        }
    }

    fn generate_row(
        state: &mut FixtureState,
        entity: &EntityDescriptor,
        guard: &mut RecursionGuard,
    ) -> Row {
        let mut row = Row::new();
        guard.enter(entity.name);

        for field in &entity.fields {
            let value = match field.kind {
                FieldKind::Reference(_) | FieldKind::Collection(_) => Value::Null,
                _ if field.computed_sql.is_some() => Value::Null,
                FieldKind::Scalar(value_type) => values::generate_scalar(
                    &mut state.rng,
                    field.name,
                    value_type,
                    &mut state.next_integer,
                ),
                FieldKind::Owned(target) => {
                    let target = target();
                    if guard.contains(target.name) {
                        Value::Null
                    } else {
                        Value::Owned(Self::generate_row(state, &target, guard))
                    }
                }
            };
            row.set(field.name, value);
        }

        guard.leave(entity.name);
        row
    }
}

impl RandomRecordGenerator for FixtureGenerator {
    fn generate_rows(&self, entity: &EntityDescriptor, count: usize) -> Result<Vec<Row>, SeedError> {
        if count < 1 {
            return Err(SeedError::OutOfRange {
                parameter: "count",
                value: count,
            });
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let rows = (0..count)
            .map(|_| Self::generate_row(&mut state, entity, &mut RecursionGuard::new()))
            .collect();
        Ok(rows)
    }
}
