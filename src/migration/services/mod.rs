//! Data passes run on behalf of migration plans.

mod dataset;
mod engine;

pub use dataset::{DataItem, DataSet, ItemRef, OBJECTS_PARTITION};
pub use engine::{
    MigrationControl, MigrationEndpoints, MigrationEngine, MigrationError, MigrationResult,
};
