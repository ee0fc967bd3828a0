//! Domain model for provider migrations.
//!
//! A migration plan moves one capability's data from a source to a target
//! provider through `pending → running → verifying → completed | failed`.

mod checkpoint;
mod error;
mod ids;
mod plan;
mod progress;
mod settings;
mod status;

pub use checkpoint::{ConsistencyCheckpoint, ContentHash};
pub use error::{MigrationDomainError, ParseMigrationStatusError, ParseMigrationStrategyError};
pub use ids::MigrationId;
pub use plan::{MigrationPlan, PersistedMigrationData};
pub use progress::{BackfillCursor, MatchRate, ProgressCounters};
pub use settings::MigrationSettings;
pub use status::{MigrationStatus, MigrationStrategy};
