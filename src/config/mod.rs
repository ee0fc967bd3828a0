//! Backend configuration.
//!
//! A TOML file with optional `[health]`, `[migration]`, `[calls]` and
//! `[events]` sections plus one `[[providers]]` entry per provider:
//!
//! ```toml
//! [migration]
//! batch_size = 500
//! relaxed_threshold = "99.5%"
//!
//! [[providers]]
//! name = "primary_db"
//! type = "postgres"
//! capabilities = ["database", "storage"]
//! priority = 0
//! url = "postgres://app@db.internal/app"
//! pool_size = 16
//!
//! [[providers]]
//! name = "fallback"
//! type = "memory"
//! capabilities = ["database", "auth", "storage", "realtime", "functions"]
//! priority = 10
//! ```

mod error;
mod loader;
mod types;

pub use error::{ConfigurationError, ConfigurationResult};
pub use loader::{BackendConfig, load_from_dir, load_from_path, parse_config};
pub use types::{
    CallsSection, ConfigFile, EventsSection, HealthSection, MigrationSection, ProviderEntry,
};
