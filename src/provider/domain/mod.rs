//! Domain model for backend providers.
//!
//! Providers are described by validated descriptors and exchange the value
//! types defined here with the core. No type in this module performs I/O.

mod auth;
mod capability;
mod data;
mod descriptor;
mod error;
mod function;
mod name;
mod realtime;
mod signal;

pub use auth::{Credentials, Session};
pub use capability::{Capability, CapabilitySet};
pub use data::{CollectionName, Filter, ObjectPath, Record, RecordKey};
pub use descriptor::{ConnectionParams, PostgresConnection, ProviderDescriptor, ProviderKind};
pub use error::{ParseCapabilityError, ParseProviderKindError, ProviderDomainError};
pub use function::FunctionName;
pub use name::ProviderName;
pub use realtime::{
    RealtimeMessage, Subscription, SubscriptionHandler, SubscriptionId, Topic,
};
pub use signal::HealthSignal;
