//! Domain model for capability routing.

mod binding;

pub use binding::{BindingReason, BindingState, CapabilityBinding, ParseBindingReasonError};
