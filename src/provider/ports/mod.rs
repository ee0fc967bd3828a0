//! Port contracts for the provider context.

mod adapter;
mod factory;

#[cfg(test)]
pub use adapter::MockProviderAdapter;
pub use adapter::{
    PermanentKind, ProviderAdapter, ProviderError, ProviderResult, TransientKind,
};
pub use factory::AdapterFactory;
