//! Diesel schema for the provider catalog.

diesel::table! {
    /// Configured providers, replaced as a whole on every configuration.
    provider_descriptors (name) {
        /// Provider name.
        #[max_length = 100]
        name -> Varchar,
        /// Position in the configuration.
        position -> Int4,
        /// Serialized descriptor.
        descriptor -> Jsonb,
        /// When the row was written.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Last known state of each capability.
    capability_bindings (capability) {
        /// Capability name.
        #[max_length = 32]
        capability -> Varchar,
        /// Serialized binding state.
        state -> Jsonb,
        /// When the row was written.
        updated_at -> Timestamptz,
    }
}
