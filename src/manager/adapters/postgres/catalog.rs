//! `PostgreSQL` provider catalog.

use super::{
    models::{BindingRow, DescriptorRow},
    schema::{capability_bindings, provider_descriptors},
};
use crate::manager::ports::{CatalogError, CatalogResult, ProviderCatalogRepository};
use crate::provider::domain::{Capability, ProviderDescriptor};
use crate::routing::domain::BindingState;
use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::Error as DieselError;

/// `PostgreSQL` connection pool type used by the catalog.
pub type CatalogPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed provider catalog.
#[derive(Debug, Clone)]
pub struct PostgresProviderCatalog {
    pool: CatalogPgPool,
}

impl PostgresProviderCatalog {
    /// Creates a catalog from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: CatalogPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> CatalogResult<T>
    where
        F: FnOnce(&mut PgConnection) -> CatalogResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(CatalogError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(CatalogError::persistence)?
    }
}

#[async_trait]
impl ProviderCatalogRepository for PostgresProviderCatalog {
    async fn save_descriptors(&self, descriptors: &[ProviderDescriptor]) -> CatalogResult<()> {
        let now = Utc::now();
        let rows = descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| {
                Ok(DescriptorRow {
                    name: descriptor.name().as_str().to_owned(),
                    position: i32::try_from(index).map_err(CatalogError::persistence)?,
                    descriptor: serde_json::to_value(descriptor)
                        .map_err(CatalogError::persistence)?,
                    updated_at: now,
                })
            })
            .collect::<CatalogResult<Vec<_>>>()?;
        self.run_blocking(move |connection| {
            connection
                .transaction::<_, DieselError, _>(|tx| {
                    diesel::delete(provider_descriptors::table).execute(tx)?;
                    diesel::insert_into(provider_descriptors::table)
                        .values(&rows)
                        .execute(tx)?;
                    Ok(())
                })
                .map_err(CatalogError::persistence)
        })
        .await
    }

    async fn load_descriptors(&self) -> CatalogResult<Vec<ProviderDescriptor>> {
        self.run_blocking(|connection| {
            provider_descriptors::table
                .order(provider_descriptors::position.asc())
                .select(DescriptorRow::as_select())
                .load::<DescriptorRow>(connection)
                .map_err(CatalogError::persistence)?
                .into_iter()
                .map(|row| serde_json::from_value(row.descriptor).map_err(CatalogError::persistence))
                .collect()
        })
        .await
    }

    async fn save_binding(
        &self,
        capability: Capability,
        state: &BindingState,
    ) -> CatalogResult<()> {
        let row = BindingRow {
            capability: capability.as_str().to_owned(),
            state: serde_json::to_value(state).map_err(CatalogError::persistence)?,
            updated_at: Utc::now(),
        };
        self.run_blocking(move |connection| {
            diesel::insert_into(capability_bindings::table)
                .values(&row)
                .on_conflict(capability_bindings::capability)
                .do_update()
                .set(&row)
                .execute(connection)
                .map_err(CatalogError::persistence)?;
            Ok(())
        })
        .await
    }

    async fn load_bindings(&self) -> CatalogResult<Vec<(Capability, BindingState)>> {
        self.run_blocking(|connection| {
            capability_bindings::table
                .order(capability_bindings::capability.asc())
                .select(BindingRow::as_select())
                .load::<BindingRow>(connection)
                .map_err(CatalogError::persistence)?
                .into_iter()
                .map(row_to_binding)
                .collect()
        })
        .await
    }
}

fn row_to_binding(row: BindingRow) -> CatalogResult<(Capability, BindingState)> {
    let BindingRow {
        capability: persisted_capability,
        state: persisted_state,
        ..
    } = row;
    let capability =
        Capability::try_from(persisted_capability.as_str()).map_err(CatalogError::persistence)?;
    let state = serde_json::from_value(persisted_state).map_err(CatalogError::persistence)?;
    Ok((capability, state))
}
