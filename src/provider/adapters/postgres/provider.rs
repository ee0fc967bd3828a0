//! `PostgreSQL` provider serving the database, storage and functions
//! capabilities.
//!
//! Records live in `provider_records` with a JSONB payload; filters compile
//! to a single `payload @> $1` containment test, which is exactly a
//! conjunction of top-level equalities. Objects live in `provider_objects`.
//! Functions are invoked as `SELECT <name>($1::jsonb)`; the name is a
//! validated identifier. Authentication and realtime are not offered.

use super::{
    models::{InvocationRow, NewObjectRow, NewRecordRow, RecordRow},
    schema::{provider_objects, provider_records},
};
use crate::provider::{
    domain::{
        CollectionName, Credentials, Filter, FunctionName, HealthSignal, ObjectPath,
        PostgresConnection, ProviderName, Record, RecordKey, Session, Subscription,
        SubscriptionHandler, Topic,
    },
    ports::{ProviderAdapter, ProviderError, ProviderResult},
};
use async_trait::async_trait;
use diesel::dsl::now;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::upsert::excluded;
use serde_json::Value;
use std::time::{Duration, Instant};

/// `PostgreSQL` connection pool type used by the provider adapter.
pub type ProviderPgPool = Pool<ConnectionManager<PgConnection>>;

const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// `PostgreSQL`-backed provider adapter.
#[derive(Debug, Clone)]
pub struct PostgresProvider {
    name: ProviderName,
    pool: ProviderPgPool,
}

impl PostgresProvider {
    /// Creates a provider over an existing pool.
    #[must_use]
    pub const fn new(name: ProviderName, pool: ProviderPgPool) -> Self {
        Self { name, pool }
    }

    /// Creates a provider with a lazily connecting pool.
    ///
    /// No connection is opened here; failures surface on first use and in
    /// probes.
    #[must_use]
    pub fn connect_lazy(name: ProviderName, connection: &PostgresConnection) -> Self {
        let manager = ConnectionManager::<PgConnection>::new(connection.url());
        let pool = Pool::builder()
            .max_size(connection.pool_size())
            .min_idle(Some(0))
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build_unchecked(manager);
        Self::new(name, pool)
    }

    async fn run_blocking<F, T>(&self, f: F) -> ProviderResult<T>
    where
        F: FnOnce(&mut PgConnection) -> ProviderResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool
                .get()
                .map_err(|err| ProviderError::connection(err.to_string()))?;
            f(&mut connection)
        })
        .await
        .map_err(|err| ProviderError::connection(err.to_string()))?
    }
}

#[async_trait]
impl ProviderAdapter for PostgresProvider {
    fn name(&self) -> &ProviderName {
        &self.name
    }

    async fn create(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        let row = new_record_row(collection, &record);
        self.run_blocking(move |connection| {
            diesel::insert_into(provider_records::table)
                .values(&row)
                .execute(connection)
                .map_err(classify)?;
            Ok(record)
        })
        .await
    }

    async fn read(
        &self,
        collection: &CollectionName,
        key: &RecordKey,
    ) -> ProviderResult<Option<Record>> {
        let collection_val = collection.as_str().to_owned();
        let key_val = key.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = provider_records::table
                .filter(provider_records::collection.eq(&collection_val))
                .filter(provider_records::record_key.eq(&key_val))
                .select(RecordRow::as_select())
                .first::<RecordRow>(connection)
                .optional()
                .map_err(classify)?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn query(
        &self,
        collection: &CollectionName,
        filter: &Filter,
    ) -> ProviderResult<Vec<Record>> {
        let collection_val = collection.as_str().to_owned();
        let containment = filter.as_object();
        let limit = filter.limit().map(to_sql_limit);
        self.run_blocking(move |connection| {
            let mut statement = provider_records::table
                .filter(provider_records::collection.eq(&collection_val))
                .filter(provider_records::payload.contains(&containment))
                .order(provider_records::record_key.asc())
                .select(RecordRow::as_select())
                .into_boxed();
            if let Some(max_rows) = limit {
                statement = statement.limit(max_rows);
            }
            let rows = statement.load::<RecordRow>(connection).map_err(classify)?;
            rows.into_iter().map(row_to_record).collect()
        })
        .await
    }

    async fn update(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        let collection_val = collection.as_str().to_owned();
        let key_val = record.key().as_str().to_owned();
        let payload_val = record.payload().clone();
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                provider_records::table
                    .filter(provider_records::collection.eq(&collection_val))
                    .filter(provider_records::record_key.eq(&key_val)),
            )
            .set((
                provider_records::payload.eq(&payload_val),
                provider_records::updated_at.eq(now),
            ))
            .execute(connection)
            .map_err(classify)?;
            if updated == 0 {
                return Err(ProviderError::not_found(format!(
                    "record '{key_val}' not found in '{collection_val}'"
                )));
            }
            Ok(record)
        })
        .await
    }

    async fn upsert(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        let row = new_record_row(collection, &record);
        self.run_blocking(move |connection| {
            diesel::insert_into(provider_records::table)
                .values(&row)
                .on_conflict((provider_records::collection, provider_records::record_key))
                .do_update()
                .set((
                    provider_records::payload.eq(excluded(provider_records::payload)),
                    provider_records::updated_at.eq(now),
                ))
                .execute(connection)
                .map_err(classify)?;
            Ok(record)
        })
        .await
    }

    async fn delete(&self, collection: &CollectionName, key: &RecordKey) -> ProviderResult<()> {
        let collection_val = collection.as_str().to_owned();
        let key_val = key.as_str().to_owned();
        self.run_blocking(move |connection| {
            let deleted = diesel::delete(
                provider_records::table
                    .filter(provider_records::collection.eq(&collection_val))
                    .filter(provider_records::record_key.eq(&key_val)),
            )
            .execute(connection)
            .map_err(classify)?;
            if deleted == 0 {
                return Err(ProviderError::not_found(format!(
                    "record '{key_val}' not found in '{collection_val}'"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn list_collections(&self) -> ProviderResult<Vec<CollectionName>> {
        self.run_blocking(move |connection| {
            let names = provider_records::table
                .select(provider_records::collection)
                .distinct()
                .order(provider_records::collection.asc())
                .load::<String>(connection)
                .map_err(classify)?;
            names
                .into_iter()
                .map(|name| {
                    CollectionName::new(name)
                        .map_err(|err| ProviderError::schema_mismatch(err.to_string()))
                })
                .collect()
        })
        .await
    }

    async fn scan(
        &self,
        collection: &CollectionName,
        after: Option<RecordKey>,
        limit: usize,
    ) -> ProviderResult<Vec<Record>> {
        let collection_val = collection.as_str().to_owned();
        let cursor = after.map(String::from);
        let page_size = to_sql_limit(limit);
        self.run_blocking(move |connection| {
            let mut statement = provider_records::table
                .filter(provider_records::collection.eq(collection_val))
                .order(provider_records::record_key.asc())
                .limit(page_size)
                .select(RecordRow::as_select())
                .into_boxed();
            if let Some(last_key) = cursor {
                statement = statement.filter(provider_records::record_key.gt(last_key));
            }
            let rows = statement.load::<RecordRow>(connection).map_err(classify)?;
            rows.into_iter().map(row_to_record).collect()
        })
        .await
    }

    async fn count(&self, collection: &CollectionName) -> ProviderResult<u64> {
        let collection_val = collection.as_str().to_owned();
        self.run_blocking(move |connection| {
            let total = provider_records::table
                .filter(provider_records::collection.eq(&collection_val))
                .count()
                .get_result::<i64>(connection)
                .map_err(classify)?;
            u64::try_from(total).map_err(|err| ProviderError::schema_mismatch(err.to_string()))
        })
        .await
    }

    async fn authenticate(&self, _credentials: &Credentials) -> ProviderResult<Session> {
        Err(ProviderError::unsupported("authentication", &self.name))
    }

    async fn put_object(&self, path: &ObjectPath, content: Vec<u8>) -> ProviderResult<()> {
        let row = NewObjectRow {
            path: path.as_str().to_owned(),
            content,
        };
        self.run_blocking(move |connection| {
            diesel::insert_into(provider_objects::table)
                .values(&row)
                .on_conflict(provider_objects::path)
                .do_update()
                .set((
                    provider_objects::content.eq(excluded(provider_objects::content)),
                    provider_objects::updated_at.eq(now),
                ))
                .execute(connection)
                .map_err(classify)?;
            Ok(())
        })
        .await
    }

    async fn get_object(&self, path: &ObjectPath) -> ProviderResult<Option<Vec<u8>>> {
        let path_val = path.as_str().to_owned();
        self.run_blocking(move |connection| {
            provider_objects::table
                .filter(provider_objects::path.eq(&path_val))
                .select(provider_objects::content)
                .first::<Vec<u8>>(connection)
                .optional()
                .map_err(classify)
        })
        .await
    }

    async fn delete_object(&self, path: &ObjectPath) -> ProviderResult<()> {
        let path_val = path.as_str().to_owned();
        self.run_blocking(move |connection| {
            let deleted = diesel::delete(
                provider_objects::table.filter(provider_objects::path.eq(&path_val)),
            )
            .execute(connection)
            .map_err(classify)?;
            if deleted == 0 {
                return Err(ProviderError::not_found(format!(
                    "object '{path_val}' not found"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn list_objects(
        &self,
        after: Option<ObjectPath>,
        limit: usize,
    ) -> ProviderResult<Vec<ObjectPath>> {
        let cursor = after.map(String::from);
        let page_size = to_sql_limit(limit);
        self.run_blocking(move |connection| {
            let mut statement = provider_objects::table
                .select(provider_objects::path)
                .order(provider_objects::path.asc())
                .limit(page_size)
                .into_boxed();
            if let Some(last_path) = cursor {
                statement = statement.filter(provider_objects::path.gt(last_path));
            }
            let paths = statement.load::<String>(connection).map_err(classify)?;
            paths
                .into_iter()
                .map(|path| {
                    ObjectPath::new(path)
                        .map_err(|err| ProviderError::schema_mismatch(err.to_string()))
                })
                .collect()
        })
        .await
    }

    async fn subscribe(
        &self,
        _topic: &Topic,
        _handler: SubscriptionHandler,
    ) -> ProviderResult<Subscription> {
        Err(ProviderError::unsupported("realtime subscriptions", &self.name))
    }

    async fn unsubscribe(&self, _subscription: &Subscription) -> ProviderResult<()> {
        Err(ProviderError::unsupported("realtime subscriptions", &self.name))
    }

    async fn publish(&self, _topic: &Topic, _payload: Value) -> ProviderResult<()> {
        Err(ProviderError::unsupported("realtime publishing", &self.name))
    }

    async fn invoke(&self, function: &FunctionName, payload: Value) -> ProviderResult<Value> {
        let statement = format!("SELECT {}($1::jsonb) AS result", function.as_str());
        self.run_blocking(move |connection| {
            let row = diesel::sql_query(statement)
                .bind::<diesel::sql_types::Jsonb, _>(payload)
                .get_result::<InvocationRow>(connection)
                .map_err(classify)?;
            Ok(row.result)
        })
        .await
    }

    async fn probe(&self) -> ProviderResult<HealthSignal> {
        let started = Instant::now();
        self.run_blocking(move |connection| {
            diesel::sql_query("SELECT 1")
                .execute(connection)
                .map_err(classify)?;
            Ok(())
        })
        .await?;
        Ok(HealthSignal::new(started.elapsed()))
    }
}

fn new_record_row(collection: &CollectionName, record: &Record) -> NewRecordRow {
    NewRecordRow {
        collection: collection.as_str().to_owned(),
        record_key: record.key().as_str().to_owned(),
        payload: record.payload().clone(),
    }
}

fn row_to_record(row: RecordRow) -> ProviderResult<Record> {
    let RecordRow {
        record_key,
        payload,
    } = row;
    let key =
        RecordKey::new(record_key).map_err(|err| ProviderError::schema_mismatch(err.to_string()))?;
    Record::new(key, payload).map_err(|err| ProviderError::schema_mismatch(err.to_string()))
}

fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Maps a Diesel error onto the provider error taxonomy.
fn classify(err: DieselError) -> ProviderError {
    match err {
        DieselError::NotFound => ProviderError::not_found(err.to_string()),
        DieselError::DatabaseError(kind, ref info) => {
            let message = info.message().to_owned();
            match kind {
                DatabaseErrorKind::UniqueViolation => ProviderError::conflict(message),
                DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::NotNullViolation
                | DatabaseErrorKind::CheckViolation => ProviderError::validation(message),
                DatabaseErrorKind::SerializationFailure
                | DatabaseErrorKind::ClosedConnection
                | DatabaseErrorKind::UnableToSendCommand => ProviderError::connection(message),
                _ if message.contains("does not exist") => ProviderError::not_found(message),
                _ => ProviderError::validation(message),
            }
        }
        DieselError::DeserializationError(_) | DieselError::SerializationError(_) => {
            ProviderError::schema_mismatch(err.to_string())
        }
        _ => ProviderError::connection(err.to_string()),
    }
}
