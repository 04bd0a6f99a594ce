//! Entity storage backends.
//!
//! Backends store every entity variant as a JSON record keyed by its
//! [`Collection`] and `id`, which keeps [`PersistenceService`] object safe.
//! [`StoreExt`] layers typed access for any [`Entity`] on top. An in-memory
//! implementation is provided for tests and single-process deployments,
//! PostgreSQL for everything else.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::entity::{Collection, Entity};
use crate::error::{ControlError, ControlResult};

/// A stored entity in its JSON form. Always an object with a string `id`.
pub type Record = Value;

/// One `field = value` criterion of a filtered query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Field name, checked against the collection's allow-list.
    pub field: String,
    /// Value the field must equal.
    pub value: String,
}

impl Filter {
    /// Create a filter criterion.
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Backend for storing entity records.
#[async_trait]
pub trait PersistenceService: Send + Sync {
    /// Insert a new record.
    ///
    /// Returns an error if a record with the same id already exists.
    async fn create(&self, collection: Collection, record: Record) -> ControlResult<()>;

    /// Get a record by id.
    ///
    /// Returns `None` if the record does not exist.
    async fn read(&self, collection: Collection, id: &str) -> ControlResult<Option<Record>>;

    /// List every record in the collection.
    async fn read_all(&self, collection: Collection) -> ControlResult<Vec<Record>>;

    /// List records matching every filter.
    ///
    /// Fails with [`ControlError::DisallowedFilter`] when a field is not in
    /// the collection's allow-list.
    async fn filter(&self, collection: Collection, filters: &[Filter])
        -> ControlResult<Vec<Record>>;

    /// Replace existing records by id, all or nothing.
    ///
    /// Fails with [`ControlError::NotFound`] and changes nothing when any
    /// record does not exist.
    async fn bulk_update(&self, collection: Collection, records: Vec<Record>) -> ControlResult<()>;

    /// Delete a record by id. Returns whether a record was removed.
    async fn delete(&self, collection: Collection, id: &str) -> ControlResult<bool>;

    /// Check the backend can serve requests.
    async fn ping(&self) -> ControlResult<()> {
        Ok(())
    }
}

/// Typed access to a [`PersistenceService`].
#[async_trait]
pub trait StoreExt: PersistenceService {
    /// Insert a new entity.
    async fn create_entity<E: Entity>(&self, entity: &E) -> ControlResult<()> {
        self.create(E::collection(), to_record(entity)?).await
    }

    /// Get an entity by id.
    async fn read_entity<E: Entity>(&self, id: &str) -> ControlResult<Option<E>> {
        self.read(E::collection(), id)
            .await?
            .map(from_record)
            .transpose()
    }

    /// List every entity of the variant.
    async fn read_all_entities<E: Entity>(&self) -> ControlResult<Vec<E>> {
        self.read_all(E::collection())
            .await?
            .into_iter()
            .map(from_record)
            .collect()
    }

    /// List entities matching every filter.
    async fn filter_entities<E: Entity>(&self, filters: &[Filter]) -> ControlResult<Vec<E>> {
        self.filter(E::collection(), filters)
            .await?
            .into_iter()
            .map(from_record)
            .collect()
    }

    /// Replace existing entities, all or nothing.
    async fn bulk_update_entities<E: Entity>(&self, entities: Vec<E>) -> ControlResult<()> {
        let records = entities
            .iter()
            .map(to_record)
            .collect::<ControlResult<Vec<_>>>()?;
        self.bulk_update(E::collection(), records).await
    }

    /// Delete an entity by id. Returns whether it existed.
    async fn delete_entity<E: Entity>(&self, id: &str) -> ControlResult<bool> {
        self.delete(E::collection(), id).await
    }
}

impl<S: PersistenceService + ?Sized> StoreExt for S {}

/// Serialise an entity into its stored form.
pub fn to_record<E: Entity>(entity: &E) -> ControlResult<Record> {
    serde_json::to_value(entity).map_err(|e| {
        ControlError::serialisation(format!("failed to serialise {}: {e}", E::COLLECTION))
    })
}

/// Deserialise a stored record.
pub fn from_record<E: Entity>(record: Record) -> ControlResult<E> {
    serde_json::from_value(record).map_err(|e| {
        ControlError::serialisation(format!("failed to deserialise {}: {e}", E::COLLECTION))
    })
}

/// The `id` of a record.
pub(crate) fn record_id(record: &Record) -> ControlResult<&str> {
    record
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(ControlError::MissingId)
}

/// Reject any filter on a field outside the collection's allow-list.
pub(crate) fn check_filters(collection: Collection, filters: &[Filter]) -> ControlResult<()> {
    match filters.iter().find(|f| !collection.allows_filter(&f.field)) {
        Some(f) => Err(ControlError::DisallowedFilter {
            field: f.field.clone(),
        }),
        None => Ok(()),
    }
}

/// Whether `record` satisfies every filter. Non-string fields compare by
/// their JSON text.
pub(crate) fn satisfies(record: &Record, filters: &[Filter]) -> bool {
    filters.iter().all(|f| match record.get(&f.field) {
        Some(Value::String(s)) => *s == f.value,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == f.value,
    })
}
