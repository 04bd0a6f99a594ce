//! In-memory entity store.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::entity::Collection;
use crate::error::{ControlError, ControlResult};

use super::{check_filters, record_id, satisfies, Filter, PersistenceService, Record};

type Table = BTreeMap<String, Record>;

/// In-memory entity store.
///
/// Records are lost when the process exits. Listing order is by id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<&'static str, Table>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn select(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> ControlResult<Vec<Record>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(tables
            .get(collection.name)
            .map(|table| {
                table
                    .values()
                    .filter(|r| satisfies(r, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl PersistenceService for MemoryStore {
    async fn create(&self, collection: Collection, record: Record) -> ControlResult<()> {
        let key = record_id(&record)?.to_owned();
        let mut tables = self
            .tables
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let table = tables.entry(collection.name).or_default();
        if table.contains_key(&key) {
            return Err(ControlError::internal(format!(
                "{collection} {key} already exists"
            )));
        }

        table.insert(key, record);
        Ok(())
    }

    async fn read(&self, collection: Collection, id: &str) -> ControlResult<Option<Record>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(tables
            .get(collection.name)
            .and_then(|table| table.get(id))
            .cloned())
    }

    async fn read_all(&self, collection: Collection) -> ControlResult<Vec<Record>> {
        self.select(collection, &[])
    }

    async fn filter(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> ControlResult<Vec<Record>> {
        check_filters(collection, filters)?;
        self.select(collection, filters)
    }

    async fn bulk_update(&self, collection: Collection, records: Vec<Record>) -> ControlResult<()> {
        let mut keyed = Vec::with_capacity(records.len());
        for record in records {
            let id = record_id(&record)?.to_owned();
            keyed.push((id, record));
        }

        let mut tables = self
            .tables
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        let table = tables.entry(collection.name).or_default();

        if let Some((missing, _)) = keyed.iter().find(|(id, _)| !table.contains_key(id)) {
            return Err(ControlError::NotFound {
                collection: collection.name,
                id: missing.clone(),
            });
        }

        table.extend(keyed);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> ControlResult<bool> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(tables
            .get_mut(collection.name)
            .is_some_and(|table| table.remove(id).is_some()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::entity::{generate_id, Entity, Node, NodeApp};
    use crate::store::StoreExt;

    fn node(name: &str, location: &str) -> Node {
        Node {
            id: generate_id(),
            name: name.to_owned(),
            location: location.to_owned(),
            serial: format!("SN-{name}"),
            address: "10.0.0.1:42101".to_owned(),
        }
    }

    #[tokio::test]
    async fn create_and_read() {
        let store = MemoryStore::new();
        let n = node("edge-1", "rack 1");

        store.create_entity(&n).await.expect("create failed");

        let retrieved: Node = store
            .read_entity(&n.id)
            .await
            .expect("read failed")
            .expect("node not found");
        assert_eq!(retrieved, n);

        let other: Option<NodeApp> = store.read_entity(&n.id).await.expect("read failed");
        assert!(other.is_none(), "collections are separate");
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let store = MemoryStore::new();
        let n = node("edge-1", "rack 1");

        store.create_entity(&n).await.expect("first create failed");
        assert!(store.create_entity(&n).await.is_err());
    }

    #[tokio::test]
    async fn filter_and_read_all() {
        let store = MemoryStore::new();
        for (name, location) in [("edge-1", "rack 1"), ("edge-2", "rack 1"), ("edge-3", "rack 2")] {
            store
                .create_entity(&node(name, location))
                .await
                .expect("create failed");
        }

        let all: Vec<Node> = store.read_all_entities().await.expect("read_all failed");
        assert_eq!(all.len(), 3);

        let rack1: Vec<Node> = store
            .filter_entities(&[Filter::new("location", "rack 1")])
            .await
            .expect("filter failed");
        assert_eq!(rack1.len(), 2);

        let one: Vec<Node> = store
            .filter_entities(&[
                Filter::new("location", "rack 1"),
                Filter::new("name", "edge-2"),
            ])
            .await
            .expect("filter failed");
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].name, "edge-2");

        let err = store
            .filter(Node::collection(), &[Filter::new("address", "10.0.0.1:42101")])
            .await
            .expect_err("address is not filterable");
        assert!(matches!(err, ControlError::DisallowedFilter { .. }));
    }

    #[tokio::test]
    async fn empty_collection_lists_nothing() {
        let store = MemoryStore::new();
        let all: Vec<Node> = store.read_all_entities().await.expect("read_all failed");
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn bulk_update_is_all_or_nothing() {
        let store = MemoryStore::new();
        let mut a = node("edge-1", "rack 1");
        let mut b = node("edge-2", "rack 1");
        store.create_entity(&a).await.expect("create failed");
        store.create_entity(&b).await.expect("create failed");

        a.location = "rack 9".to_owned();
        b.location = "rack 9".to_owned();
        let ghost = node("ghost", "rack 9");

        let err = store
            .bulk_update_entities(vec![a.clone(), ghost.clone()])
            .await
            .expect_err("ghost does not exist");
        assert!(matches!(err, ControlError::NotFound { id, .. } if id == ghost.id));

        let unchanged: Node = store.read_entity(&a.id).await.unwrap().unwrap();
        assert_eq!(unchanged.location, "rack 1");

        store
            .bulk_update_entities(vec![a.clone(), b.clone()])
            .await
            .expect("update failed");
        let moved: Vec<Node> = store
            .filter_entities(&[Filter::new("location", "rack 9")])
            .await
            .unwrap();
        assert_eq!(moved.len(), 2);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryStore::new();
        let n = node("edge-1", "rack 1");
        store.create_entity(&n).await.expect("create failed");

        assert!(store.delete_entity::<Node>(&n.id).await.unwrap());
        assert!(!store.delete_entity::<Node>(&n.id).await.unwrap());
        assert!(store.read_entity::<Node>(&n.id).await.unwrap().is_none());
    }
}
