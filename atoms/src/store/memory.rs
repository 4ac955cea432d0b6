use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{Collection, CollectionPath, Condition, DocKey, Document, DocumentStore, FieldUpdate, WriteOp};
use crate::error::StoreError;

/// In-process store used by tests and local runs.
///
/// Writes can be made to fail transiently per collection with
/// `fail_writes_to`, which is how the retry and queueing paths are tested.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<DocKey, Document>>,
    faults: Mutex<HashMap<Collection, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` writes touching `collection` fail with `Unavailable`.
    pub fn fail_writes_to(&self, collection: Collection, times: usize) {
        lock(&self.faults).insert(collection, times);
    }

    pub fn len(&self) -> usize {
        lock(&self.docs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every key currently stored, in key order.
    pub fn keys(&self) -> Vec<DocKey> {
        lock(&self.docs).keys().cloned().collect()
    }

    fn check_fault(&self, key: &DocKey) -> Result<(), StoreError> {
        let mut faults = lock(&self.faults);
        if let Some(remaining) = faults.get_mut(&key.collection()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Unavailable(format!("injected fault writing {}", key)));
            }
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn check_all(conditions: &[Condition], current: Option<&Document>) -> Result<(), StoreError> {
    if conditions.iter().all(|c| c.holds(current)) {
        Ok(())
    } else {
        Err(StoreError::ConditionFailed)
    }
}

fn apply_updates(doc: &mut Document, updates: &[FieldUpdate]) {
    for update in updates {
        match update {
            FieldUpdate::Set(field, value) => {
                doc.insert(field.clone(), value.clone());
            }
            FieldUpdate::Increment(field, by) => {
                let current = doc.get(field).and_then(Value::as_i64).unwrap_or(0);
                doc.insert(field.clone(), Value::from(current + by));
            }
            FieldUpdate::Remove(field) => {
                doc.remove(field);
            }
        }
    }
}

fn apply(docs: &mut BTreeMap<DocKey, Document>, op: WriteOp) {
    match op {
        WriteOp::Put { key, doc, .. } => {
            docs.insert(key, doc);
        }
        WriteOp::Update { key, updates, .. } => {
            let doc = docs.entry(key).or_default();
            apply_updates(doc, &updates);
        }
        WriteOp::Delete { key, .. } => {
            docs.remove(&key);
        }
        WriteOp::Check { .. } => {}
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Document>, StoreError> {
        Ok(lock(&self.docs).get(key).cloned())
    }

    async fn put(&self, key: &DocKey, doc: Document, conditions: &[Condition]) -> Result<(), StoreError> {
        self.check_fault(key)?;
        let mut docs = lock(&self.docs);
        check_all(conditions, docs.get(key))?;
        docs.insert(key.clone(), doc);
        Ok(())
    }

    async fn update(
        &self,
        key: &DocKey,
        updates: &[FieldUpdate],
        conditions: &[Condition],
    ) -> Result<(), StoreError> {
        self.check_fault(key)?;
        let mut docs = lock(&self.docs);
        check_all(conditions, docs.get(key))?;
        let doc = docs.entry(key.clone()).or_default();
        apply_updates(doc, updates);
        Ok(())
    }

    async fn delete(&self, key: &DocKey) -> Result<(), StoreError> {
        self.check_fault(key)?;
        lock(&self.docs).remove(key);
        Ok(())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(lock(&self.docs)
            .iter()
            .filter(|(k, _)| &k.path == collection)
            .map(|(k, d)| (k.id.clone(), d.clone()))
            .collect())
    }

    async fn transact(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        for op in &ops {
            if !matches!(op, WriteOp::Check { .. }) {
                self.check_fault(op.key())?;
            }
        }
        let mut docs = lock(&self.docs);
        for op in &ops {
            check_all(op.conditions(), docs.get(op.key()))?;
        }
        for op in ops {
            apply(&mut docs, op);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn transact_is_all_or_nothing() {
        let store = MemoryStore::new();
        store
            .put(&keys::username("amy"), doc(json!({"user_id": "u1"})), &[])
            .await
            .unwrap();

        let result = store
            .transact(vec![
                WriteOp::Put {
                    key: keys::user("u2"),
                    doc: doc(json!({"user_id": "u2"})),
                    conditions: vec![Condition::NotExists],
                },
                WriteOp::Put {
                    key: keys::username("amy"),
                    doc: doc(json!({"user_id": "u2"})),
                    conditions: vec![Condition::NotExists],
                },
            ])
            .await;

        assert_eq!(result, Err(StoreError::ConditionFailed));
        assert!(store.get(&keys::user("u2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn increment_treats_missing_field_as_zero() {
        let store = MemoryStore::new();
        let key = keys::user("u1");
        store.update(&key, &[FieldUpdate::increment("total_xp", 7)], &[]).await.unwrap();
        store.update(&key, &[FieldUpdate::increment("total_xp", 5)], &[]).await.unwrap();
        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.get("total_xp"), Some(&json!(12)));
    }

    #[tokio::test]
    async fn list_only_returns_direct_children() {
        let store = MemoryStore::new();
        store.put(&keys::task("u1", "t1"), doc(json!({})), &[]).await.unwrap();
        store.put(&keys::task("u2", "t2"), doc(json!({})), &[]).await.unwrap();
        store.put(&keys::task_group("u1", "g1"), doc(json!({})), &[]).await.unwrap();

        let listed = store.list(&keys::tasks("u1")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "t1");
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let store = MemoryStore::new();
        store.fail_writes_to(Collection::Members, 1);
        let key = keys::member("g1", "u1");
        assert!(matches!(
            store.put(&key, doc(json!({})), &[]).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.put(&key, doc(json!({})), &[]).await.is_ok());
        assert!(store.delete(&keys::user("nobody")).await.is_ok());
    }
}
