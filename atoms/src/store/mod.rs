//! Document store boundary.
//!
//! Services never talk to DynamoDB directly: they take a `&dyn DocumentStore`
//! so the same logic runs against `DynamoStore` in the lambdas and
//! `MemoryStore` in tests.

pub mod dynamo;
pub mod keys;
pub mod memory;
pub mod retry;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

pub use dynamo::DynamoStore;
pub use keys::{Collection, CollectionPath, DocKey};
pub use memory::MemoryStore;
pub use retry::{with_retry, Transient, MAX_ATTEMPTS};

/// A stored document: a flat JSON object.
pub type Document = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(String, Value),
    /// Atomic numeric add; a missing field counts as zero.
    Increment(String, i64),
    Remove(String),
}

impl FieldUpdate {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        FieldUpdate::Set(field.to_string(), value.into())
    }

    pub fn increment(field: &str, by: i64) -> Self {
        FieldUpdate::Increment(field.to_string(), by)
    }

    pub fn remove(field: &str) -> Self {
        FieldUpdate::Remove(field.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists,
    NotExists,
    FieldEquals(String, Value),
    FieldAbsent(String),
    /// Numeric field is below the value; a missing field passes.
    FieldLessThan(String, Value),
}

impl Condition {
    pub fn field_equals(field: &str, value: impl Into<Value>) -> Self {
        Condition::FieldEquals(field.to_string(), value.into())
    }

    pub fn field_absent(field: &str) -> Self {
        Condition::FieldAbsent(field.to_string())
    }

    pub fn field_less_than(field: &str, value: impl Into<Value>) -> Self {
        Condition::FieldLessThan(field.to_string(), value.into())
    }

    /// Evaluates the condition against the current state of a document.
    pub fn holds(&self, current: Option<&Document>) -> bool {
        match self {
            Condition::Exists => current.is_some(),
            Condition::NotExists => current.is_none(),
            Condition::FieldEquals(field, value) => {
                current.and_then(|d| d.get(field)) == Some(value)
            }
            Condition::FieldAbsent(field) => current
                .and_then(|d| d.get(field))
                .map_or(true, |v| v.is_null()),
            Condition::FieldLessThan(field, value) => {
                let Some(doc) = current else {
                    return false;
                };
                match (doc.get(field).and_then(Value::as_f64), value.as_f64()) {
                    (Some(stored), Some(bound)) => stored < bound,
                    (None, _) => doc.get(field).map_or(true, |v| v.is_null()),
                    (Some(_), None) => false,
                }
            }
        }
    }
}

/// One element of an all-or-nothing `transact` call.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put {
        key: DocKey,
        doc: Document,
        conditions: Vec<Condition>,
    },
    Update {
        key: DocKey,
        updates: Vec<FieldUpdate>,
        conditions: Vec<Condition>,
    },
    Delete {
        key: DocKey,
        conditions: Vec<Condition>,
    },
    /// Asserts conditions on a document without writing it.
    Check {
        key: DocKey,
        conditions: Vec<Condition>,
    },
}

impl WriteOp {
    pub fn key(&self) -> &DocKey {
        match self {
            WriteOp::Put { key, .. }
            | WriteOp::Update { key, .. }
            | WriteOp::Delete { key, .. }
            | WriteOp::Check { key, .. } => key,
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        match self {
            WriteOp::Put { conditions, .. }
            | WriteOp::Update { conditions, .. }
            | WriteOp::Delete { conditions, .. }
            | WriteOp::Check { conditions, .. } => conditions,
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &DocKey) -> Result<Option<Document>, StoreError>;

    async fn put(&self, key: &DocKey, doc: Document, conditions: &[Condition]) -> Result<(), StoreError>;

    /// Applies field updates, creating the document when it does not exist
    /// unless a condition forbids it.
    async fn update(
        &self,
        key: &DocKey,
        updates: &[FieldUpdate],
        conditions: &[Condition],
    ) -> Result<(), StoreError>;

    /// Deleting an absent document is not an error.
    async fn delete(&self, key: &DocKey) -> Result<(), StoreError>;

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Document)>, StoreError>;

    async fn transact(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;
}

pub fn to_value<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Malformed {
        key: "<value>".to_string(),
        reason: e.to_string(),
    })
}

pub fn to_document<T: Serialize>(key: &DocKey, value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Malformed {
            key: key.to_string(),
            reason: format!("expected an object, got {}", other),
        }),
        Err(e) => Err(StoreError::Malformed {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

pub fn from_document<T: DeserializeOwned>(key: &DocKey, doc: Document) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| StoreError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

pub async fn get_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    key: &DocKey,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(doc) => Ok(Some(from_document(key, doc)?)),
        None => Ok(None),
    }
}

pub async fn list_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &CollectionPath,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for (id, doc) in store.list(collection).await? {
        out.push(from_document(&collection.doc(&id), doc)?);
    }
    Ok(out)
}

/// Builds a `WriteOp::Put` from a serializable model.
pub fn put_op<T: Serialize>(
    key: DocKey,
    value: &T,
    conditions: Vec<Condition>,
) -> Result<WriteOp, StoreError> {
    let doc = to_document(&key, value)?;
    Ok(WriteOp::Put { key, doc, conditions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn conditions_evaluate_against_current_document() {
        let current = doc(json!({"status": "pending", "revision": 3, "batch_id": null}));
        assert!(Condition::Exists.holds(Some(&current)));
        assert!(!Condition::NotExists.holds(Some(&current)));
        assert!(Condition::NotExists.holds(None));
        assert!(Condition::field_equals("status", "pending").holds(Some(&current)));
        assert!(Condition::field_equals("revision", 3u64).holds(Some(&current)));
        assert!(!Condition::field_equals("revision", 4u64).holds(Some(&current)));
        assert!(Condition::field_absent("batch_id").holds(Some(&current)));
        assert!(Condition::field_absent("chain_id").holds(Some(&current)));
        assert!(!Condition::field_absent("status").holds(Some(&current)));
        assert!(!Condition::field_equals("status", "pending").holds(None));
        assert!(Condition::field_less_than("revision", 4u64).holds(Some(&current)));
        assert!(!Condition::field_less_than("revision", 3u64).holds(Some(&current)));
        assert!(Condition::field_less_than("profile_revision", 1u64).holds(Some(&current)));
        assert!(!Condition::field_less_than("revision", 9u64).holds(None));
    }
}
