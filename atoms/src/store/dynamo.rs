use async_trait::async_trait;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, ConditionCheck, Delete, Put, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::Value;
use std::collections::HashMap;

use super::{Condition, CollectionPath, DocKey, Document, DocumentStore, FieldUpdate, WriteOp};
use crate::error::StoreError;

const MAX_TRANSACT_ITEMS: usize = 100;

/// Single-table DynamoDB store.
/// Top-level docs:  PK = "USER#{user_id}", SK = "USER"
/// Nested docs:     PK = "USER#{id}",      SK = "TASK#{task_id}"
/// Nested collections are listed with a query on their parent's partition;
/// top-level collections (only the weekly sweep lists one) with a scan.
#[derive(Clone)]
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

fn primary_key(key: &DocKey) -> HashMap<String, AttributeValue> {
    let mut map = HashMap::new();
    map.insert("PK".to_string(), AttributeValue::S(key.partition_key()));
    map.insert("SK".to_string(), AttributeValue::S(key.sort_key()));
    map
}

pub(crate) fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

pub(crate) fn from_attribute(attr: &AttributeValue) -> Result<Value, String> {
    match attr {
        AttributeValue::S(s) => Ok(Value::String(s.clone())),
        AttributeValue::N(n) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::from(i))
            } else if let Ok(u) = n.parse::<u64>() {
                Ok(Value::from(u))
            } else {
                n.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| format!("unparseable number '{}'", n))
            }
        }
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::L(items) => items
            .iter()
            .map(from_attribute)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        AttributeValue::M(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), from_attribute(v)?);
            }
            Ok(Value::Object(out))
        }
        AttributeValue::Ss(items) => Ok(Value::Array(
            items.iter().map(|s| Value::String(s.clone())).collect(),
        )),
        other => Err(format!("unsupported attribute type {:?}", other)),
    }
}

fn to_item(key: &DocKey, doc: &Document) -> HashMap<String, AttributeValue> {
    let mut item = primary_key(key);
    for (field, value) in doc {
        item.insert(field.clone(), to_attribute(value));
    }
    item
}

fn from_item(key: &DocKey, item: &HashMap<String, AttributeValue>) -> Result<Document, StoreError> {
    let mut doc = Document::new();
    for (field, attr) in item {
        if field == "PK" || field == "SK" {
            continue;
        }
        let value = from_attribute(attr).map_err(|reason| StoreError::Malformed {
            key: key.to_string(),
            reason,
        })?;
        doc.insert(field.clone(), value);
    }
    Ok(doc)
}

/// Placeholder names/values shared by condition and update expressions.
#[derive(Default, Debug)]
pub(crate) struct Expression {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
    counter: usize,
}

impl Expression {
    fn name(&mut self, field: &str) -> String {
        self.counter += 1;
        let placeholder = format!("#f{}", self.counter);
        self.names.insert(placeholder.clone(), field.to_string());
        placeholder
    }

    fn value(&mut self, value: AttributeValue) -> String {
        self.counter += 1;
        let placeholder = format!(":v{}", self.counter);
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    pub(crate) fn condition(&mut self, conditions: &[Condition]) -> Option<String> {
        if conditions.is_empty() {
            return None;
        }
        let parts: Vec<String> = conditions
            .iter()
            .map(|c| match c {
                Condition::Exists => "attribute_exists(PK)".to_string(),
                Condition::NotExists => "attribute_not_exists(PK)".to_string(),
                Condition::FieldEquals(field, value) => {
                    let n = self.name(field);
                    let v = self.value(to_attribute(value));
                    format!("{} = {}", n, v)
                }
                Condition::FieldAbsent(field) => {
                    let n = self.name(field);
                    let null_type = self.value(AttributeValue::S("NULL".to_string()));
                    format!("(attribute_not_exists({}) OR attribute_type({}, {}))", n, n, null_type)
                }
                Condition::FieldLessThan(field, value) => {
                    let n = self.name(field);
                    let v = self.value(to_attribute(value));
                    format!("(attribute_not_exists({}) OR {} < {})", n, n, v)
                }
            })
            .collect();
        Some(parts.join(" AND "))
    }

    pub(crate) fn update(&mut self, updates: &[FieldUpdate]) -> String {
        let mut set_parts = vec![];
        let mut remove_parts = vec![];
        for update in updates {
            match update {
                FieldUpdate::Set(field, value) => {
                    let n = self.name(field);
                    let v = self.value(to_attribute(value));
                    set_parts.push(format!("{} = {}", n, v));
                }
                FieldUpdate::Increment(field, by) => {
                    let n = self.name(field);
                    let zero = self.value(AttributeValue::N("0".to_string()));
                    let delta = self.value(AttributeValue::N(by.to_string()));
                    set_parts.push(format!("{} = if_not_exists({}, {}) + {}", n, n, zero, delta));
                }
                FieldUpdate::Remove(field) => {
                    remove_parts.push(self.name(field));
                }
            }
        }
        let mut expr = vec![];
        if !set_parts.is_empty() {
            expr.push(format!("SET {}", set_parts.join(", ")));
        }
        if !remove_parts.is_empty() {
            expr.push(format!("REMOVE {}", remove_parts.join(", ")));
        }
        expr.join(" ")
    }

    fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    fn values(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

fn build_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Malformed {
        key: "<transaction>".to_string(),
        reason: format!("Failed to build transaction item: {}", e),
    }
}

impl DynamoStore {
    fn transact_item(&self, op: WriteOp) -> Result<TransactWriteItem, StoreError> {
        let mut expr = Expression::default();
        let item = match op {
            WriteOp::Put { key, doc, conditions } => {
                let condition = expr.condition(&conditions);
                let put = Put::builder()
                    .table_name(&self.table_name)
                    .set_item(Some(to_item(&key, &doc)))
                    .set_condition_expression(condition)
                    .set_expression_attribute_names(expr.names())
                    .set_expression_attribute_values(expr.values())
                    .build()
                    .map_err(build_error)?;
                TransactWriteItem::builder().put(put).build()
            }
            WriteOp::Update { key, updates, conditions } => {
                let update_expression = expr.update(&updates);
                let condition = expr.condition(&conditions);
                let update = Update::builder()
                    .table_name(&self.table_name)
                    .set_key(Some(primary_key(&key)))
                    .update_expression(update_expression)
                    .set_condition_expression(condition)
                    .set_expression_attribute_names(expr.names())
                    .set_expression_attribute_values(expr.values())
                    .build()
                    .map_err(build_error)?;
                TransactWriteItem::builder().update(update).build()
            }
            WriteOp::Delete { key, conditions } => {
                let condition = expr.condition(&conditions);
                let delete = Delete::builder()
                    .table_name(&self.table_name)
                    .set_key(Some(primary_key(&key)))
                    .set_condition_expression(condition)
                    .set_expression_attribute_names(expr.names())
                    .set_expression_attribute_values(expr.values())
                    .build()
                    .map_err(build_error)?;
                TransactWriteItem::builder().delete(delete).build()
            }
            WriteOp::Check { key, conditions } => {
                let condition = expr
                    .condition(&conditions)
                    .unwrap_or_else(|| "attribute_exists(PK)".to_string());
                let check = ConditionCheck::builder()
                    .table_name(&self.table_name)
                    .set_key(Some(primary_key(&key)))
                    .condition_expression(condition)
                    .set_expression_attribute_names(expr.names())
                    .set_expression_attribute_values(expr.values())
                    .build()
                    .map_err(build_error)?;
                TransactWriteItem::builder().condition_check(check).build()
            }
        };
        Ok(item)
    }

    async fn query_partition(
        &self,
        collection: &CollectionPath,
        pk: String,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let prefix = collection.sort_prefix();
        let mut out = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let result = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
                .expression_attribute_values(":pk", AttributeValue::S(pk.clone()))
                .expression_attribute_values(":sk_prefix", AttributeValue::S(prefix.clone()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| StoreError::Unavailable(format!("DynamoDB query error: {}", e)))?;

            for item in result.items() {
                if let Some(id) = item
                    .get("SK")
                    .and_then(|v| v.as_s().ok())
                    .and_then(|sk| sk.strip_prefix(&prefix))
                {
                    let key = collection.doc(id);
                    out.push((id.to_string(), from_item(&key, item)?));
                }
            }

            match result.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => break,
            }
        }

        Ok(out)
    }

    async fn scan_collection(
        &self,
        collection: &CollectionPath,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let tag = collection.collection.tag();
        let prefix = collection.sort_prefix();
        let mut out = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let result = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("SK = :sk AND begins_with(PK, :pk_prefix)")
                .expression_attribute_values(":sk", AttributeValue::S(tag.to_string()))
                .expression_attribute_values(":pk_prefix", AttributeValue::S(prefix.clone()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| StoreError::Unavailable(format!("DynamoDB scan error: {}", e)))?;

            for item in result.items() {
                if let Some(id) = item
                    .get("PK")
                    .and_then(|v| v.as_s().ok())
                    .and_then(|pk| pk.strip_prefix(&prefix))
                {
                    let key = collection.doc(id);
                    out.push((id.to_string(), from_item(&key, item)?));
                }
            }

            match result.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => break,
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for DynamoStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Document>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(key.partition_key()))
            .key("SK", AttributeValue::S(key.sort_key()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("DynamoDB get_item error: {}", e)))?;

        match result.item() {
            Some(item) => Ok(Some(from_item(key, item)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &DocKey, doc: Document, conditions: &[Condition]) -> Result<(), StoreError> {
        let mut expr = Expression::default();
        let condition = expr.condition(conditions);

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_item(key, &doc)))
            .set_condition_expression(condition)
            .set_expression_attribute_names(expr.names())
            .set_expression_attribute_values(expr.values())
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_conditional_check_failed_exception() {
                    StoreError::ConditionFailed
                } else {
                    StoreError::Unavailable(format!("DynamoDB put_item error: {}", err))
                }
            })?;
        Ok(())
    }

    async fn update(
        &self,
        key: &DocKey,
        updates: &[FieldUpdate],
        conditions: &[Condition],
    ) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut expr = Expression::default();
        let update_expression = expr.update(updates);
        let condition = expr.condition(conditions);

        self.client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(primary_key(key)))
            .update_expression(update_expression)
            .set_condition_expression(condition)
            .set_expression_attribute_names(expr.names())
            .set_expression_attribute_values(expr.values())
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_conditional_check_failed_exception() {
                    StoreError::ConditionFailed
                } else {
                    StoreError::Unavailable(format!("DynamoDB update_item error: {}", err))
                }
            })?;
        Ok(())
    }

    async fn delete(&self, key: &DocKey) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(primary_key(key)))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("DynamoDB delete_item error: {}", e)))?;
        Ok(())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Document)>, StoreError> {
        match collection.partition_key() {
            Some(pk) => self.query_partition(collection, pk).await,
            None => self.scan_collection(collection).await,
        }
    }

    async fn transact(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }
        if ops.len() > MAX_TRANSACT_ITEMS {
            return Err(StoreError::Malformed {
                key: "<transaction>".to_string(),
                reason: format!("{} items exceeds the limit of {}", ops.len(), MAX_TRANSACT_ITEMS),
            });
        }

        let items = ops
            .into_iter()
            .map(|op| self.transact_item(op))
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                TransactWriteItemsError::TransactionCanceledException(cancelled)
                    if cancelled
                        .cancellation_reasons()
                        .iter()
                        .any(|r| r.code() == Some("ConditionalCheckFailed")) =>
                {
                    StoreError::ConditionFailed
                }
                err => StoreError::Unavailable(format!("DynamoDB transact_write_items error: {}", err)),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attribute_conversion_preserves_document_shape() {
        let value = json!({
            "user_id": "u1",
            "total_xp": 120,
            "ratio": 0.5,
            "done": true,
            "batch_id": null,
            "tags": ["a", "b"],
            "nested": {"level": 3}
        });
        let attr = to_attribute(&value);
        assert_eq!(from_attribute(&attr), Ok(value));
    }

    #[test]
    fn numbers_round_trip_as_integers() {
        assert_eq!(to_attribute(&json!(42)), AttributeValue::N("42".to_string()));
        assert_eq!(from_attribute(&AttributeValue::N("42".to_string())), Ok(json!(42)));
        assert_eq!(from_attribute(&AttributeValue::N("-3".to_string())), Ok(json!(-3)));
    }

    #[test]
    fn update_expression_combines_set_and_remove() {
        let mut expr = Expression::default();
        let text = expr.update(&[
            FieldUpdate::set("completed", true),
            FieldUpdate::increment("total_xp", 20),
            FieldUpdate::remove("batch_id"),
        ]);
        assert_eq!(
            text,
            "SET #f1 = :v2, #f3 = if_not_exists(#f3, :v4) + :v5 REMOVE #f6"
        );
        let names = expr.names().unwrap_or_default();
        assert_eq!(names.get("#f3").map(String::as_str), Some("total_xp"));
    }

    #[test]
    fn condition_expression_joins_with_and() {
        let mut expr = Expression::default();
        let text = expr.condition(&[
            Condition::Exists,
            Condition::field_equals("status", "pending"),
        ]);
        assert_eq!(text.as_deref(), Some("attribute_exists(PK) AND #f1 = :v2"));
        assert!(Expression::default().condition(&[]).is_none());
    }

    #[test]
    fn less_than_condition_admits_missing_field() {
        let mut expr = Expression::default();
        let text = expr.condition(&[Condition::field_less_than("profile_revision", 4u64)]);
        assert_eq!(
            text.as_deref(),
            Some("(attribute_not_exists(#f1) OR #f1 < :v2)")
        );
        let values = expr.values().unwrap_or_default();
        assert_eq!(values.get(":v2"), Some(&AttributeValue::N("4".to_string())));
    }
}
