use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// A stored wallet record: a typed key-value entry with queryable tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub category: String,
    pub id: String,
    pub value: String,
    pub tags: BTreeMap<String, String>,
}

/// Conjunctive tag query: exact matches plus `$in` lists.
///
/// `{"color": "red", "size": {"$in": ["s", "m"]}}` matches records whose
/// `color` tag equals "red" and whose `size` tag is one of "s" or "m".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletQuery {
    eq: BTreeMap<String, String>,
    any: BTreeMap<String, Vec<String>>,
}

impl WalletQuery {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        if json.trim().is_empty() {
            return Ok(WalletQuery::default());
        }
        let parsed: Value = serde_json::from_str(json)
            .map_err(|err| EngineError::InvalidInput(format!("malformed query: {err}")))?;
        let object = parsed
            .as_object()
            .ok_or_else(|| EngineError::InvalidInput("query must be an object".to_string()))?;

        let mut query = WalletQuery::default();
        for (tag, condition) in object {
            match condition {
                Value::String(value) => {
                    query.eq.insert(tag.clone(), value.clone());
                }
                Value::Object(op) => {
                    let list = op.get("$in").and_then(Value::as_array).ok_or_else(|| {
                        EngineError::InvalidInput(format!(
                            "unsupported condition for tag {tag:?}"
                        ))
                    })?;
                    let mut values = Vec::new();
                    for item in list {
                        let item = item.as_str().ok_or_else(|| {
                            EngineError::InvalidInput(format!(
                                "$in values for tag {tag:?} must be strings"
                            ))
                        })?;
                        values.push(item.to_string());
                    }
                    query.any.insert(tag.clone(), values);
                }
                _ => {
                    return Err(EngineError::InvalidInput(format!(
                        "unsupported condition for tag {tag:?}"
                    )))
                }
            }
        }
        Ok(query)
    }

    pub fn matches(&self, record: &Record) -> bool {
        for (tag, expected) in &self.eq {
            if record.tags.get(tag) != Some(expected) {
                return false;
            }
        }
        for (tag, allowed) in &self.any {
            match record.tags.get(tag) {
                Some(actual) if allowed.contains(actual) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Key-value storage with tag-indexed search. Called from worker threads,
/// never from the caller's thread. The storage implementation itself is an
/// external collaborator; an in-memory one ships for tests and the demo.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn add_record(
        &self,
        category: &str,
        id: &str,
        value: &str,
        tags: &BTreeMap<String, String>,
    ) -> EngineResult<()>;

    async fn get_record(&self, category: &str, id: &str) -> EngineResult<Record>;

    async fn update_record_value(&self, category: &str, id: &str, value: &str)
        -> EngineResult<()>;

    async fn delete_record(&self, category: &str, id: &str) -> EngineResult<()>;

    /// All records of `category` matching `query`, in insertion order.
    async fn search_records(&self, category: &str, query: &WalletQuery)
        -> EngineResult<Vec<Record>>;
}

pub struct InMemoryWallet {
    // insertion order is kept so searches page deterministically
    records: RwLock<Vec<Record>>,
    index: RwLock<HashMap<(String, String), usize>>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        InMemoryWallet {
            records: RwLock::new(Vec::new()),
            index: RwLock::new(HashMap::new()),
        }
    }

    fn key(category: &str, id: &str) -> (String, String) {
        (category.to_string(), id.to_string())
    }
}

impl Default for InMemoryWallet {
    fn default() -> Self {
        InMemoryWallet::new()
    }
}

#[async_trait]
impl WalletStore for InMemoryWallet {
    async fn add_record(
        &self,
        category: &str,
        id: &str,
        value: &str,
        tags: &BTreeMap<String, String>,
    ) -> EngineResult<()> {
        let mut index = self
            .index
            .write()
            .map_err(|_| EngineError::Internal("wallet index poisoned".to_string()))?;
        if index.contains_key(&Self::key(category, id)) {
            return Err(EngineError::InvalidInput(format!(
                "record {category}/{id} already exists"
            )));
        }
        let mut records = self
            .records
            .write()
            .map_err(|_| EngineError::Internal("wallet records poisoned".to_string()))?;
        index.insert(Self::key(category, id), records.len());
        records.push(Record {
            category: category.to_string(),
            id: id.to_string(),
            value: value.to_string(),
            tags: tags.clone(),
        });
        Ok(())
    }

    async fn get_record(&self, category: &str, id: &str) -> EngineResult<Record> {
        let index = self
            .index
            .read()
            .map_err(|_| EngineError::Internal("wallet index poisoned".to_string()))?;
        let records = self
            .records
            .read()
            .map_err(|_| EngineError::Internal("wallet records poisoned".to_string()))?;
        index
            .get(&Self::key(category, id))
            .map(|&at| records[at].clone())
            .ok_or_else(|| EngineError::NotFound(format!("record {category}/{id}")))
    }

    async fn update_record_value(
        &self,
        category: &str,
        id: &str,
        value: &str,
    ) -> EngineResult<()> {
        let index = self
            .index
            .read()
            .map_err(|_| EngineError::Internal("wallet index poisoned".to_string()))?;
        let mut records = self
            .records
            .write()
            .map_err(|_| EngineError::Internal("wallet records poisoned".to_string()))?;
        let &at = index
            .get(&Self::key(category, id))
            .ok_or_else(|| EngineError::NotFound(format!("record {category}/{id}")))?;
        records[at].value = value.to_string();
        Ok(())
    }

    async fn delete_record(&self, category: &str, id: &str) -> EngineResult<()> {
        let mut index = self
            .index
            .write()
            .map_err(|_| EngineError::Internal("wallet index poisoned".to_string()))?;
        let mut records = self
            .records
            .write()
            .map_err(|_| EngineError::Internal("wallet records poisoned".to_string()))?;
        let at = index
            .remove(&Self::key(category, id))
            .ok_or_else(|| EngineError::NotFound(format!("record {category}/{id}")))?;
        // tombstone rather than shift, so the index stays valid
        records[at].category.clear();
        Ok(())
    }

    async fn search_records(
        &self,
        category: &str,
        query: &WalletQuery,
    ) -> EngineResult<Vec<Record>> {
        let records = self
            .records
            .read()
            .map_err(|_| EngineError::Internal("wallet records poisoned".to_string()))?;
        Ok(records
            .iter()
            .filter(|record| record.category == category && query.matches(record))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn record_crud() {
        let wallet = InMemoryWallet::new();
        wallet
            .add_record("credential", "c1", "{}", &tags(&[("schema", "licence")]))
            .await
            .unwrap();

        // duplicate ids are rejected
        assert!(wallet
            .add_record("credential", "c1", "{}", &BTreeMap::new())
            .await
            .is_err());

        wallet
            .update_record_value("credential", "c1", r#"{"updated":true}"#)
            .await
            .unwrap();
        let record = wallet.get_record("credential", "c1").await.unwrap();
        assert!(record.value.contains("updated"));

        wallet.delete_record("credential", "c1").await.unwrap();
        assert!(matches!(
            wallet.get_record("credential", "c1").await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn tag_queries_are_conjunctive() {
        let wallet = InMemoryWallet::new();
        wallet
            .add_record("item", "a", "1", &tags(&[("color", "red"), ("size", "s")]))
            .await
            .unwrap();
        wallet
            .add_record("item", "b", "2", &tags(&[("color", "red"), ("size", "l")]))
            .await
            .unwrap();
        wallet
            .add_record("item", "c", "3", &tags(&[("color", "blue"), ("size", "s")]))
            .await
            .unwrap();

        let query = WalletQuery::from_json(r#"{"color": "red", "size": {"$in": ["s", "m"]}}"#)
            .unwrap();
        let found = wallet.search_records("item", &query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        let all = wallet
            .search_records("item", &WalletQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn malformed_queries_are_rejected() {
        assert!(WalletQuery::from_json("not json").is_err());
        assert!(WalletQuery::from_json(r#"{"tag": 7}"#).is_err());
        assert!(WalletQuery::from_json(r#"{"tag": {"$gt": "x"}}"#).is_err());
        assert!(WalletQuery::from_json("").is_ok());
    }
}
