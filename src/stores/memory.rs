//! Implementation of [Datastore] which keeps rows in memory.

use crate::store::{self, Datastore, Error, Fields};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A [`Datastore`] which forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, Fields>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a store which already contains `rows`.
    pub fn with_rows(rows: impl IntoIterator<Item = (String, Fields)>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().collect()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn get(&self, key: &str, fields: &[&str]) -> Result<Fields, Error> {
        self.check_open()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(key)
            .map(|row| store::project(row, fields))
            .unwrap_or_default())
    }

    async fn put(&self, key: &str, fields: Fields) -> Result<(), Error> {
        self.check_open()?;
        let mut rows = self.rows.lock().unwrap();
        rows.entry(key.to_string()).or_default().extend(fields);
        Ok(())
    }

    async fn list_all(&self, fields: &[&str]) -> Result<Vec<Fields>, Error> {
        self.check_open()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .map(|row| store::project(row, fields))
            .collect())
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn get_missing_key_is_empty() {
        let store = MemoryStore::new();
        let fields = store.get("nope", &["endpoint"]).await.unwrap();
        assert!(fields.is_empty());
    }

    #[tokio::test]
    async fn get_returns_requested_fields_only() {
        let store = MemoryStore::new();
        store
            .put("k", row(&[("endpoint", "https://e/"), ("sd_model", "m")]))
            .await
            .unwrap();
        let fields = store.get("k", &["endpoint", "absent"]).await.unwrap();
        assert_eq!(fields, row(&[("endpoint", "https://e/")]));
    }

    #[tokio::test]
    async fn put_merges_into_existing_row() {
        let store = MemoryStore::new();
        store.put("k", row(&[("a", "1"), ("b", "2")])).await.unwrap();
        store.put("k", row(&[("b", "3")])).await.unwrap();
        let fields = store.get("k", &["a", "b"]).await.unwrap();
        assert_eq!(fields, row(&[("a", "1"), ("b", "3")]));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn list_all_returns_every_row() {
        let store = MemoryStore::with_rows([
            ("x".to_string(), row(&[("key", "x")])),
            ("y".to_string(), row(&[("key", "y")])),
        ]);
        let rows = store.list_all(&["key"]).await.unwrap();
        assert_eq!(rows, vec![row(&[("key", "x")]), row(&[("key", "y")])]);
    }

    #[tokio::test]
    async fn closed_store_refuses_access() {
        let store = MemoryStore::new();
        store.close().await.unwrap();
        assert!(matches!(store.get("k", &[]).await, Err(Error::Closed)));
        assert!(matches!(
            store.put("k", Fields::new()).await,
            Err(Error::Closed)
        ));
    }
}
