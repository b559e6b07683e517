//! The interface for the durable store, which remembers provisioned backends.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store contents")]
    Corrupt(#[from] serde_json::Error),

    #[error("Store closed")]
    Closed,

    #[error(transparent)]
    Other(anyhow::Error),
}

/// A single row: column name to value.
pub type Fields = BTreeMap<String, String>;

/// A key-value table of flat rows.
///
/// Implementations must be safe to share between tasks; the manager
/// calls into the store from any task which misses the cache.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Reads the requested `fields` of the row stored under `key`.
    ///
    /// Returns an empty map if no such row exists. Fields which the row
    /// does not contain are omitted.
    async fn get(&self, key: &str, fields: &[&str]) -> Result<Fields, Error>;

    /// Writes `fields` into the row stored under `key`, creating it if needed.
    async fn put(&self, key: &str, fields: Fields) -> Result<(), Error>;

    /// Reads the requested `fields` of every row.
    async fn list_all(&self, fields: &[&str]) -> Result<Vec<Fields>, Error>;

    /// Releases any resources held by the store.
    ///
    /// By default this method does nothing.
    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

pub type SharedDatastore = Arc<dyn Datastore>;

// Copies the requested subset of a row.
pub(crate) fn project(row: &Fields, fields: &[&str]) -> Fields {
    fields
        .iter()
        .filter_map(|field| {
            row.get(*field)
                .map(|value| (field.to_string(), value.clone()))
        })
        .collect()
}
