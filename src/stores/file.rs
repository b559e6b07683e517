//! Implementation of [Datastore] backed by a single JSON file.

use crate::store::{self, Datastore, Error, Fields};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{event, instrument, Level};

type Rows = BTreeMap<String, Fields>;

/// A [`Datastore`] which survives restarts by rewriting a JSON file.
///
/// The whole table is held in memory and written out on every `put`. This
/// suits small tables, such as one row per provisioned backend.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // "None" once closed.
    rows: Mutex<Option<Rows>>,
}

impl FileStore {
    /// Opens the store at `path`, creating an empty one if the file does
    /// not exist yet.
    #[instrument(skip(path), fields(path = %path.as_ref().display()), name = "FileStore::open")]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let rows = match tokio::fs::read(&path).await {
            Ok(contents) => serde_json::from_slice(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                event!(Level::INFO, "No existing store file, starting empty");
                Rows::new()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            rows: Mutex::new(Some(rows)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Writes to a sibling file first so a crash never leaves a torn table.
    async fn persist(&self, rows: &Rows) -> Result<(), Error> {
        let contents = serde_json::to_vec_pretty(rows)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Datastore for FileStore {
    async fn get(&self, key: &str, fields: &[&str]) -> Result<Fields, Error> {
        let guard = self.rows.lock().await;
        let rows = guard.as_ref().ok_or(Error::Closed)?;
        Ok(rows
            .get(key)
            .map(|row| store::project(row, fields))
            .unwrap_or_default())
    }

    async fn put(&self, key: &str, fields: Fields) -> Result<(), Error> {
        let mut guard = self.rows.lock().await;
        let rows = guard.as_mut().ok_or(Error::Closed)?;

        let mut updated = rows.clone();
        updated.entry(key.to_string()).or_default().extend(fields);
        self.persist(&updated).await?;
        *rows = updated;
        Ok(())
    }

    async fn list_all(&self, fields: &[&str]) -> Result<Vec<Fields>, Error> {
        let guard = self.rows.lock().await;
        let rows = guard.as_ref().ok_or(Error::Closed)?;
        Ok(rows
            .values()
            .map(|row| store::project(row, fields))
            .collect())
    }

    async fn close(&self) -> Result<(), Error> {
        self.rows.lock().await.take();
        Ok(())
    }
}
