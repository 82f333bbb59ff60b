//! File-backed implementations of the core storage and repository traits.
use async_trait::async_trait;
use quartermaster_core::repository::merge_fields;
use quartermaster_core::{Aggregate, CampaignRepository, OwnerId, RepositoryError, Row, RowId, SnapshotStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("invalid slot key `{0}`")]
    InvalidKey(String),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One file per slot key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FileStoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| FileStoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, FileStoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            && !key.starts_with('.');
        if !valid {
            return Err(FileStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl SnapshotStore for FileStore {
    type Error = FileStoreError;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let path = self.slot_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(FileStoreError::Io { path, source }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        let path = self.slot_path(key)?;
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, value)
            .and_then(|()| std::fs::rename(&staging, &path))
            .map_err(|source| FileStoreError::Io { path, source })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RemoteRow {
    aggregate: Aggregate,
    owner: OwnerId,
    row: Row,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RemoteTables {
    next_id: u64,
    rows: Vec<RemoteRow>,
}

/// Stand-in for the remote store: a JSON file of rows, rewritten on every call.
#[derive(Debug)]
pub struct FileRepository {
    path: PathBuf,
    offline: bool,
    lock: tokio::sync::Mutex<()>,
}

impl FileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offline: false,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Every call fails as if the network were down.
    #[must_use]
    pub const fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    fn unavailable(&self, err: impl std::fmt::Display) -> RepositoryError {
        RepositoryError::Unavailable(format!("{}: {err}", self.path.display()))
    }

    async fn load(&self) -> Result<RemoteTables, RepositoryError> {
        if self.offline {
            return Err(RepositoryError::Unavailable("offline".to_string()));
        }
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text).map_err(|err| self.unavailable(err)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RemoteTables::default()),
            Err(err) => Err(self.unavailable(err)),
        }
    }

    async fn store(&self, tables: &RemoteTables) -> Result<(), RepositoryError> {
        let encoded = serde_json::to_string_pretty(tables).map_err(|err| self.unavailable(err))?;
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|err| self.unavailable(err))
    }
}

#[async_trait]
impl CampaignRepository for FileRepository {
    async fn list(&self, aggregate: Aggregate, owner: &OwnerId) -> Result<Vec<Row>, RepositoryError> {
        let _guard = self.lock.lock().await;
        let tables = self.load().await?;
        Ok(tables
            .rows
            .into_iter()
            .filter(|remote| remote.aggregate == aggregate && &remote.owner == owner)
            .map(|remote| remote.row)
            .collect())
    }

    async fn add(&self, aggregate: Aggregate, owner: &OwnerId, row: Row) -> Result<Row, RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut tables = self.load().await?;
        tables.next_id += 1;
        let stored = Row {
            id: Some(tables.next_id.to_string()),
            fields: row.fields,
        };
        tables.rows.push(RemoteRow {
            aggregate,
            owner: owner.clone(),
            row: stored.clone(),
        });
        self.store(&tables).await?;
        Ok(stored)
    }

    async fn update(&self, aggregate: Aggregate, id: &RowId, patch: Value) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut tables = self.load().await?;
        let remote = tables
            .rows
            .iter_mut()
            .find(|remote| remote.aggregate == aggregate && remote.row.id.as_ref() == Some(id))
            .ok_or_else(|| RepositoryError::NotFound {
                aggregate,
                id: id.clone(),
            })?;
        merge_fields(&mut remote.row.fields, patch);
        self.store(&tables).await
    }

    async fn delete(&self, aggregate: Aggregate, id: &RowId) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut tables = self.load().await?;
        let before = tables.rows.len();
        tables
            .rows
            .retain(|remote| !(remote.aggregate == aggregate && remote.row.id.as_ref() == Some(id)));
        if tables.rows.len() == before {
            return Err(RepositoryError::NotFound {
                aggregate,
                id: id.clone(),
            });
        }
        self.store(&tables).await
    }
}
