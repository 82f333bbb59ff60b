//! Remote persistence boundary.
//!
//! The engine never calls a repository while computing; remote writes are
//! queued in the [`crate::sync::SyncOutbox`] and replayed against whichever
//! [`CampaignRepository`] the caller injects.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

/// Identity assigned by the remote store.
pub type RowId = String;

/// Record kinds the remote store keeps, at campaign and character level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Finance,
    Cargo,
    Maintenance,
    Loans,
    Inventory,
    Weapons,
    Armour,
    Ammo,
}

impl Aggregate {
    pub const ALL: [Self; 8] = [
        Self::Finance,
        Self::Cargo,
        Self::Maintenance,
        Self::Loans,
        Self::Inventory,
        Self::Weapons,
        Self::Armour,
        Self::Ammo,
    ];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Finance => "finance",
            Self::Cargo => "cargo",
            Self::Maintenance => "maintenance",
            Self::Loans => "loans",
            Self::Inventory => "inventory",
            Self::Weapons => "weapons",
            Self::Armour => "armour",
            Self::Ammo => "ammo",
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Who a remote row belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum OwnerId {
    Campaign,
    Character(String),
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Campaign => f.write_str("campaign"),
            Self::Character(name) => write!(f, "character:{name}"),
        }
    }
}

/// A row as it crosses the boundary: identity plus an opaque field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RowId>,
    pub fields: Value,
}

impl Row {
    /// Serialize a local record into a row, lifting its `id` field out if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be represented as JSON.
    pub fn from_record<T: Serialize>(record: &T) -> Result<Self, serde_json::Error> {
        let mut fields = serde_json::to_value(record)?;
        let id = fields
            .as_object_mut()
            .and_then(|map| map.remove("id"))
            .and_then(|id| match id {
                Value::String(text) => Some(text),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            });
        Ok(Self { id, fields })
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{aggregate} row {id} not found")]
    NotFound { aggregate: Aggregate, id: RowId },
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote store rejected the write: {0}")]
    Rejected(String),
}

/// CRUD capability of the remote store, one call per record.
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// List rows of one aggregate for one owner, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote store cannot be reached.
    async fn list(&self, aggregate: Aggregate, owner: &OwnerId) -> Result<Vec<Row>, RepositoryError>;

    /// Insert a row; the store assigns its identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects or cannot receive the row.
    async fn add(
        &self,
        aggregate: Aggregate,
        owner: &OwnerId,
        row: Row,
    ) -> Result<Row, RepositoryError>;

    /// Merge `patch` into the fields of an existing row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row does not exist or the store is unavailable.
    async fn update(
        &self,
        aggregate: Aggregate,
        id: &RowId,
        patch: Value,
    ) -> Result<(), RepositoryError>;

    /// Remove a row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row does not exist or the store is unavailable.
    async fn delete(&self, aggregate: Aggregate, id: &RowId) -> Result<(), RepositoryError>;
}

/// Shallow merge of object fields; a non-object patch replaces the target.
pub fn merge_fields(target: &mut Value, patch: Value) {
    match (target.as_object_mut(), patch) {
        (Some(fields), Value::Object(changes)) => {
            for (key, value) in changes {
                fields.insert(key, value);
            }
        }
        (_, patch) => *target = patch,
    }
}

#[derive(Debug, Clone)]
struct StoredRow {
    owner: OwnerId,
    row: Row,
}

#[derive(Debug, Default)]
struct MemoryTables {
    next_id: u64,
    rows: BTreeMap<Aggregate, Vec<StoredRow>>,
}

/// In-process repository; ids are sequential integers rendered as strings.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<MemoryTables>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut MemoryTables) -> T) -> Result<T, RepositoryError> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }

    /// Number of rows held for an aggregate across all owners.
    #[must_use]
    pub fn len(&self, aggregate: Aggregate) -> usize {
        self.with_tables(|tables| tables.rows.get(&aggregate).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl CampaignRepository for MemoryRepository {
    async fn list(&self, aggregate: Aggregate, owner: &OwnerId) -> Result<Vec<Row>, RepositoryError> {
        self.with_tables(|tables| {
            tables
                .rows
                .get(&aggregate)
                .map(|rows| {
                    rows.iter()
                        .filter(|stored| &stored.owner == owner)
                        .map(|stored| stored.row.clone())
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    async fn add(
        &self,
        aggregate: Aggregate,
        owner: &OwnerId,
        row: Row,
    ) -> Result<Row, RepositoryError> {
        self.with_tables(|tables| {
            tables.next_id += 1;
            let stored = Row {
                id: Some(tables.next_id.to_string()),
                fields: row.fields,
            };
            tables.rows.entry(aggregate).or_default().push(StoredRow {
                owner: owner.clone(),
                row: stored.clone(),
            });
            stored
        })
    }

    async fn update(
        &self,
        aggregate: Aggregate,
        id: &RowId,
        patch: Value,
    ) -> Result<(), RepositoryError> {
        self.with_tables(|tables| {
            let found = tables
                .rows
                .get_mut(&aggregate)
                .and_then(|rows| rows.iter_mut().find(|stored| stored.row.id.as_ref() == Some(id)));
            match found {
                Some(stored) => {
                    merge_fields(&mut stored.row.fields, patch);
                    Ok(())
                }
                None => Err(RepositoryError::NotFound {
                    aggregate,
                    id: id.clone(),
                }),
            }
        })?
    }

    async fn delete(&self, aggregate: Aggregate, id: &RowId) -> Result<(), RepositoryError> {
        self.with_tables(|tables| {
            let rows = tables.rows.entry(aggregate).or_default();
            let before = rows.len();
            rows.retain(|stored| stored.row.id.as_ref() != Some(id));
            if rows.len() == before {
                Err(RepositoryError::NotFound {
                    aggregate,
                    id: id.clone(),
                })
            } else {
                Ok(())
            }
        })?
    }
}
