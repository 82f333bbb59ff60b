//! Outbox of remote writes.
//!
//! Local state is committed first; each committed change is queued here and
//! replayed against a [`CampaignRepository`] on [`flush`]. Writes to the same
//! row stay in order: once one fails, later writes for that row wait for the
//! next flush. Rows created locally carry a provisional id until the remote
//! store assigns a real one.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::repository::{Aggregate, CampaignRepository, OwnerId, Row, RowId};

/// Prefix of ids handed out before the remote store has seen a row.
pub const PROVISIONAL_PREFIX: &str = "local-";

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[must_use]
pub fn is_provisional(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxPolicy {
    /// Failed deliveries allowed before a write is abandoned.
    pub max_attempts: u32,
}

impl Default for OutboxPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    /// `row.id` holds the provisional id.
    Insert { row: Row },
    Update { id: RowId, patch: Value },
    Delete { id: RowId },
}

impl WriteOp {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    /// The row this write touches.
    #[must_use]
    pub fn target(&self) -> Option<&RowId> {
        match self {
            Self::Insert { row } => row.id.as_ref(),
            Self::Update { id, .. } | Self::Delete { id } => Some(id),
        }
    }

    fn retarget(&mut self, assigned: &BTreeMap<RowId, RowId>) {
        let target = match self {
            Self::Insert { .. } => return,
            Self::Update { id, .. } | Self::Delete { id } => id,
        };
        if let Some(real) = assigned.get(target.as_str()) {
            target.clone_from(real);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub seq: u64,
    pub aggregate: Aggregate,
    pub owner: OwnerId,
    pub op: WriteOp,
    pub queued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PendingWrite {
    fn row_key(&self) -> Option<(Aggregate, RowId)> {
        self.op.target().map(|id| (self.aggregate, id.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SyncOutbox {
    #[serde(default)]
    next_seq: u64,
    #[serde(default)]
    entries: Vec<PendingWrite>,
}

impl SyncOutbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted outbox. Unreadable data yields an empty outbox.
    #[must_use]
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|err| {
            log::warn!("sync outbox could not be parsed ({err}); starting empty");
            Self::default()
        })
    }

    /// # Errors
    ///
    /// Returns an error if the outbox cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    #[must_use]
    pub fn entries(&self) -> &[PendingWrite] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move the sequence past provisional ids already held by local records,
    /// so a lost or reset outbox never hands the same id out twice.
    pub fn reserve_provisional<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        let highest = ids
            .into_iter()
            .filter_map(|id| id.strip_prefix(PROVISIONAL_PREFIX)?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        if highest > self.next_seq {
            log::warn!(
                "outbox sequence {} is behind local id {PROVISIONAL_PREFIX}{highest}; advancing",
                self.next_seq
            );
            self.next_seq = highest;
        }
    }

    fn push(&mut self, aggregate: Aggregate, owner: OwnerId, op: WriteOp) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        log::debug!("outbox #{seq}: {} {aggregate} for {owner}", op.kind());
        self.entries.push(PendingWrite {
            seq,
            aggregate,
            owner,
            op,
            queued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        });
        seq
    }

    /// Queue a new row; returns the provisional id to store on the local record.
    pub fn enqueue_insert(&mut self, aggregate: Aggregate, owner: OwnerId, fields: Value) -> RowId {
        let provisional = format!("{PROVISIONAL_PREFIX}{}", self.next_seq + 1);
        let row = Row {
            id: Some(provisional.clone()),
            fields,
        };
        self.push(aggregate, owner, WriteOp::Insert { row });
        provisional
    }

    pub fn enqueue_update(&mut self, aggregate: Aggregate, owner: OwnerId, id: RowId, patch: Value) -> u64 {
        self.push(aggregate, owner, WriteOp::Update { id, patch })
    }

    /// Queue a delete. Deleting a row the remote store has never seen just
    /// cancels everything queued for it.
    pub fn enqueue_delete(&mut self, aggregate: Aggregate, owner: OwnerId, id: RowId) -> Option<u64> {
        if is_provisional(&id) {
            let before = self.entries.len();
            self.entries.retain(|entry| {
                entry.aggregate != aggregate || entry.op.target() != Some(&id)
            });
            log::debug!(
                "outbox: cancelled {} queued writes for unsynced row {id}",
                before - self.entries.len()
            );
            return None;
        }
        Some(self.push(aggregate, owner, WriteOp::Delete { id }))
    }
}

/// A write the remote store accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivered {
    pub seq: u64,
    pub aggregate: Aggregate,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FlushReport {
    pub delivered: Vec<Delivered>,
    /// Failed this round, kept for the next flush.
    pub retrying: Vec<u64>,
    /// Waiting behind an earlier failure for the same row.
    pub held: Vec<u64>,
    /// Given up on; the remote store will not reflect these.
    pub abandoned: Vec<PendingWrite>,
    /// Provisional id to remote id for every insert delivered.
    pub assigned: BTreeMap<RowId, RowId>,
}

impl FlushReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.retrying.is_empty() && self.held.is_empty() && self.abandoned.is_empty()
    }
}

async fn deliver<R>(repo: &R, entry: &PendingWrite) -> Result<Option<RowId>, String>
where
    R: CampaignRepository + ?Sized,
{
    let result = match &entry.op {
        WriteOp::Insert { row } => {
            let outgoing = Row {
                id: None,
                fields: row.fields.clone(),
            };
            repo.add(entry.aggregate, &entry.owner, outgoing)
                .await
                .map(|stored| stored.id)
        }
        WriteOp::Update { id, patch } => repo
            .update(entry.aggregate, id, patch.clone())
            .await
            .map(|()| None),
        WriteOp::Delete { id } => repo.delete(entry.aggregate, id).await.map(|()| None),
    };
    result.map_err(|err| err.to_string())
}

/// Replay queued writes in order.
pub async fn flush<R>(outbox: &mut SyncOutbox, repo: &R, policy: &OutboxPolicy) -> FlushReport
where
    R: CampaignRepository + ?Sized,
{
    let mut report = FlushReport::default();
    let mut blocked: HashSet<(Aggregate, RowId)> = HashSet::new();
    let mut dead: HashSet<(Aggregate, RowId)> = HashSet::new();
    let mut remaining = Vec::with_capacity(outbox.entries.len());

    for mut entry in std::mem::take(&mut outbox.entries) {
        entry.op.retarget(&report.assigned);
        let key = entry.row_key();

        if let Some(key) = key.as_ref() {
            if dead.contains(key) {
                report.abandoned.push(entry);
                continue;
            }
            if blocked.contains(key) {
                report.held.push(entry.seq);
                remaining.push(entry);
                continue;
            }
        }

        match deliver(repo, &entry).await {
            Ok(assigned) => {
                if let (WriteOp::Insert { row }, Some(real)) = (&entry.op, assigned)
                    && let Some(provisional) = row.id.clone()
                {
                    report.assigned.insert(provisional, real);
                }
                report.delivered.push(Delivered {
                    seq: entry.seq,
                    aggregate: entry.aggregate,
                    kind: entry.op.kind().to_string(),
                });
            }
            Err(err) => {
                entry.attempts += 1;
                log::warn!(
                    "outbox #{} {} {} failed (attempt {}): {err}",
                    entry.seq,
                    entry.op.kind(),
                    entry.aggregate,
                    entry.attempts
                );
                entry.last_error = Some(err);
                if entry.attempts >= policy.max_attempts {
                    if let Some(key) = key {
                        dead.insert(key);
                    }
                    report.abandoned.push(entry);
                } else {
                    if let Some(key) = key {
                        blocked.insert(key);
                    }
                    report.retrying.push(entry.seq);
                    remaining.push(entry);
                }
            }
        }
    }

    outbox.entries = remaining;
    log::info!(
        "outbox flush: {} delivered, {} retrying, {} held, {} abandoned",
        report.delivered.len(),
        report.retrying.len(),
        report.held.len(),
        report.abandoned.len()
    );
    report
}
