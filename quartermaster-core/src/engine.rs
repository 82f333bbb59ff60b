//! Campaign engine: owns the state for a session and wires the ammo engine,
//! snapshot persistence and the sync outbox together.
use serde_json::{Value, json};
use std::collections::HashMap;
use thiserror::Error;

use crate::ammo::{AmmoAction, AmmoError, AmmoRecord, NewAmmo, apply_action};
use crate::config::CampaignConfig;
use crate::loader::{RepairReport, load_from_store, save_state};
use crate::repository::{Aggregate, CampaignRepository, Row, RowId};
use crate::state::{AmmoOwner, CampaignState};
use crate::storage::{SnapshotStore, outbox_key};
use crate::sync::{FlushReport, SyncOutbox, flush};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no character named `{0}`")]
    UnknownCharacter(String),
    #[error("{owner} has no ammo record at index {index} ({len} records)")]
    NoSuchRecord {
        owner: AmmoOwner,
        index: usize,
        len: usize,
    },
    #[error(transparent)]
    InvalidAmmo(#[from] AmmoError),
    #[error("record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("campaign state could not be persisted: {0}")]
    Storage(String),
}

/// Main engine for one campaign session.
pub struct CampaignEngine<S>
where
    S: SnapshotStore,
{
    store: S,
    config: CampaignConfig,
    state: CampaignState,
    outbox: SyncOutbox,
    report: RepairReport,
}

impl<S> CampaignEngine<S>
where
    S: SnapshotStore,
{
    /// Load the stored snapshot and outbox. Never fails: unreadable data
    /// yields the default state and an empty outbox.
    pub fn open(store: S, config: CampaignConfig) -> Self {
        let repaired = load_from_store(&store, &config.storage_key, &config.roster);
        let mut outbox = match store.read(&outbox_key(&config.storage_key)) {
            Ok(Some(raw)) => SyncOutbox::from_json(&raw),
            Ok(None) => SyncOutbox::new(),
            Err(err) => {
                log::warn!("sync outbox could not be read ({err}); starting empty");
                SyncOutbox::new()
            }
        };
        outbox.reserve_provisional(
            repaired
                .state
                .all_ammo()
                .filter_map(|(_, record)| record.id.as_deref()),
        );
        log::info!(
            "campaign opened from {} snapshot: {} characters, {} repairs, {} pending writes",
            repaired.report.source.as_str(),
            repaired.state.characters.len(),
            repaired.report.repairs.len(),
            outbox.len()
        );
        Self {
            store,
            config,
            state: repaired.state,
            outbox,
            report: repaired.report,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &CampaignState {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> CampaignState {
        self.state
    }

    /// What loading had to repair.
    #[must_use]
    pub const fn repair_report(&self) -> &RepairReport {
        &self.report
    }

    #[must_use]
    pub const fn outbox(&self) -> &SyncOutbox {
        &self.outbox
    }

    #[must_use]
    pub const fn config(&self) -> &CampaignConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Write the snapshot and the outbox.
    ///
    /// # Errors
    ///
    /// Returns an error if either cannot be written.
    pub fn save(&self) -> Result<(), LedgerError> {
        save_state(&self.state, &self.store, &self.config.storage_key)
            .map_err(|err| LedgerError::Storage(err.to_string()))?;
        self.save_outbox()
    }

    fn save_outbox(&self) -> Result<(), LedgerError> {
        let encoded = self.outbox.to_json()?;
        self.store
            .write(&outbox_key(&self.config.storage_key), &encoded)
            .map_err(|err| LedgerError::Storage(err.to_string()))
    }

    /// Mutate the state directly (collection appends and replacements), then persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted afterwards.
    pub fn with_state_mut<T>(&mut self, f: impl FnOnce(&mut CampaignState) -> T) -> Result<T, LedgerError> {
        let value = f(&mut self.state);
        self.save()?;
        Ok(value)
    }

    /// The ammo list for an owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner is a character not in the campaign.
    pub fn ammo(&self, owner: &AmmoOwner) -> Result<&[AmmoRecord], LedgerError> {
        match owner {
            AmmoOwner::Party => Ok(&self.state.party_ammo),
            AmmoOwner::Character(name) => self
                .state
                .character(name)
                .map(|sheet| sheet.ammo.as_slice())
                .ok_or_else(|| LedgerError::UnknownCharacter(name.clone())),
        }
    }

    fn record_at(&self, owner: &AmmoOwner, index: usize) -> Result<&AmmoRecord, LedgerError> {
        let list = self.ammo(owner)?;
        list.get(index).ok_or_else(|| LedgerError::NoSuchRecord {
            owner: owner.clone(),
            index,
            len: list.len(),
        })
    }

    /// Fire one round from the record at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist or the result cannot be persisted.
    pub fn fire(&mut self, owner: &AmmoOwner, index: usize) -> Result<AmmoRecord, LedgerError> {
        self.act(owner, index, AmmoAction::Fire)
    }

    /// Reload the record at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist or the result cannot be persisted.
    pub fn reload(&mut self, owner: &AmmoOwner, index: usize) -> Result<AmmoRecord, LedgerError> {
        self.act(owner, index, AmmoAction::Reload)
    }

    /// Apply one action and commit it: whole-list replacement, a queued remote
    /// update for synced records, then the save. A no-op is not committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist or the result cannot be persisted.
    pub fn act(
        &mut self,
        owner: &AmmoOwner,
        index: usize,
        action: AmmoAction,
    ) -> Result<AmmoRecord, LedgerError> {
        let current = self.record_at(owner, index)?;
        let next = apply_action(current, action);
        if next == *current {
            log::debug!("{action} on {owner}[{index}] ({}) changed nothing", current.weapon);
            return Ok(next);
        }
        log::debug!(
            "{action} on {owner}[{index}] ({}): {} -> {} rounds",
            next.weapon,
            current.total_rounds,
            next.total_rounds
        );

        let mut list = self.ammo(owner)?.to_vec();
        list[index] = next.clone();
        self.state.replace_ammo(owner, list);
        if let Some(id) = next.id.clone() {
            self.outbox
                .enqueue_update(Aggregate::Ammo, owner.remote(), id, counts_patch(&next));
        }
        self.save()?;
        Ok(next)
    }

    /// Validate the add form, append the record, and queue its insert.
    /// Returns the index of the new record.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner is unknown, the form is invalid, or the
    /// state cannot be persisted.
    pub fn add_ammo(&mut self, owner: &AmmoOwner, form: NewAmmo) -> Result<usize, LedgerError> {
        let mut list = self.ammo(owner)?.to_vec();
        let mut record = AmmoRecord::from_form(form)?;
        let fields = Row::from_record(&record)?.fields;
        record.id = Some(
            self.outbox
                .enqueue_insert(Aggregate::Ammo, owner.remote(), fields),
        );
        log::info!(
            "added {} ({} rounds) to {owner}",
            record.weapon,
            record.total_rounds
        );
        list.push(record);
        let index = list.len() - 1;
        self.state.replace_ammo(owner, list);
        self.save()?;
        Ok(index)
    }

    /// Remove the record at `index`, queueing a remote delete when it was synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist or the state cannot be persisted.
    pub fn remove_ammo(&mut self, owner: &AmmoOwner, index: usize) -> Result<AmmoRecord, LedgerError> {
        self.record_at(owner, index)?;
        let mut list = self.ammo(owner)?.to_vec();
        let removed = list.remove(index);
        self.state.replace_ammo(owner, list);
        if let Some(id) = removed.id.clone() {
            self.outbox.enqueue_delete(Aggregate::Ammo, owner.remote(), id);
        }
        self.save()?;
        Ok(removed)
    }

    /// Bulk edit: replace an owner's whole list. Records are normalized, and
    /// the difference against the previous list is queued for the remote store.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner is unknown or the state cannot be persisted.
    pub fn replace_ammo_list(
        &mut self,
        owner: &AmmoOwner,
        list: Vec<AmmoRecord>,
    ) -> Result<(), LedgerError> {
        let previous: HashMap<RowId, AmmoRecord> = self
            .ammo(owner)?
            .iter()
            .filter_map(|record| record.id.clone().map(|id| (id, record.clone())))
            .collect();
        let remote = owner.remote();

        let mut next = Vec::with_capacity(list.len());
        for record in list {
            let mut record = record.normalized();
            match record.id.clone() {
                Some(id) if previous.contains_key(&id) => {
                    if previous.get(&id) != Some(&record) {
                        let fields = Row::from_record(&record)?.fields;
                        self.outbox
                            .enqueue_update(Aggregate::Ammo, remote.clone(), id, fields);
                    }
                }
                _ => {
                    record.id = None;
                    let fields = Row::from_record(&record)?.fields;
                    record.id = Some(
                        self.outbox
                            .enqueue_insert(Aggregate::Ammo, remote.clone(), fields),
                    );
                }
            }
            next.push(record);
        }
        for id in previous.keys() {
            if !next.iter().any(|record| record.id.as_ref() == Some(id)) {
                self.outbox
                    .enqueue_delete(Aggregate::Ammo, remote.clone(), id.clone());
            }
        }

        self.state.replace_ammo(owner, next);
        self.save()
    }

    /// Deliver queued writes and adopt the ids the remote store assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated state cannot be persisted; delivery
    /// failures are reported in the [`FlushReport`], not as errors.
    pub async fn sync<R>(&mut self, repo: &R) -> Result<FlushReport, LedgerError>
    where
        R: CampaignRepository + ?Sized,
    {
        let report = flush(&mut self.outbox, repo, &self.config.outbox).await;
        if !report.assigned.is_empty() {
            self.adopt_ids(&report);
        }
        self.save()?;
        Ok(report)
    }

    fn adopt_ids(&mut self, report: &FlushReport) {
        let adopt = |list: &mut [AmmoRecord]| {
            for record in list {
                if let Some(real) = record.id.as_ref().and_then(|id| report.assigned.get(id)) {
                    record.id = Some(real.clone());
                }
            }
        };
        adopt(&mut self.state.party_ammo);
        for sheet in self.state.characters.values_mut() {
            adopt(&mut sheet.ammo);
        }
    }
}

/// The four counters always travel together.
fn counts_patch(record: &AmmoRecord) -> Value {
    json!({
        "roundsLoaded": record.rounds_loaded,
        "spareMagazines": record.spare_magazines,
        "looseRounds": record.loose_rounds,
        "totalRounds": record.total_rounds,
    })
}
