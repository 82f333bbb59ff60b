//! Snapshot load and repair.
//!
//! A stored snapshot may be missing, unparsable, from an older release, or
//! hand-edited. Loading never fails: anything that cannot be read falls back to
//! the default state, and anything partially readable is repaired towards the
//! canonical shape, with every repair recorded in a [`RepairReport`].
//!
//! Rows already present are kept as stored, unknown fields included; rows that
//! do not match their row type are carried verbatim. Only ammo records are
//! rewritten, since their totals are derived.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::state::{CampaignState, CharacterSheet, DEFAULT_ROSTER};
use crate::storage::SnapshotStore;

/// Where the loaded state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Nothing stored yet; default state.
    Missing,
    /// The store failed on read; default state.
    Unreadable,
    /// Stored bytes were not a JSON object; default state.
    Unparsable,
    /// Parsed and repaired.
    Parsed,
}

impl SnapshotSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Unreadable => "unreadable",
            Self::Unparsable => "unparsable",
            Self::Parsed => "parsed",
        }
    }

    /// Whether the state is the default rather than anything read from storage.
    #[must_use]
    pub const fn is_default(self) -> bool {
        !matches!(self, Self::Parsed)
    }
}

/// Address of a collection inside the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    pub collection: String,
}

impl Location {
    fn top(collection: &str) -> Self {
        Self {
            character: None,
            collection: collection.to_string(),
        }
    }

    fn sheet(character: &str, collection: &str) -> Self {
        Self {
            character: Some(character.to_string()),
            collection: collection.to_string(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.character {
            Some(character) => write!(f, "PCs[{character}].{}", self.collection),
            None => f.write_str(&self.collection),
        }
    }
}

/// One change made while repairing a parsed snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "repair", rename_all = "snake_case")]
pub enum Repair {
    MissingCharacterMap,
    InvalidCharacterMap,
    InvalidCharacter { character: String },
    MissingCollection { location: Location },
    InvalidCollection { location: Location },
    /// An ammo entry that is not a record at all (a bare number, a list).
    DroppedRow { location: Location, index: usize, reason: String },
    RecomputedTotal { location: Location, index: usize },
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCharacterMap => f.write_str("PCs missing; initialized empty"),
            Self::InvalidCharacterMap => f.write_str("PCs was not an object; replaced with empty"),
            Self::InvalidCharacter { character } => {
                write!(f, "PCs[{character}] was not an object; replaced with empty sheet")
            }
            Self::MissingCollection { location } => write!(f, "{location} missing; initialized empty"),
            Self::InvalidCollection { location } => {
                write!(f, "{location} was not a list; replaced with empty")
            }
            Self::DroppedRow {
                location,
                index,
                reason,
            } => write!(f, "{location}[{index}] dropped: {reason}"),
            Self::RecomputedTotal { location, index } => {
                write!(f, "{location}[{index}] total rounds recomputed")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub source: SnapshotSource,
    pub repairs: Vec<Repair>,
}

impl RepairReport {
    const fn new(source: SnapshotSource) -> Self {
        Self {
            source,
            repairs: Vec::new(),
        }
    }

    /// Loaded from storage without any change.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.source == SnapshotSource::Parsed && self.repairs.is_empty()
    }

    fn push(&mut self, repair: Repair) {
        log::warn!("snapshot repair: {repair}");
        self.repairs.push(repair);
    }
}

/// Result of loading: always a usable state, plus what it took to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub state: CampaignState,
    pub report: RepairReport,
}

/// Load with the default roster.
#[must_use]
pub fn load_state(raw: Option<&str>) -> CampaignState {
    load_state_with(raw, &DEFAULT_ROSTER)
}

/// Load with a configured roster; the roster only seeds the default state.
#[must_use]
pub fn load_state_with<S: AsRef<str>>(raw: Option<&str>, roster: &[S]) -> CampaignState {
    repair_snapshot(raw, roster).state
}

fn default_for<S: AsRef<str>>(roster: &[S], source: SnapshotSource) -> Repaired {
    Repaired {
        state: CampaignState::with_roster(roster.iter().map(|name| name.as_ref().to_string())),
        report: RepairReport::new(source),
    }
}

/// Parse and repair raw snapshot text.
#[must_use]
pub fn repair_snapshot<S: AsRef<str>>(raw: Option<&str>, roster: &[S]) -> Repaired {
    let Some(raw) = raw else {
        log::info!("no stored snapshot; starting from default state");
        return default_for(roster, SnapshotSource::Missing);
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(root)) => repair_root(root),
        Ok(other) => {
            log::warn!("snapshot root is {}, not an object; using default state", kind_of(&other));
            default_for(roster, SnapshotSource::Unparsable)
        }
        Err(err) => {
            log::warn!("snapshot could not be parsed ({err}); using default state");
            default_for(roster, SnapshotSource::Unparsable)
        }
    }
}

/// Read the snapshot from a store and repair it. A failing read is treated
/// like an unparsable snapshot.
#[must_use]
pub fn load_from_store<T, S>(store: &T, key: &str, roster: &[S]) -> Repaired
where
    T: SnapshotStore,
    S: AsRef<str>,
{
    match store.read(key) {
        Ok(raw) => repair_snapshot(raw.as_deref(), roster),
        Err(err) => {
            log::warn!("snapshot slot `{key}` could not be read ({err}); using default state");
            default_for(roster, SnapshotSource::Unreadable)
        }
    }
}

#[derive(Debug, Error)]
pub enum SaveError<E>
where
    E: std::error::Error + 'static,
{
    #[error("snapshot could not be serialized: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("snapshot could not be written: {0}")]
    Store(#[source] E),
}

/// Serialize the whole state and overwrite the slot.
///
/// # Errors
///
/// Returns an error if the state cannot be serialized or the store rejects the write.
pub fn save_state<T: SnapshotStore>(
    state: &CampaignState,
    store: &T,
    key: &str,
) -> Result<(), SaveError<T::Error>> {
    let encoded = serde_json::to_string(state)?;
    store.write(key, &encoded).map_err(SaveError::Store)?;
    log::debug!("snapshot saved to `{key}` ({} bytes)", encoded.len());
    Ok(())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn repair_root(mut root: Map<String, Value>) -> Repaired {
    let mut report = RepairReport::new(SnapshotSource::Parsed);
    let mut state = CampaignState {
        party_finance: take_rows(&mut root, Location::top("PartyFinance"), &mut report),
        ship_finance: take_rows(&mut root, Location::top("ShipFinance"), &mut report),
        cargo: take_rows(&mut root, Location::top("Cargo"), &mut report),
        maintenance: take_rows(&mut root, Location::top("Maintenance"), &mut report),
        loans: take_rows(&mut root, Location::top("Loans"), &mut report),
        party_inventory: take_rows(&mut root, Location::top("PartyInventory"), &mut report),
        party_ammo: take_rows(&mut root, Location::top("PartyAmmo"), &mut report),
        ..CampaignState::default()
    };

    match root.remove(CampaignState::CHARACTERS_KEY) {
        None | Some(Value::Null) => report.push(Repair::MissingCharacterMap),
        Some(Value::Object(characters)) => {
            for (name, sheet) in characters {
                let sheet = repair_sheet(&name, sheet, &mut report);
                state.characters.insert(name, sheet);
            }
        }
        Some(_) => report.push(Repair::InvalidCharacterMap),
    }

    flag_stale_totals(&state, &mut report);
    state.normalize_ammo();
    Repaired { state, report }
}

fn repair_sheet(name: &str, value: Value, report: &mut RepairReport) -> CharacterSheet {
    let mut fields = match value {
        Value::Object(fields) => fields,
        _ => {
            report.push(Repair::InvalidCharacter {
                character: name.to_string(),
            });
            Map::new()
        }
    };
    CharacterSheet {
        finance: take_rows(&mut fields, Location::sheet(name, "Finance"), report),
        inventory: take_rows(&mut fields, Location::sheet(name, "Inventory"), report),
        weapons: take_rows(&mut fields, Location::sheet(name, "Weapons"), report),
        armour: take_rows(&mut fields, Location::sheet(name, "Armour"), report),
        ammo: take_rows(&mut fields, Location::sheet(name, "Ammo"), report),
    }
}

/// Pull one collection out of its container, keeping every readable row in order.
/// `Stored` rows always read; only ammo entries can be dropped here.
fn take_rows<T: DeserializeOwned>(
    container: &mut Map<String, Value>,
    location: Location,
    report: &mut RepairReport,
) -> Vec<T> {
    match container.remove(&location.collection) {
        None | Some(Value::Null) => {
            report.push(Repair::MissingCollection { location });
            Vec::new()
        }
        Some(Value::Array(items)) => {
            let mut rows = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match serde_json::from_value::<T>(item) {
                    Ok(row) => rows.push(row),
                    Err(err) => report.push(Repair::DroppedRow {
                        location: location.clone(),
                        index,
                        reason: err.to_string(),
                    }),
                }
            }
            rows
        }
        Some(_) => {
            report.push(Repair::InvalidCollection { location });
            Vec::new()
        }
    }
}

fn flag_stale_totals(state: &CampaignState, report: &mut RepairReport) {
    for (index, record) in state.party_ammo.iter().enumerate() {
        if !record.is_consistent() {
            report.push(Repair::RecomputedTotal {
                location: Location::top("PartyAmmo"),
                index,
            });
        }
    }
    for (name, sheet) in &state.characters {
        for (index, record) in sheet.ammo.iter().enumerate() {
            if !record.is_consistent() {
                report.push(Repair::RecomputedTotal {
                    location: Location::sheet(name, "Ammo"),
                    index,
                });
            }
        }
    }
}
