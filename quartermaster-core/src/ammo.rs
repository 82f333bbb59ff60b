//! Ammunition ledger engine.
//!
//! A weapon's rounds live in three places: the active magazine (`rounds_loaded`),
//! full spare magazines, and loose rounds. Firing and reloading move rounds
//! between them; `total_rounds` is derived and rewritten on every change.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::lenient;
use crate::repository::RowId;

/// One weapon's ammunition state.
///
/// Counts are read leniently (floats, numeric text, negatives clamp to zero)
/// since records are normalized on load anyway. Fields this release does not
/// model are carried in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AmmoRecord {
    /// Identity assigned by the remote store once the record has been synced.
    #[serde(
        default,
        deserialize_with = "lenient::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<RowId>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub weapon: String,
    #[serde(
        default,
        deserialize_with = "lenient::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub ammo_type: Option<String>,
    /// Capacity of one magazine; zero means the weapon is fed from loose rounds only.
    #[serde(default, deserialize_with = "lenient::count")]
    pub magazine_size: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub rounds_loaded: u32,
    /// Full magazines in reserve, each holding exactly `magazine_size` rounds.
    #[serde(default, deserialize_with = "lenient::count")]
    pub spare_magazines: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub loose_rounds: u32,
    /// Derived. Never read as input; see [`AmmoRecord::derived_total`].
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_rounds: u32,
    #[serde(
        default,
        deserialize_with = "lenient::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The two actions a character can take with a weapon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmmoAction {
    Fire,
    Reload,
}

impl AmmoAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fire => "fire",
            Self::Reload => "reload",
        }
    }
}

impl fmt::Display for AmmoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values submitted through the "add ammunition" form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewAmmo {
    pub weapon: String,
    #[serde(default)]
    pub ammo_type: Option<String>,
    #[serde(default)]
    pub magazine_size: u32,
    #[serde(default)]
    pub rounds_loaded: u32,
    #[serde(default)]
    pub spare_magazines: u32,
    #[serde(default)]
    pub loose_rounds: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmmoError {
    #[error("weapon name must not be blank")]
    BlankWeapon,
    #[error("rounds loaded ({loaded}) exceed magazine size ({capacity})")]
    Overloaded { loaded: u32, capacity: u32 },
}

impl AmmoRecord {
    /// Build a record from the add form, computing the initial total.
    ///
    /// # Errors
    ///
    /// Returns an error if the weapon name is blank or more rounds are loaded
    /// than one magazine holds.
    pub fn from_form(form: NewAmmo) -> Result<Self, AmmoError> {
        let weapon = form.weapon.trim().to_string();
        if weapon.is_empty() {
            return Err(AmmoError::BlankWeapon);
        }
        if form.rounds_loaded > form.magazine_size {
            return Err(AmmoError::Overloaded {
                loaded: form.rounds_loaded,
                capacity: form.magazine_size,
            });
        }
        let record = Self {
            id: None,
            weapon,
            ammo_type: form.ammo_type.filter(|kind| !kind.trim().is_empty()),
            magazine_size: form.magazine_size,
            rounds_loaded: form.rounds_loaded,
            spare_magazines: form.spare_magazines,
            loose_rounds: form.loose_rounds,
            total_rounds: 0,
            notes: form.notes.filter(|notes| !notes.trim().is_empty()),
            extra: Map::new(),
        };
        Ok(record.with_counts(form.rounds_loaded, form.spare_magazines, form.loose_rounds))
    }

    /// `rounds_loaded + spare_magazines * magazine_size + loose_rounds`, saturating.
    #[must_use]
    pub const fn derived_total(&self) -> u32 {
        self.rounds_loaded
            .saturating_add(self.spare_magazines.saturating_mul(self.magazine_size))
            .saturating_add(self.loose_rounds)
    }

    /// Whether the stored total agrees with the formula.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.total_rounds == self.derived_total() && self.rounds_loaded <= self.magazine_size
    }

    /// Clamp the loaded count to capacity and recompute the total.
    ///
    /// Used on anything that arrived from outside the engine (snapshots, bulk edits).
    #[must_use]
    pub fn normalized(&self) -> Self {
        let loaded = self.rounds_loaded.min(self.magazine_size);
        self.with_counts(loaded, self.spare_magazines, self.loose_rounds)
    }

    /// Whether [`fire_round`] would consume a round.
    #[must_use]
    pub const fn can_fire(&self) -> bool {
        self.rounds_loaded > 0
            || self.spare_magazines > 0
            || (self.loose_rounds > 0 && self.magazine_size > 0)
    }

    /// Whether [`reload_weapon`] would change anything.
    #[must_use]
    pub const fn can_reload(&self) -> bool {
        self.rounds_loaded < self.magazine_size
            && (self.spare_magazines > 0 || self.loose_rounds > 0)
    }

    /// The only place the four counters are written, always as one group.
    fn with_counts(&self, loaded: u32, spares: u32, loose: u32) -> Self {
        let mut next = self.clone();
        next.rounds_loaded = loaded;
        next.spare_magazines = spares;
        next.loose_rounds = loose;
        next.total_rounds = next.derived_total();
        next
    }
}

/// Fire one round.
///
/// Priority: loaded rounds, then a fresh spare magazine, then loose rounds
/// loaded into the empty magazine. With nothing reachable the record comes
/// back unchanged.
#[must_use]
pub fn fire_round(record: &AmmoRecord) -> AmmoRecord {
    let capacity = record.magazine_size;
    if record.rounds_loaded > 0 {
        record.with_counts(
            record.rounds_loaded - 1,
            record.spare_magazines,
            record.loose_rounds,
        )
    } else if record.spare_magazines > 0 {
        record.with_counts(
            capacity.saturating_sub(1),
            record.spare_magazines - 1,
            record.loose_rounds,
        )
    } else if record.loose_rounds > 0 && capacity > 0 {
        let loaded = record.loose_rounds.min(capacity);
        record.with_counts(loaded - 1, 0, record.loose_rounds - loaded)
    } else {
        record.clone()
    }
}

/// Reload the active magazine.
///
/// A spare magazine is swapped in whole (rounds left in the old one are
/// dropped); otherwise the magazine is topped off from loose rounds. Already
/// full or nothing to load from is a no-op.
#[must_use]
pub fn reload_weapon(record: &AmmoRecord) -> AmmoRecord {
    let capacity = record.magazine_size;
    if record.rounds_loaded >= capacity {
        return record.clone();
    }
    if record.spare_magazines > 0 {
        record.with_counts(capacity, record.spare_magazines - 1, record.loose_rounds)
    } else if record.loose_rounds > 0 {
        let to_load = record.loose_rounds.min(capacity - record.rounds_loaded);
        record.with_counts(
            record.rounds_loaded + to_load,
            record.spare_magazines,
            record.loose_rounds - to_load,
        )
    } else {
        record.clone()
    }
}

#[must_use]
pub fn apply_action(record: &AmmoRecord, action: AmmoAction) -> AmmoRecord {
    match action {
        AmmoAction::Fire => fire_round(record),
        AmmoAction::Reload => reload_weapon(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(capacity: u32, loaded: u32, spares: u32, loose: u32) -> AmmoRecord {
        AmmoRecord {
            weapon: "Gauss Rifle".to_string(),
            magazine_size: capacity,
            rounds_loaded: loaded,
            spare_magazines: spares,
            loose_rounds: loose,
            ..AmmoRecord::default()
        }
        .normalized()
    }

    #[test]
    fn fire_prefers_loaded_rounds() {
        let next = fire_round(&record(10, 4, 2, 7));
        assert_eq!(next.rounds_loaded, 3);
        assert_eq!(next.spare_magazines, 2);
        assert_eq!(next.loose_rounds, 7);
        assert_eq!(next.total_rounds, 30);
    }

    #[test]
    fn fire_swaps_in_spare_before_loose() {
        let next = fire_round(&record(30, 0, 2, 25));
        assert_eq!(next.rounds_loaded, 29);
        assert_eq!(next.spare_magazines, 1);
        assert_eq!(next.loose_rounds, 25);
        assert_eq!(next.total_rounds, 84);
    }

    #[test]
    fn fire_loads_partial_magazine_from_loose() {
        let next = fire_round(&record(10, 0, 0, 4));
        assert_eq!(next.rounds_loaded, 3);
        assert_eq!(next.loose_rounds, 0);
        assert_eq!(next.total_rounds, 3);

        let next = fire_round(&record(10, 0, 0, 25));
        assert_eq!(next.rounds_loaded, 9);
        assert_eq!(next.loose_rounds, 15);
        assert_eq!(next.total_rounds, 24);
    }

    #[test]
    fn fire_without_magazine_cannot_use_loose_rounds() {
        let dry = record(0, 0, 0, 12);
        assert!(!dry.can_fire());
        assert_eq!(fire_round(&dry), dry);
    }

    #[test]
    fn fire_with_zero_capacity_spare_does_not_underflow() {
        let next = fire_round(&record(0, 0, 1, 0));
        assert_eq!(next.rounds_loaded, 0);
        assert_eq!(next.spare_magazines, 0);
        assert_eq!(next.total_rounds, 0);
    }

    #[test]
    fn empty_weapon_fires_as_noop() {
        let empty = record(15, 0, 0, 0);
        assert_eq!(fire_round(&empty), empty);
        assert_eq!(empty.total_rounds, 0);
    }

    #[test]
    fn reload_swaps_full_magazine() {
        let next = reload_weapon(&record(10, 3, 1, 5));
        assert_eq!(next.rounds_loaded, 10);
        assert_eq!(next.spare_magazines, 0);
        assert_eq!(next.loose_rounds, 5);
        assert_eq!(next.total_rounds, 15);
    }

    #[test]
    fn reload_tops_off_from_loose_rounds() {
        let next = reload_weapon(&record(10, 3, 0, 4));
        assert_eq!(next.rounds_loaded, 7);
        assert_eq!(next.loose_rounds, 0);
        assert_eq!(next.total_rounds, 7);

        let next = reload_weapon(&record(10, 3, 0, 40));
        assert_eq!(next.rounds_loaded, 10);
        assert_eq!(next.loose_rounds, 33);
        assert_eq!(next.total_rounds, 43);
    }

    #[test]
    fn reload_when_full_is_noop() {
        let full = record(8, 8, 3, 9);
        assert!(!full.can_reload());
        assert_eq!(reload_weapon(&full), full);
    }

    #[test]
    fn apply_action_dispatches() {
        let base = record(6, 2, 1, 0);
        assert_eq!(apply_action(&base, AmmoAction::Fire), fire_round(&base));
        assert_eq!(apply_action(&base, AmmoAction::Reload), reload_weapon(&base));
        assert_eq!(AmmoAction::Reload.to_string(), "reload");
    }

    #[test]
    fn stale_total_is_recomputed() {
        let stale = AmmoRecord {
            weapon: "Snub Pistol".to_string(),
            magazine_size: 6,
            rounds_loaded: 9,
            spare_magazines: 1,
            loose_rounds: 2,
            total_rounds: 999,
            ..AmmoRecord::default()
        };
        assert!(!stale.is_consistent());
        let fixed = stale.normalized();
        assert_eq!(fixed.rounds_loaded, 6);
        assert_eq!(fixed.total_rounds, 14);
        assert!(fixed.is_consistent());
    }

    #[test]
    fn form_validates_and_computes_total() {
        let record = AmmoRecord::from_form(NewAmmo {
            weapon: "  Autopistol ".to_string(),
            ammo_type: Some(String::new()),
            magazine_size: 15,
            rounds_loaded: 15,
            spare_magazines: 2,
            loose_rounds: 10,
            notes: None,
        })
        .unwrap();
        assert_eq!(record.weapon, "Autopistol");
        assert_eq!(record.ammo_type, None);
        assert_eq!(record.total_rounds, 55);

        let blank = AmmoRecord::from_form(NewAmmo::default());
        assert_eq!(blank, Err(AmmoError::BlankWeapon));

        let overloaded = AmmoRecord::from_form(NewAmmo {
            weapon: "Shotgun".to_string(),
            magazine_size: 6,
            rounds_loaded: 7,
            ..NewAmmo::default()
        });
        assert_eq!(
            overloaded,
            Err(AmmoError::Overloaded {
                loaded: 7,
                capacity: 6
            })
        );
    }

    #[test]
    fn serializes_camel_case_fields() {
        let value = serde_json::to_value(record(30, 0, 2, 25)).unwrap();
        assert_eq!(value["magazineSize"], 30);
        assert_eq!(value["spareMagazines"], 2);
        assert_eq!(value["totalRounds"], 85);
        assert!(value.get("id").is_none());
    }

    #[test]
    fn stored_record_reads_leniently_and_keeps_unknown_fields() {
        let record: AmmoRecord = serde_json::from_value(serde_json::json!({
            "id": 42,
            "weapon": "Gauss Rifle",
            "magazineSize": "40",
            "roundsLoaded": 12.0,
            "spareMagazines": -1,
            "totalRounds": 52,
            "issuedBy": "Quartermaster Vance"
        }))
        .unwrap();
        assert_eq!(record.id.as_deref(), Some("42"));
        assert_eq!(record.magazine_size, 40);
        assert_eq!(record.rounds_loaded, 12);
        assert_eq!(record.spare_magazines, 0);
        assert_eq!(record.extra["issuedBy"], "Quartermaster Vance");

        let value = serde_json::to_value(record.normalized()).unwrap();
        assert_eq!(value["issuedBy"], "Quartermaster Vance");
        assert_eq!(value["totalRounds"], 12);
    }
}
