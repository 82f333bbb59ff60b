use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::ammo::AmmoRecord;
use crate::lenient::present;
use crate::repository::OwnerId;

/// Key under which characters are stored in the snapshot.
pub type DisplayName = String;

/// Party members seeded into a fresh campaign.
pub const DEFAULT_ROSTER: [&str; 4] = ["Alice", "Brannoc", "Corvina", "Dex"];

/// A stored row. Rows that do not read as `T` are carried verbatim, so
/// loading and saving never loses them; they just take no part in summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stored<T> {
    Typed(T),
    Raw(Value),
}

impl<T> Stored<T> {
    #[must_use]
    pub const fn typed(&self) -> Option<&T> {
        match self {
            Self::Typed(row) => Some(row),
            Self::Raw(_) => None,
        }
    }
}

impl<T> From<T> for Stored<T> {
    fn from(row: T) -> Self {
        Self::Typed(row)
    }
}

/// A number exactly as the store wrote it: integer, float or numeric text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(Number),
    Text(String),
}

impl Amount {
    /// Rounded to whole credits. Text that is not a number reads as zero.
    #[must_use]
    pub fn whole(&self) -> i64 {
        match self {
            Self::Number(number) => number
                .as_i64()
                .unwrap_or_else(|| round_credits(number.as_f64().unwrap_or(0.0))),
            Self::Text(text) => {
                let text = text.trim();
                text.parse::<i64>()
                    .unwrap_or_else(|_| round_credits(text.parse::<f64>().unwrap_or(0.0)))
            }
        }
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn round_credits(value: f64) -> i64 {
    // `as` saturates at the bounds and maps NaN to zero.
    value.round() as i64
}

fn credits_of(amount: Option<&Amount>) -> i64 {
    amount.map_or(0, Amount::whole)
}

/// A signed credit movement; positive amounts are income.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FinanceEntry {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FinanceEntry {
    #[must_use]
    pub fn credits(&self) -> i64 {
        credits_of(self.amount.as_ref())
    }
}

/// One speculative cargo run between two worlds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CargoLeg {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub cargo: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub tons: Option<Amount>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<Amount>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Amount>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CargoLeg {
    /// Sale minus purchase; negative for a loss or an unsold leg.
    #[must_use]
    pub fn profit(&self) -> i64 {
        credits_of(self.sale_price.as_ref())
            .saturating_sub(credits_of(self.purchase_price.as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceEntry {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub cost: Option<Amount>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MaintenanceEntry {
    #[must_use]
    pub fn credits(&self) -> i64 {
        credits_of(self.cost.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub lender: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub principal: Option<Amount>,
    /// Amount still owed.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub balance: Option<Amount>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub interest_rate_pct: Option<Amount>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Loan {
    /// Amount still owed; a paid-off or overpaid loan owes nothing.
    #[must_use]
    pub fn outstanding(&self) -> i64 {
        credits_of(self.balance.as_ref()).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Amount>,
    /// Unit value in credits.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub value: Option<Amount>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Weapon {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub damage: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Armour {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub protection: Option<Amount>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-character collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CharacterSheet {
    #[serde(rename = "Finance", default)]
    pub finance: Vec<Stored<FinanceEntry>>,
    #[serde(rename = "Inventory", default)]
    pub inventory: Vec<Stored<InventoryItem>>,
    #[serde(rename = "Weapons", default)]
    pub weapons: Vec<Stored<Weapon>>,
    #[serde(rename = "Armour", default)]
    pub armour: Vec<Stored<Armour>>,
    #[serde(rename = "Ammo", default)]
    pub ammo: Vec<AmmoRecord>,
}

impl CharacterSheet {
    /// Snapshot keys of the five sheet collections.
    pub const COLLECTIONS: [&'static str; 5] = ["Finance", "Inventory", "Weapons", "Armour", "Ammo"];

    /// Whether `name` is one of the owned weapons; ammo may still name a custom weapon.
    #[must_use]
    pub fn owns_weapon(&self, name: &str) -> bool {
        self.weapons
            .iter()
            .filter_map(Stored::typed)
            .filter_map(|weapon| weapon.name.as_deref())
            .any(|owned| owned.eq_ignore_ascii_case(name.trim()))
    }
}

/// Root of the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CampaignState {
    #[serde(rename = "PartyFinance", default)]
    pub party_finance: Vec<Stored<FinanceEntry>>,
    #[serde(rename = "ShipFinance", default)]
    pub ship_finance: Vec<Stored<FinanceEntry>>,
    #[serde(rename = "Cargo", default)]
    pub cargo: Vec<Stored<CargoLeg>>,
    #[serde(rename = "Maintenance", default)]
    pub maintenance: Vec<Stored<MaintenanceEntry>>,
    #[serde(rename = "Loans", default)]
    pub loans: Vec<Stored<Loan>>,
    #[serde(rename = "PartyInventory", default)]
    pub party_inventory: Vec<Stored<InventoryItem>>,
    #[serde(rename = "PartyAmmo", default)]
    pub party_ammo: Vec<AmmoRecord>,
    #[serde(rename = "PCs", default)]
    pub characters: BTreeMap<DisplayName, CharacterSheet>,
}

impl CampaignState {
    /// Snapshot keys of the seven top-level collections.
    pub const COLLECTIONS: [&'static str; 7] = [
        "PartyFinance",
        "ShipFinance",
        "Cargo",
        "Maintenance",
        "Loans",
        "PartyInventory",
        "PartyAmmo",
    ];

    /// Snapshot key of the character map.
    pub const CHARACTERS_KEY: &'static str = "PCs";

    /// Empty collections with one empty sheet per roster name.
    #[must_use]
    pub fn with_roster<I, S>(roster: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DisplayName>,
    {
        let characters = roster
            .into_iter()
            .map(|name| (name.into(), CharacterSheet::default()))
            .collect();
        Self {
            characters,
            ..Self::default()
        }
    }

    /// The compiled-in default state.
    #[must_use]
    pub fn default_state() -> Self {
        Self::with_roster(DEFAULT_ROSTER)
    }

    #[must_use]
    pub fn character(&self, name: &str) -> Option<&CharacterSheet> {
        self.characters.get(name)
    }

    pub fn character_mut(&mut self, name: &str) -> Option<&mut CharacterSheet> {
        self.characters.get_mut(name)
    }

    /// The ammo list an owner addresses, if that owner exists.
    #[must_use]
    pub fn ammo(&self, owner: &AmmoOwner) -> Option<&[AmmoRecord]> {
        match owner {
            AmmoOwner::Party => Some(self.party_ammo.as_slice()),
            AmmoOwner::Character(name) => self.character(name).map(|sheet| sheet.ammo.as_slice()),
        }
    }

    /// Replace an owner's ammo list wholesale. Returns `false` for an unknown character.
    pub fn replace_ammo(&mut self, owner: &AmmoOwner, list: Vec<AmmoRecord>) -> bool {
        match owner {
            AmmoOwner::Party => {
                self.party_ammo = list;
                true
            }
            AmmoOwner::Character(name) => match self.character_mut(name) {
                Some(sheet) => {
                    sheet.ammo = list;
                    true
                }
                None => false,
            },
        }
    }

    /// Every ammo record in the campaign with its owner.
    pub fn all_ammo(&self) -> impl Iterator<Item = (AmmoOwner, &AmmoRecord)> {
        let party = self
            .party_ammo
            .iter()
            .map(|record| (AmmoOwner::Party, record));
        let characters = self.characters.iter().flat_map(|(name, sheet)| {
            sheet
                .ammo
                .iter()
                .map(move |record| (AmmoOwner::Character(name.clone()), record))
        });
        party.chain(characters)
    }

    /// Bring every ammo record back in line with its derived total.
    pub fn normalize_ammo(&mut self) {
        for record in &mut self.party_ammo {
            *record = record.normalized();
        }
        for sheet in self.characters.values_mut() {
            for record in &mut sheet.ammo {
                *record = record.normalized();
            }
        }
    }
}

/// Which ammo list an engine call addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum AmmoOwner {
    /// The shared party pool.
    Party,
    Character(DisplayName),
}

impl AmmoOwner {
    #[must_use]
    pub fn character(name: impl Into<DisplayName>) -> Self {
        Self::Character(name.into())
    }

    /// The remote owner this list syncs against.
    #[must_use]
    pub fn remote(&self) -> OwnerId {
        match self {
            Self::Party => OwnerId::Campaign,
            Self::Character(name) => OwnerId::Character(name.clone()),
        }
    }
}

impl fmt::Display for AmmoOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Party => f.write_str("party pool"),
            Self::Character(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rifle(loaded: u32) -> AmmoRecord {
        AmmoRecord {
            weapon: "Rifle".to_string(),
            magazine_size: 20,
            rounds_loaded: loaded,
            ..AmmoRecord::default()
        }
        .normalized()
    }

    #[test]
    fn default_state_seeds_roster_with_empty_sheets() {
        let state = CampaignState::default_state();
        assert_eq!(state.characters.len(), DEFAULT_ROSTER.len());
        for name in DEFAULT_ROSTER {
            assert_eq!(state.character(name), Some(&CharacterSheet::default()));
        }
        assert!(state.party_finance.is_empty());
        assert!(state.party_ammo.is_empty());
    }

    #[test]
    fn serializes_with_snapshot_keys() {
        let state = CampaignState::with_roster(["Alice"]);
        let value = serde_json::to_value(&state).unwrap();
        for key in CampaignState::COLLECTIONS {
            assert_eq!(value[key], serde_json::json!([]), "{key}");
        }
        for key in CharacterSheet::COLLECTIONS {
            assert_eq!(value["PCs"]["Alice"][key], serde_json::json!([]), "{key}");
        }
    }

    #[test]
    fn replace_ammo_addresses_owner() {
        let mut state = CampaignState::with_roster(["Alice"]);
        assert!(state.replace_ammo(&AmmoOwner::Party, vec![rifle(3)]));
        assert!(state.replace_ammo(&AmmoOwner::character("Alice"), vec![rifle(5), rifle(6)]));
        assert!(!state.replace_ammo(&AmmoOwner::character("Nobody"), vec![rifle(1)]));

        assert_eq!(state.ammo(&AmmoOwner::Party).map(<[_]>::len), Some(1));
        assert_eq!(state.ammo(&AmmoOwner::character("Alice")).map(<[_]>::len), Some(2));
        assert!(state.ammo(&AmmoOwner::character("Nobody")).is_none());
        assert_eq!(state.all_ammo().count(), 3);
    }

    #[test]
    fn normalize_rewrites_stale_totals() {
        let mut state = CampaignState::with_roster(["Alice"]);
        let mut stale = rifle(4);
        stale.total_rounds = 1_000;
        state.party_ammo.push(stale.clone());
        state.characters.get_mut("Alice").unwrap().ammo.push(stale);
        state.normalize_ammo();
        assert!(state.all_ammo().all(|(_, record)| record.total_rounds == 4));
    }

    #[test]
    fn cargo_profit_and_weapon_lookup() {
        let leg = CargoLeg {
            purchase_price: Some(Amount::from(12_000)),
            sale_price: Some(Amount::Text("19500.4".to_string())),
            ..CargoLeg::default()
        };
        assert_eq!(leg.profit(), 7_500);

        let sheet = CharacterSheet {
            weapons: vec![
                Stored::Raw(serde_json::json!("scrawled note")),
                Weapon {
                    name: Some("Cutlass".to_string()),
                    ..Weapon::default()
                }
                .into(),
            ],
            ..CharacterSheet::default()
        };
        assert!(sheet.owns_weapon(" cutlass"));
        assert!(!sheet.owns_weapon("Laser Pistol"));
    }

    #[test]
    fn cargo_profit_saturates_on_extreme_prices() {
        let leg = CargoLeg {
            purchase_price: Some(Amount::from(-1)),
            sale_price: Some(Amount::from(i64::MAX)),
            ..CargoLeg::default()
        };
        assert_eq!(leg.profit(), i64::MAX);

        let leg = CargoLeg {
            purchase_price: Some(Amount::from(i64::MAX)),
            sale_price: Some(Amount::from(i64::MIN)),
            ..CargoLeg::default()
        };
        assert_eq!(leg.profit(), i64::MIN);
    }

    #[test]
    fn amounts_read_store_shapes() {
        let parse = |raw: &str| serde_json::from_str::<Amount>(raw).unwrap().whole();
        assert_eq!(parse("12"), 12);
        assert_eq!(parse("12.5"), 13);
        assert_eq!(parse("\"-40\""), -40);
        assert_eq!(parse("\"n/a\""), 0);
        assert_eq!(parse("1e300"), i64::MAX);
    }

    #[test]
    fn rows_keep_every_stored_field() {
        let raw = r#"[{"description":"Tip","amount":3,"paidBy":"Bo"},{"amount":null},7]"#;
        let rows: Vec<Stored<FinanceEntry>> = serde_json::from_str(raw).unwrap();
        assert_eq!(rows[0].typed().map(FinanceEntry::credits), Some(3));
        assert!(rows[1].typed().is_none());
        assert!(rows[2].typed().is_none());
        assert_eq!(serde_json::to_string(&rows).unwrap(), raw);
    }
}
