use quartermaster_core::{
    AmmoRecord, CampaignState, CargoLeg, CharacterSheet, DEFAULT_ROSTER, SnapshotSource, load_state,
    repair_snapshot,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde_json::{Map, Value, json};

const FULL_SNAPSHOT: &str = r#"{
  "PartyFinance": [{"date": "1105-012", "description": "Patron advance", "category": "income", "amount": 25000}],
  "ShipFinance": [{"date": "1105-013", "description": "Berthing", "amount": -100}],
  "Cargo": [{"origin": "Regina", "destination": "Roup", "cargo": "Textiles", "tons": 12, "purchasePrice": 36000, "salePrice": 51000}],
  "Maintenance": [{"date": "1105-020", "description": "Annual overhaul", "cost": 18000}],
  "Loans": [{"lender": "Imperial Bank", "principal": 900000, "balance": 850000, "interestRatePct": 2.5}],
  "PartyInventory": [{"name": "Vacc suit", "quantity": 4, "value": 10000}],
  "PartyAmmo": [{"weapon": "Turret laser", "magazineSize": 0, "looseRounds": 0, "totalRounds": 0}],
  "PCs": {
    "Alice": {
      "Finance": [],
      "Inventory": [{"name": "Medkit", "quantity": 1}],
      "Weapons": [{"name": "Gauss Rifle", "damage": "4D", "range": "Long"}],
      "Armour": [{"name": "Cloth", "protection": 8}],
      "Ammo": [{"weapon": "Gauss Rifle", "ammoType": "AP", "magazineSize": 40, "roundsLoaded": 12, "spareMagazines": 2, "looseRounds": 0, "totalRounds": 92}]
    }
  }
}"#;

#[test]
fn scenario_d_missing_sheet_collections_are_filled() {
    let state = load_state(Some(r#"{"PCs": {"Alice": {"Finance": [], "Inventory": []}}}"#));
    let alice = state.character("Alice").expect("Alice kept");
    assert!(alice.weapons.is_empty());
    assert!(alice.armour.is_empty());
    assert!(alice.ammo.is_empty());
    let value = serde_json::to_value(&state).unwrap();
    assert_eq!(value["PCs"]["Alice"]["Weapons"], json!([]));
    assert_eq!(value["PCs"]["Alice"]["Armour"], json!([]));
    assert_eq!(value["PCs"]["Alice"]["Ammo"], json!([]));
}

#[test]
fn scenario_e_garbage_yields_exact_default() {
    assert_eq!(load_state(Some("not json{")), CampaignState::default_state());
    assert_eq!(load_state(None), CampaignState::default_state());
}

#[test]
fn full_snapshot_loads_without_repairs() {
    let repaired = repair_snapshot(Some(FULL_SNAPSHOT), &DEFAULT_ROSTER);
    assert!(repaired.report.is_clean(), "{:?}", repaired.report.repairs);
    let state = repaired.state;
    assert_eq!(state.cargo[0].typed().map(CargoLeg::profit), Some(15_000));
    assert_eq!(state.characters.len(), 1);
    let ammo: &AmmoRecord = &state.character("Alice").unwrap().ammo[0];
    assert_eq!(ammo.ammo_type.as_deref(), Some("AP"));
    assert_eq!(ammo.total_rounds, 92);
    assert_eq!(state.finance_overview().debt, 850_000);
}

#[test]
fn loading_is_idempotent() {
    let inputs = [
        None,
        Some("{}"),
        Some(FULL_SNAPSHOT),
        Some(r#"{"PCs": {"Alice": 1, "Bo": {"Ammo": [{"weapon": "x", "magazineSize": 2, "roundsLoaded": 9}]}}}"#),
        Some(r#"{"Loans": {"not": "a list"}, "PCs": []}"#),
    ];
    for raw in inputs {
        let first = load_state(raw);
        let encoded = serde_json::to_string(&first).unwrap();
        let second = repair_snapshot(Some(&encoded), &DEFAULT_ROSTER);
        assert_eq!(second.state, first, "{raw:?}");
        assert!(second.report.is_clean(), "{raw:?}: {:?}", second.report.repairs);
    }
}

#[test]
fn truncated_snapshots_fall_back_to_default() {
    for cut in (0..FULL_SNAPSHOT.len() - 1).step_by(7) {
        let Some(prefix) = FULL_SNAPSHOT.get(..cut) else {
            continue;
        };
        let repaired = repair_snapshot(Some(prefix), &DEFAULT_ROSTER);
        assert_eq!(repaired.report.source, SnapshotSource::Unparsable, "cut at {cut}");
        assert_eq!(repaired.state, CampaignState::default_state());
    }
}

fn random_value(rng: &mut ChaCha20Rng, depth: u32) -> Value {
    let pick = if depth == 0 { rng.gen_range(0..4) } else { rng.gen_range(0..6) };
    match pick {
        0 => Value::Null,
        1 => Value::Bool(rng.gen_bool(0.5)),
        2 => json!(rng.gen_range(-50i64..500)),
        3 => Value::String(["", "x", "Rifle", "12"][rng.gen_range(0..4)].to_string()),
        4 => Value::Array(
            (0..rng.gen_range(0..4))
                .map(|_| random_value(rng, depth - 1))
                .collect(),
        ),
        _ => {
            let keys = [
                "weapon",
                "magazineSize",
                "roundsLoaded",
                "looseRounds",
                "name",
                "amount",
                "Ammo",
                "Finance",
            ];
            let mut map = Map::new();
            for _ in 0..rng.gen_range(0..4) {
                let key = keys[rng.gen_range(0..keys.len())];
                map.insert(key.to_string(), random_value(rng, depth - 1));
            }
            Value::Object(map)
        }
    }
}

#[test]
fn random_shapes_always_yield_complete_sheets() {
    let mut rng = ChaCha20Rng::seed_from_u64(0x5EED);
    let top_keys = CampaignState::COLLECTIONS;
    for _ in 0..300 {
        let mut root = Map::new();
        for key in top_keys {
            if rng.gen_bool(0.5) {
                root.insert(key.to_string(), random_value(&mut rng, 2));
            }
        }
        let mut characters = Map::new();
        for name in ["Alice", "Bo", "Cy"] {
            if rng.gen_bool(0.6) {
                let mut sheet = Map::new();
                for key in CharacterSheet::COLLECTIONS {
                    if rng.gen_bool(0.5) {
                        sheet.insert(key.to_string(), random_value(&mut rng, 2));
                    }
                }
                let entry = if rng.gen_bool(0.9) {
                    Value::Object(sheet)
                } else {
                    random_value(&mut rng, 1)
                };
                characters.insert(name.to_string(), entry);
            }
        }
        root.insert("PCs".to_string(), Value::Object(characters.clone()));
        let raw = Value::Object(root).to_string();

        let repaired = repair_snapshot(Some(&raw), &DEFAULT_ROSTER);
        assert_eq!(repaired.report.source, SnapshotSource::Parsed);
        let value = serde_json::to_value(&repaired.state).unwrap();
        for key in top_keys {
            assert!(value[key].is_array(), "{key} in {raw}");
        }
        for name in characters.keys() {
            for key in CharacterSheet::COLLECTIONS {
                assert!(value["PCs"][name][key].is_array(), "{name}.{key} in {raw}");
            }
        }
        assert_eq!(repaired.state.characters.len(), characters.len());
        assert!(repaired.state.all_ammo().all(|(_, record)| record.is_consistent()));
    }
}
