use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "quartermaster-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn run(data_dir: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_quartermaster-cli");
    Command::new(exe)
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("run cli")
}

fn run_json(data_dir: &Path, args: &[&str]) -> Value {
    let mut full = vec!["--json"];
    full.extend_from_slice(args);
    let output = run(data_dir, &full);
    assert!(
        output.status.success(),
        "{args:?}: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json output")
}

fn add_rifle(data_dir: &Path) {
    run_json(
        data_dir,
        &[
            "add-ammo",
            "--weapon",
            "Gauss Rifle",
            "--magazine-size",
            "40",
            "--loaded",
            "12",
            "--spares",
            "2",
        ],
    );
}

#[test]
fn cli_fire_updates_the_stored_snapshot() {
    let dir = temp_path("fire");
    add_rifle(&dir);

    let fired = run_json(&dir, &["fire", "--times", "3"]);
    assert_eq!(fired["roundsLoaded"], 9);
    assert_eq!(fired["totalRounds"], 89);

    let reloaded = run_json(&dir, &["reload"]);
    assert_eq!(reloaded["roundsLoaded"], 40);
    assert_eq!(reloaded["spareMagazines"], 1);

    let state = run_json(&dir, &["show"]);
    assert_eq!(state["PartyAmmo"][0]["weapon"], "Gauss Rifle");
    assert_eq!(state["PartyAmmo"][0]["roundsLoaded"], 40);
    assert!(state["PCs"]["Alice"]["Ammo"].is_array());
}

#[test]
fn cli_reports_unknown_character() {
    let dir = temp_path("unknown");
    let output = run(&dir, &["fire", "--character", "Nobody"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Nobody"));
}

#[test]
fn cli_repair_rewrites_garbage_snapshot() {
    let dir = temp_path("repair");
    std::fs::create_dir_all(&dir).expect("create data dir");
    let slot = dir.join("campaign.state.json");
    std::fs::write(&slot, "not json{").expect("write garbage");

    let report = run_json(&dir, &["repair", "--dry-run"]);
    assert_eq!(report["source"], "unparsable");
    assert_eq!(std::fs::read_to_string(&slot).expect("slot"), "not json{");

    run_json(&dir, &["repair"]);
    let repaired: Value =
        serde_json::from_str(&std::fs::read_to_string(&slot).expect("slot")).expect("json slot");
    assert!(repaired["PCs"]["Alice"]["Weapons"].is_array());

    let output = run(&dir, &["repair"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("snapshot is canonical"));
}

#[test]
fn cli_sync_delivers_after_offline_attempt() {
    let dir = temp_path("sync");
    add_rifle(&dir);

    let offline = run_json(&dir, &["sync", "--offline"]);
    assert_eq!(offline["delivered"].as_array().map(Vec::len), Some(0));
    assert_eq!(run_json(&dir, &["outbox"]).as_array().map(Vec::len), Some(1));

    let online = run_json(&dir, &["sync"]);
    assert_eq!(online["delivered"].as_array().map(Vec::len), Some(1));
    assert_eq!(run_json(&dir, &["outbox"]).as_array().map(Vec::len), Some(0));

    let state = run_json(&dir, &["show"]);
    assert_eq!(state["PartyAmmo"][0]["id"], "1");
    assert!(dir.join("remote.json").exists());
}

#[test]
fn cli_finance_on_empty_campaign() {
    let dir = temp_path("finance");
    let output = run(&dir, &["finance"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Finance overview"));
}
