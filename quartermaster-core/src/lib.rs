//! Quartermaster Core
//!
//! Platform-agnostic bookkeeping for a tabletop campaign: party and ship
//! ledgers, cargo, inventory, and the weapon ammunition engine, plus the
//! snapshot load/repair layer and the outbox that syncs local changes to a
//! remote store. No UI or platform-specific dependencies.

pub mod ammo;
pub mod config;
pub mod engine;
pub mod finance;
mod lenient;
pub mod loader;
pub mod repository;
pub mod state;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use ammo::{AmmoAction, AmmoError, AmmoRecord, NewAmmo, apply_action, fire_round, reload_weapon};
pub use config::CampaignConfig;
pub use engine::{CampaignEngine, LedgerError};
pub use finance::{FinanceOverview, LedgerSummary, summarize};
pub use loader::{
    Repair, RepairReport, Repaired, SaveError, SnapshotSource, load_from_store, load_state,
    load_state_with, repair_snapshot, save_state,
};
pub use repository::{
    Aggregate, CampaignRepository, MemoryRepository, OwnerId, RepositoryError, Row, RowId,
};
pub use state::{
    Amount, AmmoOwner, Armour, CampaignState, CargoLeg, CharacterSheet, DEFAULT_ROSTER, DisplayName,
    FinanceEntry, InventoryItem, Loan, MaintenanceEntry, Stored, Weapon,
};
pub use storage::{DEFAULT_STORAGE_KEY, MemoryStore, MemoryStoreError, SnapshotStore};
pub use sync::{FlushReport, OutboxPolicy, PendingWrite, SyncOutbox, WriteOp, flush};
