mod reports;
mod store;

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use quartermaster_core::{AmmoAction, AmmoOwner, CampaignConfig, CampaignEngine, NewAmmo};
use std::io::{Write, stdout};
use std::path::PathBuf;

use store::{FileRepository, FileStore};

const REMOTE_FILE: &str = "remote.json";

#[derive(Debug, Parser)]
#[command(name = "quartermaster-cli", version)]
#[command(about = "Campaign bookkeeping: ammunition, finances and snapshot maintenance")]
struct Args {
    /// Directory holding the snapshot slots and the remote stand-in
    #[arg(long, global = true, default_value = "quartermaster-data")]
    data_dir: PathBuf,

    /// Optional JSON configuration file (roster, storage key, outbox policy)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of console tables
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, ClapArgs)]
struct OwnerArgs {
    /// Character whose ammo list to use; the shared party pool when omitted
    #[arg(long, short)]
    character: Option<String>,
}

impl OwnerArgs {
    fn owner(&self) -> AmmoOwner {
        self.character
            .as_ref()
            .map_or(AmmoOwner::Party, |name| AmmoOwner::character(name.clone()))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show ammunition for everyone, or one owner
    Show {
        #[command(flatten)]
        owner: OwnerArgs,
        /// Show every owner even when --character is given
        #[arg(long)]
        all: bool,
    },
    /// List the characters in the campaign
    Roster,
    /// Fire rounds from a weapon
    Fire {
        #[command(flatten)]
        owner: OwnerArgs,
        /// Position of the record in the owner's ammo list
        #[arg(long, short, default_value_t = 0)]
        index: usize,
        /// Number of rounds to fire
        #[arg(long, default_value_t = 1)]
        times: u32,
    },
    /// Reload a weapon from spare magazines or loose rounds
    Reload {
        #[command(flatten)]
        owner: OwnerArgs,
        #[arg(long, short, default_value_t = 0)]
        index: usize,
    },
    /// Add an ammunition record
    AddAmmo {
        #[command(flatten)]
        owner: OwnerArgs,
        #[arg(long)]
        weapon: String,
        #[arg(long)]
        ammo_type: Option<String>,
        #[arg(long, default_value_t = 0)]
        magazine_size: u32,
        #[arg(long, default_value_t = 0)]
        loaded: u32,
        #[arg(long, default_value_t = 0)]
        spares: u32,
        #[arg(long, default_value_t = 0)]
        loose: u32,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove an ammunition record
    RemoveAmmo {
        #[command(flatten)]
        owner: OwnerArgs,
        #[arg(long, short)]
        index: usize,
    },
    /// Load, repair and rewrite the stored snapshot
    Repair {
        /// Report repairs without writing the repaired snapshot
        #[arg(long)]
        dry_run: bool,
    },
    /// Summarize ledgers, cargo, maintenance and loans
    Finance,
    /// List remote writes waiting in the outbox
    Outbox,
    /// Deliver queued writes to the remote store
    Sync {
        /// Simulate an unreachable remote store
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_ref())?;
    let store = FileStore::open(&args.data_dir)
        .with_context(|| format!("opening data directory {}", args.data_dir.display()))?;
    let mut engine = CampaignEngine::open(store, config);
    let mut out = stdout().lock();

    match &args.command {
        Command::Show { owner, all } => {
            let only = owner
                .character
                .as_ref()
                .filter(|_| !*all)
                .map(|_| owner.owner());
            if let Some(owner) = only.as_ref() {
                engine.ammo(owner)?;
            }
            if args.json {
                emit_json(&mut out, engine.state())?;
            } else {
                reports::write_state(&mut out, engine.state(), only.as_ref())?;
            }
        }
        Command::Roster => reports::write_roster(&mut out, engine.state())?,
        Command::Fire {
            owner,
            index,
            times,
        } => {
            let owner = owner.owner();
            let mut record = engine.ammo(&owner)?.get(*index).cloned();
            for _ in 0..*times {
                let before = engine.ammo(&owner)?.get(*index).cloned();
                let next = engine.act(&owner, *index, AmmoAction::Fire)?;
                if before.as_ref() == Some(&next) {
                    writeln!(out, "{}", "*click* nothing left to fire".yellow())?;
                    break;
                }
                record = Some(next);
            }
            report_record(&mut out, args.json, *index, record.as_ref())?;
        }
        Command::Reload { owner, index } => {
            let owner = owner.owner();
            let record = engine.reload(&owner, *index)?;
            report_record(&mut out, args.json, *index, Some(&record))?;
        }
        Command::AddAmmo {
            owner,
            weapon,
            ammo_type,
            magazine_size,
            loaded,
            spares,
            loose,
            notes,
        } => {
            let owner = owner.owner();
            let form = NewAmmo {
                weapon: weapon.clone(),
                ammo_type: ammo_type.clone(),
                magazine_size: *magazine_size,
                rounds_loaded: *loaded,
                spare_magazines: *spares,
                loose_rounds: *loose,
                notes: notes.clone(),
            };
            if let AmmoOwner::Character(name) = &owner
                && engine
                    .state()
                    .character(name)
                    .is_some_and(|sheet| !sheet.weapons.is_empty() && !sheet.owns_weapon(weapon))
            {
                log::info!("{weapon} is not among {name}'s weapons; recording as a custom weapon");
            }
            let index = engine.add_ammo(&owner, form)?;
            let record = engine.ammo(&owner)?.get(index).cloned();
            report_record(&mut out, args.json, index, record.as_ref())?;
        }
        Command::RemoveAmmo { owner, index } => {
            let owner = owner.owner();
            let removed = engine.remove_ammo(&owner, *index)?;
            if args.json {
                emit_json(&mut out, &removed)?;
            } else {
                writeln!(out, "Removed {} from {owner}", removed.weapon.bold())?;
            }
        }
        Command::Repair { dry_run } => {
            if args.json {
                emit_json(&mut out, engine.repair_report())?;
            } else {
                reports::write_repair_report(&mut out, engine.repair_report())?;
            }
            if !*dry_run {
                engine.save().context("writing repaired snapshot")?;
                log::info!("repaired snapshot written to {}", engine.store().root().display());
            }
        }
        Command::Finance => {
            let overview = engine.state().finance_overview();
            if args.json {
                emit_json(&mut out, &overview)?;
            } else {
                reports::write_finance(&mut out, &overview)?;
            }
        }
        Command::Outbox => {
            if args.json {
                emit_json(&mut out, engine.outbox().entries())?;
            } else {
                reports::write_outbox(&mut out, engine.outbox())?;
            }
        }
        Command::Sync { offline } => {
            let repo = FileRepository::new(args.data_dir.join(REMOTE_FILE)).offline(*offline);
            let report = engine.sync(&repo).await?;
            if args.json {
                emit_json(&mut out, &report)?;
            } else {
                reports::write_flush_report(&mut out, &report)?;
            }
        }
    }

    out.flush()?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<CampaignConfig> {
    let Some(path) = path else {
        return Ok(CampaignConfig::default_config());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = CampaignConfig::from_json(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    if config.storage_key.trim().is_empty() {
        bail!("config {} has an empty storage_key", path.display());
    }
    Ok(config)
}

fn emit_json<T>(out: &mut impl Write, value: &T) -> Result<()>
where
    T: serde::Serialize + ?Sized,
{
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn report_record(
    out: &mut impl Write,
    json: bool,
    index: usize,
    record: Option<&quartermaster_core::AmmoRecord>,
) -> Result<()> {
    let Some(record) = record else {
        return Ok(());
    };
    if json {
        emit_json(out, record)
    } else {
        writeln!(out, "{}", reports::ammo_line(index, record))?;
        Ok(())
    }
}
