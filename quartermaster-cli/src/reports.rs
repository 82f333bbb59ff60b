use colored::Colorize;
use quartermaster_core::{
    AmmoOwner, AmmoRecord, CampaignState, FinanceOverview, FlushReport, LedgerSummary,
    RepairReport, SyncOutbox,
};
use std::io::Write;

pub fn write_ammo_table(
    out: &mut impl Write,
    owner: &AmmoOwner,
    records: &[AmmoRecord],
) -> std::io::Result<()> {
    writeln!(out, "{}", format!("🔫 {owner}").bright_cyan().bold())?;
    if records.is_empty() {
        writeln!(out, "   (no ammunition)")?;
        return Ok(());
    }
    for (index, record) in records.iter().enumerate() {
        writeln!(out, "   {}", ammo_line(index, record))?;
    }
    Ok(())
}

pub fn ammo_line(index: usize, record: &AmmoRecord) -> String {
    let ammo_type = record
        .ammo_type
        .as_deref()
        .map(|kind| format!(" [{kind}]"))
        .unwrap_or_default();
    let total = if record.total_rounds == 0 {
        record.total_rounds.to_string().red()
    } else {
        record.total_rounds.to_string().green()
    };
    format!(
        "#{index} {}{ammo_type}: {}/{} loaded, {} spare mags, {} loose, {total} total",
        record.weapon.bold(),
        record.rounds_loaded,
        record.magazine_size,
        record.spare_magazines,
        record.loose_rounds,
    )
}

pub fn write_state(
    out: &mut impl Write,
    state: &CampaignState,
    only: Option<&AmmoOwner>,
) -> std::io::Result<()> {
    if let Some(owner) = only {
        let records = state.ammo(owner).unwrap_or_default();
        return write_ammo_table(out, owner, records);
    }
    write_ammo_table(out, &AmmoOwner::Party, &state.party_ammo)?;
    for (name, sheet) in &state.characters {
        write_ammo_table(out, &AmmoOwner::character(name.clone()), &sheet.ammo)?;
    }
    Ok(())
}

pub fn write_roster(out: &mut impl Write, state: &CampaignState) -> std::io::Result<()> {
    writeln!(out, "{}", "👥 Party roster".bright_cyan().bold())?;
    for (name, sheet) in &state.characters {
        writeln!(
            out,
            "   {:20} {} weapons, {} armour, {} items, {} ammo records, {} ledger entries",
            name,
            sheet.weapons.len(),
            sheet.armour.len(),
            sheet.inventory.len(),
            sheet.ammo.len(),
            sheet.finance.len()
        )?;
    }
    Ok(())
}

fn ledger_line(label: &str, summary: &LedgerSummary) -> String {
    let balance = if summary.balance < 0 {
        summary.balance.to_string().red()
    } else {
        summary.balance.to_string().green()
    };
    format!(
        "{label:14} {balance} Cr (income {}, expenses {}, {} entries)",
        summary.income, summary.expenses, summary.entries
    )
}

pub fn write_finance(out: &mut impl Write, overview: &FinanceOverview) -> std::io::Result<()> {
    writeln!(out, "{}", "💰 Finance overview".bright_cyan().bold())?;
    writeln!(out, "{}", "===================".cyan())?;
    writeln!(out, "{}", ledger_line("Party ledger:", &overview.party))?;
    writeln!(out, "{}", ledger_line("Ship ledger:", &overview.ship))?;
    writeln!(out, "{:14} {} Cr", "Cargo profit:", overview.cargo_profit)?;
    writeln!(out, "{:14} {} Cr", "Maintenance:", overview.maintenance)?;
    writeln!(out, "{:14} {} Cr", "Debt:", overview.debt)?;
    Ok(())
}

pub fn write_repair_report(out: &mut impl Write, report: &RepairReport) -> std::io::Result<()> {
    writeln!(
        out,
        "{} (source: {})",
        "🩹 Snapshot repair".bright_cyan().bold(),
        report.source.as_str()
    )?;
    if report.is_clean() {
        writeln!(out, "   {}", "✅ snapshot is canonical".green())?;
        return Ok(());
    }
    if report.source.is_default() {
        writeln!(out, "   {}", "⚠️  no usable snapshot; default state in use".yellow())?;
    }
    for repair in &report.repairs {
        writeln!(out, "   • {repair}")?;
    }
    Ok(())
}

pub fn write_outbox(out: &mut impl Write, outbox: &SyncOutbox) -> std::io::Result<()> {
    writeln!(out, "{}", "📤 Pending remote writes".bright_cyan().bold())?;
    if outbox.is_empty() {
        writeln!(out, "   (none)")?;
        return Ok(());
    }
    for entry in outbox.entries() {
        let error = entry
            .last_error
            .as_deref()
            .map(|err| format!(", last error: {}", err.red()))
            .unwrap_or_default();
        writeln!(
            out,
            "   #{} {} {} for {} (queued {}, {} attempts){error}",
            entry.seq,
            entry.op.kind(),
            entry.aggregate,
            entry.owner,
            entry.queued_at.format("%Y-%m-%d %H:%M:%S"),
            entry.attempts,
        )?;
    }
    Ok(())
}

pub fn write_flush_report(out: &mut impl Write, report: &FlushReport) -> std::io::Result<()> {
    writeln!(out, "{}", "🔄 Sync results".bright_cyan().bold())?;
    writeln!(out, "Delivered: {}", report.delivered.len().to_string().green())?;
    writeln!(out, "Retrying:  {}", report.retrying.len().to_string().yellow())?;
    writeln!(out, "Held:      {}", report.held.len())?;
    writeln!(out, "Abandoned: {}", report.abandoned.len().to_string().red())?;
    for (provisional, real) in &report.assigned {
        writeln!(out, "   {provisional} → {real}")?;
    }
    for entry in &report.abandoned {
        writeln!(
            out,
            "   {} #{} {} {} ({})",
            "✗".red(),
            entry.seq,
            entry.op.kind(),
            entry.aggregate,
            entry.last_error.as_deref().unwrap_or("no error recorded")
        )?;
    }
    Ok(())
}
