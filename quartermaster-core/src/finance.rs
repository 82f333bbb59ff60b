//! Ledger summaries over the finance, cargo, maintenance and loan collections.
use serde::{Deserialize, Serialize};

use crate::state::{CampaignState, CargoLeg, FinanceEntry, Loan, MaintenanceEntry, Stored};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LedgerSummary {
    pub entries: usize,
    pub income: i64,
    /// Sum of negative amounts, reported as a positive number.
    pub expenses: i64,
    pub balance: i64,
}

/// Fold a ledger. Rows that could not be read as entries are skipped.
#[must_use]
pub fn summarize(entries: &[Stored<FinanceEntry>]) -> LedgerSummary {
    entries
        .iter()
        .filter_map(Stored::typed)
        .fold(LedgerSummary::default(), |mut summary, entry| {
            let amount = entry.credits();
            summary.entries += 1;
            if amount >= 0 {
                summary.income = summary.income.saturating_add(amount);
            } else {
                summary.expenses = summary.expenses.saturating_add(amount.saturating_neg());
            }
            summary.balance = summary.balance.saturating_add(amount);
            summary
        })
}

#[must_use]
pub fn cargo_profit(legs: &[Stored<CargoLeg>]) -> i64 {
    legs.iter()
        .filter_map(Stored::typed)
        .fold(0i64, |total, leg| total.saturating_add(leg.profit()))
}

#[must_use]
pub fn maintenance_total(entries: &[Stored<MaintenanceEntry>]) -> i64 {
    entries
        .iter()
        .filter_map(Stored::typed)
        .fold(0i64, |total, entry| total.saturating_add(entry.credits()))
}

/// Outstanding balance across all loans; paid-off (non-positive) loans count as zero.
#[must_use]
pub fn outstanding_debt(loans: &[Stored<Loan>]) -> i64 {
    loans
        .iter()
        .filter_map(Stored::typed)
        .fold(0i64, |total, loan| total.saturating_add(loan.outstanding()))
}

/// Campaign-wide view shown on the finance screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FinanceOverview {
    pub party: LedgerSummary,
    pub ship: LedgerSummary,
    pub cargo_profit: i64,
    pub maintenance: i64,
    pub debt: i64,
}

impl CampaignState {
    #[must_use]
    pub fn finance_overview(&self) -> FinanceOverview {
        FinanceOverview {
            party: summarize(&self.party_finance),
            ship: summarize(&self.ship_finance),
            cargo_profit: cargo_profit(&self.cargo),
            maintenance: maintenance_total(&self.maintenance),
            debt: outstanding_debt(&self.loans),
        }
    }
}
