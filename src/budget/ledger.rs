//! Persistent spend ledger with reserve/release semantics.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persist::{atomic_write_json, load_json, FileLock, StoreError};

use super::config::BudgetConfig;

const LEDGER_FILE_NAME: &str = "budget.json";
const LEDGER_LOCK_NAME: &str = "budget.lock";

/// Errors from ledger operations.
///
/// Any store failure is surfaced as-is: an unreadable ledger must fail the
/// run rather than let it guess a zero balance, and an unwritable ledger
/// must reject reservations rather than allow unlimited spend.
#[derive(Error, Debug)]
pub enum BudgetError {
    /// The persisted ledger could not be read, parsed, locked or written.
    #[error("budget store error: {0}")]
    Store(#[from] StoreError),
}

/// Budget period a reservation is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Rolling daily window (image generation).
    Day,
    /// Rolling monthly window (text generation).
    Month,
}

impl Period {
    /// Key identifying the period that contains `now`.
    pub fn key_for(&self, now: DateTime<Utc>) -> String {
        match self {
            Period::Day => now.format("%Y-%m-%d").to_string(),
            Period::Month => now.format("%Y-%m").to_string(),
        }
    }

    /// Human-readable label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Month => "month",
        }
    }
}

/// One live spend entry per period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetEntry {
    /// Key of the period this entry covers (e.g. `2026-08-07` or `2026-08`).
    pub period_key: String,
    /// Amount spent within the period.
    pub spent: Decimal,
    /// Cap the period is held to.
    pub cap: Decimal,
    /// When the entry was last zeroed.
    pub last_reset: DateTime<Utc>,
}

impl BudgetEntry {
    fn fresh(period_key: String, cap: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            period_key,
            spent: Decimal::ZERO,
            cap,
            last_reset: now,
        }
    }

    /// Remaining headroom under the cap.
    pub fn remaining(&self) -> Decimal {
        (self.cap - self.spent).max(Decimal::ZERO)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerState {
    day: Option<BudgetEntry>,
    month: Option<BudgetEntry>,
}

impl LedgerState {
    fn entry_mut(
        &mut self,
        period: Period,
        cap: Decimal,
        now: DateTime<Utc>,
    ) -> &mut BudgetEntry {
        let slot = match period {
            Period::Day => &mut self.day,
            Period::Month => &mut self.month,
        };
        let entry = slot.get_or_insert_with(|| {
            BudgetEntry::fresh(period.key_for(now), cap, now)
        });
        // Caps follow configuration (including CLI overrides); spent does not.
        entry.cap = cap;
        entry
    }

    fn entry(&self, period: Period) -> Option<&BudgetEntry> {
        match period {
            Period::Day => self.day.as_ref(),
            Period::Month => self.month.as_ref(),
        }
    }
}

/// A provisional charge committed before the priced call it guards.
///
/// If the guarded call fails, hand the reservation back via
/// [`BudgetLedger::release`]; if it completes, the charge stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub amount: Decimal,
    pub period: Period,
}

/// Result of a reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The amount was charged and persisted; proceed with the paid call.
    Reserved(Reservation),
    /// The cap would be exceeded; nothing was charged.
    Rejected { spent: Decimal, cap: Decimal },
}

impl ReserveOutcome {
    /// Whether the reservation was granted.
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReserveOutcome::Reserved(_))
    }
}

/// Read-only view of both periods, for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatusReport {
    pub day: Option<BudgetEntry>,
    pub month: Option<BudgetEntry>,
}

/// Persistent counter of spend against per-period caps.
///
/// The ledger owns its store file exclusively. Every mutation runs a full
/// lock → load → mutate → atomic-write cycle, so a crash between check and
/// persist can never leave a charge committed without the corresponding
/// write, and two overlapping invocations serialize on the lock file.
#[derive(Debug, Clone)]
pub struct BudgetLedger {
    path: PathBuf,
    lock_path: PathBuf,
    config: BudgetConfig,
}

impl BudgetLedger {
    /// Create a ledger storing state under `state_dir`.
    pub fn new(state_dir: impl Into<PathBuf>, config: BudgetConfig) -> Self {
        let state_dir = state_dir.into();
        Self {
            path: state_dir.join(LEDGER_FILE_NAME),
            lock_path: state_dir.join(LEDGER_LOCK_NAME),
            config,
        }
    }

    /// The ledger's configuration.
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Atomically check `spent + amount <= cap` for the period and, if it
    /// holds, charge and persist the amount.
    ///
    /// Returns [`ReserveOutcome::Rejected`] with the current spent/cap when
    /// the reservation would breach the cap. Persistence failures reject the
    /// reservation by erroring out before any charge is observable.
    pub fn reserve(&self, amount: Decimal, period: Period) -> Result<ReserveOutcome, BudgetError> {
        let now = Utc::now();
        self.with_state(|state| {
            let cap = self.config.cap_for(period);
            let entry = state.entry_mut(period, cap, now);
            if entry.spent + amount <= entry.cap {
                entry.spent += amount;
                tracing::info!(
                    period = period.label(),
                    amount = %amount,
                    spent = %entry.spent,
                    cap = %entry.cap,
                    "budget reserved"
                );
                ReserveOutcome::Reserved(Reservation { amount, period })
            } else {
                tracing::warn!(
                    period = period.label(),
                    amount = %amount,
                    spent = %entry.spent,
                    cap = %entry.cap,
                    "budget reservation rejected"
                );
                ReserveOutcome::Rejected {
                    spent: entry.spent,
                    cap: entry.cap,
                }
            }
        })
    }

    /// Compensating release for a reservation whose guarded call failed.
    pub fn release(&self, reservation: &Reservation) -> Result<(), BudgetError> {
        let now = Utc::now();
        self.with_state(|state| {
            let cap = self.config.cap_for(reservation.period);
            let entry = state.entry_mut(reservation.period, cap, now);
            entry.spent = (entry.spent - reservation.amount).max(Decimal::ZERO);
            tracing::info!(
                period = reservation.period.label(),
                amount = %reservation.amount,
                spent = %entry.spent,
                "budget reservation released"
            );
        })
    }

    /// Zero the named period and stamp the reset time.
    ///
    /// Idempotent within the same period: repeated resets leave spent at
    /// zero under the current period key.
    pub fn reset(&self, period: Period) -> Result<(), BudgetError> {
        let now = Utc::now();
        self.with_state(|state| {
            let cap = self.config.cap_for(period);
            let entry = state.entry_mut(period, cap, now);
            entry.spent = Decimal::ZERO;
            entry.period_key = period.key_for(now);
            entry.last_reset = now;
            tracing::info!(period = period.label(), "budget reset");
        })
    }

    /// Caller-invoked rollover: reset any entry whose period key no longer
    /// covers `now`.
    ///
    /// Reading never resets; the orchestrator calls this once at the start
    /// of each run so a stale entry from yesterday (or last month) is
    /// explicitly zeroed before any reservation is attempted.
    pub fn roll_over(&self, now: DateTime<Utc>) -> Result<(), BudgetError> {
        self.with_state(|state| {
            for period in [Period::Day, Period::Month] {
                let current_key = period.key_for(now);
                let cap = self.config.cap_for(period);
                let entry = state.entry_mut(period, cap, now);
                if entry.period_key != current_key {
                    tracing::info!(
                        period = period.label(),
                        old_key = %entry.period_key,
                        new_key = %current_key,
                        carried = %entry.spent,
                        "budget period rolled over"
                    );
                    entry.spent = Decimal::ZERO;
                    entry.period_key = current_key;
                    entry.last_reset = now;
                }
            }
        })
    }

    /// Current spend for a period (zero when no entry exists yet).
    pub fn spent(&self, period: Period) -> Result<Decimal, BudgetError> {
        let state = self.load_state()?;
        Ok(state
            .entry(period)
            .map(|e| e.spent)
            .unwrap_or(Decimal::ZERO))
    }

    /// Read-only snapshot of both periods.
    pub fn status(&self) -> Result<BudgetStatusReport, BudgetError> {
        let state = self.load_state()?;
        Ok(BudgetStatusReport {
            day: state.day,
            month: state.month,
        })
    }

    fn load_state(&self) -> Result<LedgerState, BudgetError> {
        Ok(load_json(&self.path)?.unwrap_or_default())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> Result<T, BudgetError> {
        let _guard = FileLock::acquire(&self.lock_path)?;
        let mut state = self.load_state()?;
        let out = f(&mut state);
        atomic_write_json(&self.path, &state)?;
        Ok(out)
    }
}
