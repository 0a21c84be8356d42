//! Spend budget tracking and enforcement.
//!
//! Every paid generation call is gate-kept by the [`BudgetLedger`]: the
//! caller reserves the cost *before* the external call, and issues a
//! compensating release if the call fails. The ledger is persisted so caps
//! survive process restarts, and all mutation happens under a file lock so
//! an overlapping manual run cannot corrupt spend totals.
//!
//! Two periods are tracked independently: image generation spends against a
//! daily cap, text generation against a monthly cap.

mod config;
mod ledger;

pub use config::BudgetConfig;
pub use ledger::{
    BudgetEntry, BudgetError, BudgetLedger, BudgetStatusReport, Period, Reservation,
    ReserveOutcome,
};
