//! Run orchestration.
//!
//! One orchestrator invocation drives the whole state machine: fetch trends,
//! filter, then per candidate consult the budget ledger, generate content,
//! publish, record the outcome, and finally drain a batch of the fallback
//! queue. The orchestrator is the only component with side-effecting
//! sequencing; everything it calls returns typed outcomes.

mod orchestrator;

pub use orchestrator::{DrainReport, RunConfig, RunError, RunOrchestrator, RunResult};
