// src/transaction/mod.rs

//! Transaction planning and execution
//!
//! The planner turns classified install targets into an ordered,
//! deduplicated plan with every action decided up front; the executor
//! applies that plan under an exclusive lock, one atomic entry at a time.

pub mod execute;
pub mod plan;

pub use execute::{EntryReport, Executor, Outcome, TransactionResult};
pub use plan::{Action, EntrySource, MismatchPolicy, PlanEntry, Planner, TransactionPlan, TxMode};
