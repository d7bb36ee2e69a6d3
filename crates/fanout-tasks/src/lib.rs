//! Fanout Tasks - Scheduler/executor core
//!
//! This crate turns a dependency graph and a set of run options into an
//! ordered target list, then applies an arbitrary task to each target
//! either sequentially or with bounded dependency-respecting
//! concurrency, with optional per-target output capture and
//! change-based skipping.

pub mod context;
pub mod executor;
pub mod options;
pub mod report;
pub mod scheduler;
pub mod select;
pub mod tee;

pub use context::ExecutionContext;
pub use executor::{ExecError, ProcessRunner, TargetResult, TaskRunner};
pub use options::RunOptions;
pub use report::RunSummary;
pub use scheduler::TaskScheduler;
pub use select::{select_targets, SelectError, Target};
pub use tee::OutputTee;
