//! Immutable per-run execution context

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fanout_core::{FingerprintStore, Subproject, TargetId};

use crate::options::RunOptions;

/// Everything a target execution needs, fixed for the whole run.
///
/// The completion counter is the only mutable piece; it is scoped to
/// this run (no global state) and read at any instant it equals the
/// number of executor invocations that have returned.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Workspace root directory
    pub root: PathBuf,
    /// Target id -> subproject descriptor
    pub projects: HashMap<TargetId, Subproject>,
    /// Fingerprint store handle
    pub fingerprints: Arc<FingerprintStore>,
    /// Task to apply: an ordered sequence of invocation words
    pub task: Vec<String>,
    /// Run options
    pub options: RunOptions,
    /// Total number of selected targets
    pub total: usize,
    /// Monotonic count of finished executor invocations
    completed: AtomicUsize,
}

impl ExecutionContext {
    /// Build a context for one run
    pub fn new(
        root: impl Into<PathBuf>,
        subprojects: Vec<Subproject>,
        fingerprints: Arc<FingerprintStore>,
        task: Vec<String>,
        options: RunOptions,
        total: usize,
    ) -> Self {
        let projects = subprojects
            .into_iter()
            .map(|sub| (sub.id.clone(), sub))
            .collect();
        Self {
            root: root.into(),
            projects,
            fingerprints,
            task,
            options,
            total,
            completed: AtomicUsize::new(0),
        }
    }

    /// Atomically record one finished target and return the new count
    pub fn record_completion(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of targets whose execution has finished so far
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// The task as one display string
    pub fn task_words(&self) -> String {
        self.task.join(" ")
    }
}
