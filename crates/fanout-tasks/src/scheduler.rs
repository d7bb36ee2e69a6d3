//! Dependency-respecting task scheduling
//!
//! Two interchangeable strategies produce one result per target in
//! ordinal order: a linear walk, and a bounded worker pool in which
//! each target's unit is gated on the completion of its in-set
//! upstream units.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, info};

use fanout_core::TargetId;

use crate::context::ExecutionContext;
use crate::executor::{execute_target, ExecError, TargetResult, TaskRunner};
use crate::select::Target;

/// Drives execution of the selected targets, linear or bounded-parallel
/// depending on the run options.
pub struct TaskScheduler {
    ctx: Arc<ExecutionContext>,
    runner: Arc<dyn TaskRunner>,
}

impl TaskScheduler {
    /// Create a scheduler for one run
    pub fn new(ctx: Arc<ExecutionContext>, runner: Arc<dyn TaskRunner>) -> Self {
        Self { ctx, runner }
    }

    /// Execute all targets, returning one result per target in ordinal
    /// order. An intolerant failure propagates; with `--endure` it is
    /// recorded in that target's result instead.
    pub async fn execute(&self, targets: &[Target]) -> Result<Vec<TargetResult>, ExecError> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        // Resolve the task implementation exactly once, before any
        // worker can race to do it.
        self.runner.initialize(&self.ctx).await?;

        match self.ctx.options.parallel {
            Some(pool) => self.run_parallel(targets, pool.max(1)).await,
            None => self.run_linear(targets).await,
        }
    }

    /// One target at a time, in ordinal order. An intolerant failure
    /// aborts immediately; remaining targets never execute.
    async fn run_linear(&self, targets: &[Target]) -> Result<Vec<TargetResult>, ExecError> {
        info!(targets = targets.len(), "running sequentially");
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            results.push(execute_target(&self.ctx, target, self.runner.as_ref()).await?);
        }
        Ok(results)
    }

    /// Bounded worker pool with a dependency-readiness gate per target.
    ///
    /// Every target gets a spawned unit that first waits for the
    /// completion gates of its in-set upstream dependencies (completion,
    /// not success, opens a gate), then takes a pool permit and runs.
    /// Results are collected by awaiting units in ordinal order, so an
    /// intolerant failure surfaces at the collection point; units
    /// launched before it was observed are not cancelled and run to
    /// completion in the background.
    async fn run_parallel(
        &self,
        targets: &[Target],
        pool: usize,
    ) -> Result<Vec<TargetResult>, ExecError> {
        info!(targets = targets.len(), pool, "running with worker pool");
        let semaphore = Arc::new(Semaphore::new(pool));
        let mut gates: HashMap<TargetId, watch::Receiver<bool>> = HashMap::new();
        let mut handles = Vec::with_capacity(targets.len());

        for target in targets {
            let (done_tx, done_rx) = watch::channel(false);

            let upstream_gates = self.upstream_gates(&target.id, &gates);
            gates.insert(target.id.clone(), done_rx);

            let ctx = Arc::clone(&self.ctx);
            let runner = Arc::clone(&self.runner);
            let semaphore = Arc::clone(&semaphore);
            let target = target.clone();

            handles.push(tokio::spawn(async move {
                for mut gate in upstream_gates {
                    // A sender dropped without signalling means the
                    // upstream unit is gone; treat that as finished.
                    let _ = gate.wait_for(|done| *done).await;
                }
                debug!(target = %target.id, "dependencies finished; waiting for pool slot");

                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let _ = done_tx.send(true);
                        return Err(ExecError::Worker("worker pool closed".to_string()));
                    }
                };
                let result = execute_target(&ctx, &target, runner.as_ref()).await;
                drop(permit);
                let _ = done_tx.send(true);
                result
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle
                .await
                .map_err(|err| ExecError::Worker(err.to_string()))??;
            results.push(result);
        }
        Ok(results)
    }

    /// Completion gates for every in-set upstream of `id`, including
    /// upstreams reached through projects filtered out of the run: a
    /// selected dependency contributes its own gate (its unit already
    /// waits on everything above it), an unselected one is traversed so
    /// the nearest selected upstreams behind it still gate this target.
    /// The target list is topologically ordered, so every in-set
    /// upstream was registered before this target.
    fn upstream_gates(
        &self,
        id: &TargetId,
        gates: &HashMap<TargetId, watch::Receiver<bool>>,
    ) -> Vec<watch::Receiver<bool>> {
        let mut seen: HashSet<TargetId> = HashSet::new();
        let mut queue: VecDeque<TargetId> = self
            .ctx
            .projects
            .get(id)
            .map(|sub| sub.dependencies.iter().cloned().collect())
            .unwrap_or_default();
        let mut found = Vec::new();

        while let Some(dep) = queue.pop_front() {
            if !seen.insert(dep.clone()) {
                continue;
            }
            match gates.get(&dep) {
                Some(gate) => found.push(gate.clone()),
                None => {
                    if let Some(sub) = self.ctx.projects.get(&dep) {
                        queue.extend(sub.dependencies.iter().cloned());
                    }
                }
            }
        }
        found
    }
}
