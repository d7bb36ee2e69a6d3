//! Each command — apply one task across the selected subprojects

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::debug;

use fanout_core::{
    containing_subproject, load_config_from_dir, Config, DependencyGraph, FingerprintStore,
};
use fanout_tasks::report::format_duration;
use fanout_tasks::{
    select_targets, ExecutionContext, ProcessRunner, RunOptions, RunSummary, TaskScheduler,
};

use crate::cli::{output, Cli};

/// Apply a task to every selected subproject, in dependency order
#[derive(Debug, Args)]
pub struct EachCommand {
    /// Run with a worker pool of N; without a value, use the configured
    /// default (or the number of CPUs)
    #[arg(long, value_name = "N", num_args = 0..=1)]
    pub parallel: Option<Option<usize>>,

    /// Record per-target failures instead of aborting the run
    #[arg(long)]
    pub endure: bool,

    /// Print a timing summary at the end of the run
    #[arg(long)]
    pub report: bool,

    /// Capture each target's output to a file under this directory
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Resume the run order from this target
    #[arg(long, value_name = "TARGET")]
    pub start: Option<String>,

    /// Only run targets that changed since the marker was recorded
    #[arg(long, value_name = "MARKER")]
    pub changed: Option<String>,

    /// Like --changed, and record a fresh fingerprint for each target
    /// that succeeds
    #[arg(long, value_name = "MARKER")]
    pub refresh: Option<String>,

    /// Restrict the run to these targets (can be repeated)
    #[arg(long, value_name = "TARGET")]
    pub select: Vec<String>,

    /// Restrict the run to these targets (alias of --select)
    #[arg(long = "in", value_name = "TARGET")]
    pub in_projects: Vec<String>,

    /// Remove these targets from the selection (can be repeated)
    #[arg(long, value_name = "TARGET")]
    pub skip: Vec<String>,

    /// Include these targets and everything they depend on
    #[arg(long, value_name = "TARGET")]
    pub upstream_of: Vec<String>,

    /// Include these targets and everything that depends on them
    #[arg(long, value_name = "TARGET")]
    pub downstream_of: Vec<String>,

    /// Include the current directory's subproject and everything it
    /// depends on
    #[arg(long)]
    pub upstream: bool,

    /// Include the current directory's subproject and everything that
    /// depends on it
    #[arg(long)]
    pub downstream: bool,

    /// Show the run order without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// The task to apply, after `--` (e.g. `-- make test`)
    #[arg(last = true, required = true)]
    pub task: Vec<String>,
}

impl EachCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let (config, config_path) = load_config_from_dir(&cwd)?;
        let root = config_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| cwd.clone());

        let subprojects = config.subprojects()?;
        if subprojects.is_empty() {
            anyhow::bail!("No subprojects declared in {}", config_path.display());
        }

        let graph = DependencyGraph::build(&subprojects)?;
        let fingerprints = Arc::new(FingerprintStore::new(&root));
        let options = self.to_options(&config);

        let anchor = containing_subproject(&subprojects, &root, &cwd).map(|sub| sub.id.clone());
        let targets =
            select_targets(&subprojects, &graph, &options, &fingerprints, anchor.as_ref())?;
        debug!(
            declared = subprojects.len(),
            selected = targets.len(),
            "selection finalized"
        );
        if targets.is_empty() {
            if !cli.quiet {
                output::success("No matching subprojects; nothing to do");
            }
            return Ok(());
        }

        if !cli.quiet {
            println!();
            println!(
                "{} Applying {} to {} subproject{}",
                style("→").blue(),
                style(self.task.join(" ")).bold(),
                targets.len(),
                if targets.len() == 1 { "" } else { "s" },
            );
            if cli.verbose || self.dry_run {
                println!();
                for target in &targets {
                    println!("  {:>3}. {}", target.ordinal + 1, target.id);
                }
            }
            println!();
        }

        if self.dry_run {
            if !cli.quiet {
                println!(
                    "{}",
                    style("[DRY RUN - no tasks will be executed]").yellow().bold()
                );
            }
            return Ok(());
        }

        let total = targets.len();
        let ctx = Arc::new(ExecutionContext::new(
            root,
            subprojects,
            fingerprints,
            self.task.clone(),
            options,
            total,
        ));
        let scheduler = TaskScheduler::new(ctx, Arc::new(ProcessRunner));

        let started = Instant::now();
        let results = scheduler.execute(&targets).await?;
        let wall_clock = started.elapsed();

        if self.report && !cli.quiet {
            println!();
            print!("{}", RunSummary::from_results(&results, wall_clock).render());
        }

        let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
        if !failed.is_empty() {
            if !cli.quiet {
                println!();
                for result in &failed {
                    println!(
                        "  {} {}: {}",
                        style("✗").red(),
                        result.id,
                        result.cause.as_deref().unwrap_or("failed")
                    );
                }
            }
            anyhow::bail!(
                "{} of {} targets failed",
                failed.len(),
                results.len()
            );
        }

        if !cli.quiet {
            println!();
            output::success(&format!(
                "Applied task to {} subproject{} in {}",
                results.len(),
                if results.len() == 1 { "" } else { "s" },
                format_duration(wall_clock)
            ));
        }
        Ok(())
    }

    /// Translate the parsed arguments into run options, resolving a
    /// bare `--parallel` against the configured default.
    fn to_options(&self, config: &Config) -> RunOptions {
        let parallel = self.parallel.map(|explicit| {
            explicit
                .or(config.defaults.concurrency)
                .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
                .unwrap_or(1)
        });
        RunOptions {
            parallel,
            endure: self.endure,
            report: self.report,
            output: self.output.clone(),
            start: self.start.clone(),
            changed: self.changed.clone(),
            refresh: self.refresh.clone(),
            select: self.select.clone(),
            in_projects: self.in_projects.clone(),
            skip: self.skip.clone(),
            upstream_of: self.upstream_of.clone(),
            downstream_of: self.downstream_of.clone(),
            upstream: self.upstream,
            downstream: self.downstream,
        }
    }
}
