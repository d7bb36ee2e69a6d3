//! Run timing summary

use std::fmt::Write as _;
use std::time::Duration;

use fanout_core::TargetId;

use crate::executor::TargetResult;

/// How many of the slowest targets the summary lists
const SLOWEST_SHOWN: usize = 8;

/// Aggregated timing for a finished run
#[derive(Debug)]
pub struct RunSummary {
    /// Total wall-clock time of the run
    pub wall_clock: Duration,
    /// Sum of per-target elapsed times
    pub task_time: Duration,
    /// task_time / wall_clock
    pub speedup: f64,
    /// Slowest targets, descending by elapsed time, with failure flag
    pub slowest: Vec<(TargetId, Duration, bool)>,
}

impl RunSummary {
    /// Aggregate the per-target results of one run
    pub fn from_results(results: &[TargetResult], wall_clock: Duration) -> Self {
        let task_time: Duration = results.iter().map(|r| r.elapsed).sum();
        let speedup = if wall_clock.as_secs_f64() > 0.0 {
            task_time.as_secs_f64() / wall_clock.as_secs_f64()
        } else {
            0.0
        };

        let mut slowest: Vec<(TargetId, Duration, bool)> = results
            .iter()
            .map(|r| (r.id.clone(), r.elapsed, !r.success))
            .collect();
        slowest.sort_by(|a, b| b.1.cmp(&a.1));
        slowest.truncate(SLOWEST_SHOWN);

        Self {
            wall_clock,
            task_time,
            speedup,
            slowest,
        }
    }

    /// Render the summary as plain text
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Run time:  {}", format_duration(self.wall_clock));
        let _ = writeln!(out, "Task time: {}", format_duration(self.task_time));
        let _ = writeln!(out, "Speedup:   {:.2}x", self.speedup);
        if !self.slowest.is_empty() {
            let _ = writeln!(out, "Slowest targets:");
            for (id, elapsed, failed) in &self.slowest {
                let mark = if *failed { " (failed)" } else { "" };
                let _ = writeln!(out, "  {} {}{}", format_duration(*elapsed), id, mark);
            }
        }
        out
    }
}

/// Format a duration as `4.2s` or `2m 03.5s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 60.0 {
        let minutes = (secs / 60.0).floor() as u64;
        format!("{}m {:04.1}s", minutes, secs - (minutes as f64) * 60.0)
    } else {
        format!("{secs:.1}s")
    }
}
