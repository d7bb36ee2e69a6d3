//! Run options and their re-serialization

use std::path::PathBuf;

/// Options for one run, as accepted by `fanout each`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker-pool size; `None` means fully sequential
    pub parallel: Option<usize>,

    /// Record per-target failures instead of aborting the run
    pub endure: bool,

    /// Print a timing summary at the end of the run
    pub report: bool,

    /// Directory for per-target capture files; `None` means passthrough
    pub output: Option<PathBuf>,

    /// Target to resume from (everything before it in the run order is
    /// dropped)
    pub start: Option<String>,

    /// Fingerprint marker: only run targets flagged changed
    pub changed: Option<String>,

    /// Fingerprint marker: like `changed`, and additionally persist a
    /// fresh fingerprint for each target that succeeds
    pub refresh: Option<String>,

    /// Restrict the run to these targets
    pub select: Vec<String>,

    /// Restrict the run to these targets (alias spelling of `select`)
    pub in_projects: Vec<String>,

    /// Remove these targets from the selection
    pub skip: Vec<String>,

    /// Include these targets and everything they depend on
    pub upstream_of: Vec<String>,

    /// Include these targets and everything that depends on them
    pub downstream_of: Vec<String>,

    /// Include the working directory's subproject and everything it
    /// depends on
    pub upstream: bool,

    /// Include the working directory's subproject and everything that
    /// depends on it
    pub downstream: bool,
}

impl RunOptions {
    /// The active fingerprint marker, if any. `refresh` implies the
    /// `changed` filter and wins when both are set.
    pub fn marker(&self) -> Option<&str> {
        self.refresh.as_deref().or(self.changed.as_deref())
    }

    /// Whether a successful target should persist a fresh fingerprint
    pub fn refresh_on_success(&self) -> bool {
        self.refresh.is_some()
    }

    /// Re-serialize these options as an argument vector, omitting
    /// `start`. Used to build the resume command after an intolerant
    /// failure.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(pool) = self.parallel {
            args.push("--parallel".to_string());
            args.push(pool.to_string());
        }
        if self.endure {
            args.push("--endure".to_string());
        }
        if self.report {
            args.push("--report".to_string());
        }
        if let Some(dir) = &self.output {
            args.push("--output".to_string());
            args.push(dir.display().to_string());
        }
        if let Some(marker) = &self.changed {
            args.push("--changed".to_string());
            args.push(marker.clone());
        }
        if let Some(marker) = &self.refresh {
            args.push("--refresh".to_string());
            args.push(marker.clone());
        }
        if self.upstream {
            args.push("--upstream".to_string());
        }
        if self.downstream {
            args.push("--downstream".to_string());
        }
        for (flag, values) in [
            ("--select", &self.select),
            ("--in", &self.in_projects),
            ("--skip", &self.skip),
            ("--upstream-of", &self.upstream_of),
            ("--downstream-of", &self.downstream_of),
        ] {
            for value in values {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_sequential() {
        let opts = RunOptions::default();
        assert!(opts.parallel.is_none());
        assert!(!opts.endure);
        assert!(opts.marker().is_none());
        assert!(opts.to_args().is_empty());
    }

    #[test]
    fn test_refresh_wins_over_changed() {
        let opts = RunOptions {
            changed: Some("tested".to_string()),
            refresh: Some("deployed".to_string()),
            ..Default::default()
        };
        assert_eq!(opts.marker(), Some("deployed"));
        assert!(opts.refresh_on_success());
    }

    #[test]
    fn test_to_args_keeps_cwd_relative_filters() {
        let opts = RunOptions {
            upstream: true,
            downstream: true,
            ..Default::default()
        };
        assert_eq!(opts.to_args(), vec!["--upstream", "--downstream"]);
    }

    #[test]
    fn test_to_args_omits_start() {
        let opts = RunOptions {
            parallel: Some(4),
            endure: true,
            start: Some("libs/core".to_string()),
            refresh: Some("deployed".to_string()),
            skip: vec!["apps/web".to_string()],
            ..Default::default()
        };
        let args = opts.to_args();
        assert_eq!(
            args,
            vec![
                "--parallel",
                "4",
                "--endure",
                "--refresh",
                "deployed",
                "--skip",
                "apps/web",
            ]
        );
        assert!(!args.iter().any(|a| a.contains("core")));
    }
}
