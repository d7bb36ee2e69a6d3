//! Fanout Core - Foundational types for the fanout task runner
//!
//! This crate provides the workspace configuration, subproject model,
//! dependency graph, and fingerprint store that the scheduler builds on.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod project;

pub use config::{find_config, load_config, load_config_from_dir, Config};
pub use error::{ConfigError, FanoutError, FingerprintError, GraphError, Result};
pub use fingerprint::FingerprintStore;
pub use graph::DependencyGraph;
pub use project::{containing_subproject, Subproject, TargetId};
