//! Workspace configuration loading

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::project::{Subproject, TargetId};

/// Name of the workspace configuration file
pub const CONFIG_FILE_NAME: &str = "fanout.toml";

/// Workspace configuration for Fanout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workspace name
    pub name: Option<String>,

    /// Default run settings
    pub defaults: DefaultsConfig,

    /// Declared subprojects, in declaration order
    pub projects: Vec<ProjectConfig>,
}

/// Default run settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Default worker-pool size for `--parallel` without a value
    pub concurrency: Option<usize>,
}

/// A declared subproject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Subproject name
    pub name: String,

    /// Optional group
    #[serde(default)]
    pub group: Option<String>,

    /// Directory relative to the workspace root
    pub path: PathBuf,

    /// Names of in-repo subprojects this one depends on.
    /// Either bare (`core`) or qualified (`libs/core`).
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Config {
    /// Resolve the declared projects into [`Subproject`]s, checking that
    /// every declared dependency names a known subproject.
    pub fn subprojects(&self) -> Result<Vec<Subproject>, ConfigError> {
        let ids: Vec<TargetId> = self
            .projects
            .iter()
            .map(|p| TargetId::new(p.group.as_deref(), &p.name))
            .collect();

        for (idx, id) in ids.iter().enumerate() {
            if ids[..idx].contains(id) {
                return Err(ConfigError::DuplicateProject(id.clone()));
            }
        }

        let mut subprojects = Vec::with_capacity(self.projects.len());
        for (decl_index, project) in self.projects.iter().enumerate() {
            let id = ids[decl_index].clone();
            let mut dependencies = Vec::with_capacity(project.dependencies.len());
            for raw in &project.dependencies {
                let dep = resolve_declared(&ids, raw).ok_or_else(|| {
                    ConfigError::UnknownDependency {
                        project: id.clone(),
                        dependency: raw.clone(),
                    }
                })?;
                dependencies.push(dep);
            }
            subprojects.push(Subproject {
                id,
                path: project.path.clone(),
                dependencies,
                decl_index,
            });
        }
        Ok(subprojects)
    }
}

/// Resolve a declared dependency name against the declared project ids.
/// Qualified names must match exactly; bare names match when unambiguous.
fn resolve_declared(ids: &[TargetId], raw: &str) -> Option<TargetId> {
    let parsed = TargetId::parse(raw);
    if ids.contains(&parsed) {
        return Some(parsed);
    }
    if parsed.group.is_none() {
        let mut matches = ids.iter().filter(|id| id.name == parsed.name);
        if let (Some(found), None) = (matches.next(), matches.next()) {
            return Some(found.clone());
        }
    }
    None
}

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    info!(path = %path.display(), "loading config");
    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: Config = toml::from_str(&content).map_err(ConfigError::TomlError)?;
    debug!(path = %path.display(), projects = config.projects.len(), "config loaded");
    Ok(config)
}

/// Find the configuration file in a directory or its parents.
/// The first `fanout.toml` found walking upward wins.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            info!(path = %config_path.display(), "found config file");
            return Some(config_path);
        }
        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from a directory (searching parent directories).
/// Returns the config together with the path it was loaded from; the
/// parent of that path is the workspace root.
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf), ConfigError> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;
    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
name = "acme"

[defaults]
concurrency = 4

[[projects]]
name = "core"
group = "libs"
path = "libs/core"

[[projects]]
name = "util"
group = "libs"
path = "libs/util"
dependencies = ["core"]

[[projects]]
name = "app"
path = "app"
dependencies = ["libs/core", "util"]
"#;

    #[test]
    fn test_load_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.name.as_deref(), Some("acme"));
        assert_eq!(config.defaults.concurrency, Some(4));
        assert_eq!(config.projects.len(), 3);
    }

    #[test]
    fn test_find_config_walks_up() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), SAMPLE).unwrap();
        let nested = temp.path().join("libs").join("core");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config(&nested).unwrap();
        assert_eq!(found, temp.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_subprojects_resolve_dependencies() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let subprojects = config.subprojects().unwrap();

        assert_eq!(subprojects.len(), 3);
        assert_eq!(subprojects[0].decl_index, 0);
        assert_eq!(subprojects[2].id, TargetId::bare("app"));

        // "core" resolves to the grouped libs/core; app lists both forms
        let util = &subprojects[1];
        assert_eq!(util.dependencies, vec![TargetId::new(Some("libs"), "core")]);
        let app = &subprojects[2];
        assert_eq!(
            app.dependencies,
            vec![
                TargetId::new(Some("libs"), "core"),
                TargetId::new(Some("libs"), "util"),
            ]
        );
    }

    #[test]
    fn test_subprojects_unknown_dependency() {
        let config: Config = toml::from_str(
            r#"
[[projects]]
name = "app"
path = "app"
dependencies = ["missing"]
"#,
        )
        .unwrap();

        let err = config.subprojects().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDependency { .. }));
    }

    #[test]
    fn test_subprojects_duplicate() {
        let config: Config = toml::from_str(
            r#"
[[projects]]
name = "app"
path = "app"

[[projects]]
name = "app"
path = "app2"
"#,
        )
        .unwrap();

        let err = config.subprojects().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateProject(_)));
    }

    #[test]
    fn test_config_not_found() {
        let temp = TempDir::new().unwrap();
        let err = load_config_from_dir(temp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
