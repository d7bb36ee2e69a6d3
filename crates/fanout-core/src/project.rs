//! Subproject identity and metadata

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Unique identifier for a subproject within the repository
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId {
    /// Optional group (e.g. an organization or directory grouping)
    pub group: Option<String>,
    /// Subproject name
    pub name: String,
}

impl TargetId {
    /// Create a new target ID
    pub fn new(group: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            group: group.map(str::to_owned),
            name: name.into(),
        }
    }

    /// Create a bare (ungrouped) target ID
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            group: None,
            name: name.into(),
        }
    }

    /// Parse a target ID from `group/name` or bare `name` form
    pub fn parse(s: &str) -> Self {
        match s.split_once('/') {
            Some((group, name)) if !group.is_empty() => Self::new(Some(group), name),
            _ => Self::bare(s),
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}/{}", group, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A subproject declared in the workspace configuration
#[derive(Debug, Clone)]
pub struct Subproject {
    /// Subproject identifier
    pub id: TargetId,
    /// Directory of the subproject, relative to the workspace root
    pub path: PathBuf,
    /// In-repo subprojects this one depends on
    pub dependencies: Vec<TargetId>,
    /// Zero-based position in the configuration file. Used as the
    /// deterministic tie-break among mutually independent subprojects.
    pub decl_index: usize,
}

/// The subproject whose directory contains `dir`, if any. When
/// subproject directories nest, the deepest match wins.
pub fn containing_subproject<'a>(
    subprojects: &'a [Subproject],
    root: &Path,
    dir: &Path,
) -> Option<&'a Subproject> {
    subprojects
        .iter()
        .filter(|sub| dir.strip_prefix(root.join(&sub.path)).is_ok())
        .max_by_key(|sub| sub.path.components().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(name: &str, path: &str, decl_index: usize) -> Subproject {
        Subproject {
            id: TargetId::bare(name),
            path: path.into(),
            dependencies: vec![],
            decl_index,
        }
    }

    #[test]
    fn test_containing_subproject_matches_prefix() {
        let subs = vec![sub("core", "libs/core", 0), sub("app", "app", 1)];
        let root = Path::new("/ws");

        let found = containing_subproject(&subs, root, Path::new("/ws/libs/core/src")).unwrap();
        assert_eq!(found.id, TargetId::bare("core"));

        let found = containing_subproject(&subs, root, Path::new("/ws/app")).unwrap();
        assert_eq!(found.id, TargetId::bare("app"));

        assert!(containing_subproject(&subs, root, Path::new("/ws/docs")).is_none());
    }

    #[test]
    fn test_containing_subproject_deepest_wins() {
        let subs = vec![sub("outer", "a", 0), sub("inner", "a/nested", 1)];
        let root = Path::new("/ws");

        let found = containing_subproject(&subs, root, Path::new("/ws/a/nested/src")).unwrap();
        assert_eq!(found.id, TargetId::bare("inner"));
    }

    #[test]
    fn test_target_id_display_grouped() {
        let id = TargetId::new(Some("libs"), "core");
        assert_eq!(id.to_string(), "libs/core");
    }

    #[test]
    fn test_target_id_display_bare() {
        let id = TargetId::bare("core");
        assert_eq!(id.to_string(), "core");
    }

    #[test]
    fn test_target_id_parse_grouped() {
        let id = TargetId::parse("libs/core");
        assert_eq!(id.group.as_deref(), Some("libs"));
        assert_eq!(id.name, "core");
    }

    #[test]
    fn test_target_id_parse_bare() {
        let id = TargetId::parse("core");
        assert!(id.group.is_none());
        assert_eq!(id.name, "core");
    }

    #[test]
    fn test_target_id_parse_round_trip() {
        for raw in ["libs/core", "core"] {
            assert_eq!(TargetId::parse(raw).to_string(), raw);
        }
    }
}
