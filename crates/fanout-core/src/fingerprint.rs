//! Marker-keyed fingerprint store for change detection
//!
//! A fingerprint is a SHA-256 digest over a subproject's file tree,
//! recorded under a marker name (e.g. "deployed", "tested"). A target
//! whose current digest matches the recorded one is considered
//! unchanged for that marker.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::FingerprintError;
use crate::project::Subproject;

/// Directory names never included in a fingerprint
const IGNORED_DIRS: &[&str] = &["target", "node_modules", ".git", ".fanout"];

/// A recorded fingerprint for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FingerprintEntry {
    /// SHA-256 over the subproject file tree
    hash: String,
    /// When this fingerprint was recorded
    recorded_at: String,
}

/// State for one marker: target id string -> entry
type MarkerState = BTreeMap<String, FingerprintEntry>;

/// Durable fingerprint store rooted at the workspace directory.
///
/// Marker states live under `.fanout/fingerprints/<marker>.json` and are
/// cached in memory behind a mutex so concurrent saves from parallel
/// workers serialize their read-modify-write of the marker file.
#[derive(Debug)]
pub struct FingerprintStore {
    root: PathBuf,
    store_dir: PathBuf,
    markers: Mutex<HashMap<String, MarkerState>>,
}

impl FingerprintStore {
    /// Create a store rooted at the workspace directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let store_dir = root.join(".fanout").join("fingerprints");
        Self {
            root,
            store_dir,
            markers: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the target's contents differ from the fingerprint
    /// recorded under `marker`. A target with no recorded fingerprint
    /// is always considered changed.
    pub fn changed(&self, marker: &str, sub: &Subproject) -> Result<bool, FingerprintError> {
        let current = self.hash_subproject(sub)?;
        let recorded = self.entry(marker, sub)?;
        Ok(recorded.map(|e| e.hash) != Some(current))
    }

    /// Human-readable explanation of why a target is considered
    /// changed (or not) for the marker.
    pub fn explain(&self, marker: &str, sub: &Subproject) -> String {
        match (self.entry(marker, sub), self.hash_subproject(sub)) {
            (Ok(None), _) => format!("no '{marker}' fingerprint recorded yet"),
            (Ok(Some(entry)), Ok(current)) if entry.hash == current => {
                format!("unchanged since '{marker}' at {}", entry.recorded_at)
            }
            (Ok(Some(entry)), Ok(_)) => {
                format!("contents changed since '{marker}' at {}", entry.recorded_at)
            }
            (Err(err), _) | (_, Err(err)) => {
                format!("fingerprint state unreadable ({err}); treating as changed")
            }
        }
    }

    /// Record a fresh fingerprint for (marker, target) and persist it.
    pub fn save(&self, marker: &str, sub: &Subproject) -> Result<(), FingerprintError> {
        let hash = self.hash_subproject(sub)?;
        let mut markers = self.markers.lock().unwrap_or_else(|e| e.into_inner());
        let state = self.load_locked(&mut markers, marker)?;
        state.insert(
            sub.id.to_string(),
            FingerprintEntry {
                hash,
                recorded_at: chrono::Utc::now().to_rfc3339(),
            },
        );

        fs::create_dir_all(&self.store_dir).map_err(FingerprintError::Io)?;
        let path = self.marker_path(marker);
        let json = serde_json::to_string_pretty(&state).map_err(FingerprintError::Json)?;
        fs::write(&path, json).map_err(FingerprintError::Io)?;
        info!(marker, target = %sub.id, "fingerprint saved");
        Ok(())
    }

    fn entry(
        &self,
        marker: &str,
        sub: &Subproject,
    ) -> Result<Option<FingerprintEntry>, FingerprintError> {
        let mut markers = self.markers.lock().unwrap_or_else(|e| e.into_inner());
        let state = self.load_locked(&mut markers, marker)?;
        Ok(state.get(&sub.id.to_string()).cloned())
    }

    /// Load a marker state into the cache if not present; the caller
    /// holds the store lock.
    fn load_locked<'a>(
        &self,
        markers: &'a mut HashMap<String, MarkerState>,
        marker: &str,
    ) -> Result<&'a mut MarkerState, FingerprintError> {
        match markers.entry(marker.to_string()) {
            Entry::Occupied(occupied) => Ok(occupied.into_mut()),
            Entry::Vacant(vacant) => {
                let path = self.marker_path(marker);
                let state = if path.exists() {
                    let contents = fs::read_to_string(&path).map_err(FingerprintError::Io)?;
                    serde_json::from_str(&contents).map_err(FingerprintError::Json)?
                } else {
                    debug!(marker, "no recorded fingerprints for marker");
                    MarkerState::new()
                };
                Ok(vacant.insert(state))
            }
        }
    }

    fn marker_path(&self, marker: &str) -> PathBuf {
        self.store_dir.join(format!("{marker}.json"))
    }

    /// SHA-256 over the subproject's file tree: sorted relative paths
    /// and file contents, skipping build and VCS directories.
    fn hash_subproject(&self, sub: &Subproject) -> Result<String, FingerprintError> {
        let dir = self.root.join(&sub.path);
        let mut files: Vec<PathBuf> = Vec::new();

        if dir.exists() {
            for entry in WalkDir::new(&dir)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !is_ignored(e.path()))
            {
                let entry = entry.map_err(|e| {
                    FingerprintError::Io(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                    }))
                })?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        }
        files.sort();

        let mut hasher = Sha256::new();
        hasher.update(sub.id.to_string().as_bytes());
        for file in &files {
            let relative = file.strip_prefix(&dir).unwrap_or(file);
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            let contents = fs::read(file).map_err(FingerprintError::Io)?;
            hasher.update(&contents);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| IGNORED_DIRS.contains(&name) || name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::TargetId;
    use tempfile::TempDir;

    fn fixture(temp: &TempDir) -> Subproject {
        let dir = temp.path().join("core");
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("src").join("lib.rs"), "pub fn f() {}\n").unwrap();
        Subproject {
            id: TargetId::bare("core"),
            path: "core".into(),
            dependencies: vec![],
            decl_index: 0,
        }
    }

    #[test]
    fn test_unrecorded_target_is_changed() {
        let temp = TempDir::new().unwrap();
        let sub = fixture(&temp);
        let store = FingerprintStore::new(temp.path());

        assert!(store.changed("deployed", &sub).unwrap());
        assert!(store.explain("deployed", &sub).contains("no 'deployed'"));
    }

    #[test]
    fn test_save_then_unchanged() {
        let temp = TempDir::new().unwrap();
        let sub = fixture(&temp);
        let store = FingerprintStore::new(temp.path());

        store.save("deployed", &sub).unwrap();
        assert!(!store.changed("deployed", &sub).unwrap());
        assert!(store.explain("deployed", &sub).contains("unchanged"));
    }

    #[test]
    fn test_modification_flips_changed() {
        let temp = TempDir::new().unwrap();
        let sub = fixture(&temp);
        let store = FingerprintStore::new(temp.path());

        store.save("deployed", &sub).unwrap();
        fs::write(
            temp.path().join("core").join("src").join("lib.rs"),
            "pub fn f() { /* edited */ }\n",
        )
        .unwrap();

        assert!(store.changed("deployed", &sub).unwrap());
        assert!(store.explain("deployed", &sub).contains("contents changed"));
    }

    #[test]
    fn test_state_survives_reload() {
        let temp = TempDir::new().unwrap();
        let sub = fixture(&temp);

        FingerprintStore::new(temp.path())
            .save("deployed", &sub)
            .unwrap();

        // Fresh store reads the persisted marker file
        let reloaded = FingerprintStore::new(temp.path());
        assert!(!reloaded.changed("deployed", &sub).unwrap());
    }

    #[test]
    fn test_markers_are_independent() {
        let temp = TempDir::new().unwrap();
        let sub = fixture(&temp);
        let store = FingerprintStore::new(temp.path());

        store.save("deployed", &sub).unwrap();
        assert!(store.changed("tested", &sub).unwrap());
    }
}
