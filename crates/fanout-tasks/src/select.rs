//! Target selection: filtering, ordering and ordinal assignment

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, warn};

use fanout_core::{
    DependencyGraph, FingerprintError, FingerprintStore, GraphError, Subproject, TargetId,
};

use crate::options::RunOptions;

/// One selected target: its identifier and its zero-based position in
/// the finalized run order. Ordinals are contiguous and used only for
/// progress display and result-collection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Position in the finalized run order
    pub ordinal: usize,
    /// Subproject identifier
    pub id: TargetId,
}

/// Errors during target selection
#[derive(Debug, Error)]
pub enum SelectError {
    /// Name resolution failed (unresolved or ambiguous)
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Fingerprint state could not be read
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    /// A cwd-relative filter was given outside any subproject
    #[error("--upstream/--downstream require the working directory to be inside a subproject")]
    NoAnchor,
}

/// Resolve the ordered, filtered set of targets for a run.
///
/// Filters compose as: the candidate base is the union of whatever
/// `select`/`in`/`upstream-of`/`downstream-of` name plus the
/// `upstream`/`downstream` closures around `anchor` (all subprojects
/// when no filter is given), minus `skip`. The base is then
/// topologically linearized, cut at `start`, reduced to changed targets
/// when a fingerprint marker is active, and renumbered contiguously
/// from 0. `anchor` is the subproject containing the working directory,
/// when there is one; the cwd-relative filters fail without it.
pub fn select_targets(
    subprojects: &[Subproject],
    graph: &DependencyGraph,
    options: &RunOptions,
    fingerprints: &FingerprintStore,
    anchor: Option<&TargetId>,
) -> Result<Vec<Target>, SelectError> {
    let by_id: HashMap<&TargetId, &Subproject> =
        subprojects.iter().map(|sub| (&sub.id, sub)).collect();

    let mut set: HashSet<TargetId> = if options.select.is_empty()
        && options.in_projects.is_empty()
        && options.upstream_of.is_empty()
        && options.downstream_of.is_empty()
        && !options.upstream
        && !options.downstream
    {
        subprojects.iter().map(|sub| sub.id.clone()).collect()
    } else {
        let mut set = HashSet::new();
        for raw in options.select.iter().chain(&options.in_projects) {
            set.insert(graph.resolve_name(raw)?);
        }
        for raw in &options.upstream_of {
            let anchor = graph.resolve_name(raw)?;
            set.extend(graph.upstream_keys(&anchor));
            set.insert(anchor);
        }
        for raw in &options.downstream_of {
            let anchor = graph.resolve_name(raw)?;
            set.extend(graph.downstream_keys(&anchor));
            set.insert(anchor);
        }
        if options.upstream || options.downstream {
            let anchor = anchor.ok_or(SelectError::NoAnchor)?;
            if options.upstream {
                set.extend(graph.upstream_keys(anchor));
            }
            if options.downstream {
                set.extend(graph.downstream_keys(anchor));
            }
            set.insert(anchor.clone());
        }
        set
    };

    for raw in &options.skip {
        set.remove(&graph.resolve_name(raw)?);
    }

    let mut ordered = graph.linearize(&set);

    if let Some(raw) = &options.start {
        // Resolved against the full candidate namespace, not the
        // filtered set; failure to resolve is an error either way.
        let start = graph.resolve_name(raw)?;
        match ordered.iter().position(|id| *id == start) {
            Some(pos) => {
                debug!(start = %start, dropped = pos, "resuming mid-order");
                ordered.drain(..pos);
            }
            None => {
                warn!(start = %start, "start target is not in the selection; nothing to run");
                ordered.clear();
            }
        }
    }

    if let Some(marker) = options.marker() {
        let mut changed = Vec::with_capacity(ordered.len());
        for id in ordered {
            let Some(sub) = by_id.get(&id) else { continue };
            if fingerprints.changed(marker, sub)? {
                changed.push(id);
            } else {
                debug!(target = %id, marker, "unchanged; skipping");
            }
        }
        ordered = changed;
    }

    Ok(ordered
        .into_iter()
        .enumerate()
        .map(|(ordinal, id)| Target { ordinal, id })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sub(name: &str, deps: &[&str], decl_index: usize) -> Subproject {
        Subproject {
            id: TargetId::bare(name),
            path: name.into(),
            dependencies: deps.iter().map(|d| TargetId::bare(*d)).collect(),
            decl_index,
        }
    }

    /// a <- b <- c, plus d depending on a only
    fn fixture() -> (Vec<Subproject>, DependencyGraph, FingerprintStore, TempDir) {
        let subprojects = vec![
            sub("a", &[], 0),
            sub("b", &["a"], 1),
            sub("c", &["b"], 2),
            sub("d", &["a"], 3),
        ];
        let graph = DependencyGraph::build(&subprojects).unwrap();
        let temp = TempDir::new().unwrap();
        let store = FingerprintStore::new(temp.path());
        (subprojects, graph, store, temp)
    }

    fn names(targets: &[Target]) -> Vec<&str> {
        targets.iter().map(|t| t.id.name.as_str()).collect()
    }

    #[test]
    fn test_ordinals_are_contiguous() {
        let (subprojects, graph, store, _temp) = fixture();
        let targets =
            select_targets(&subprojects, &graph, &RunOptions::default(), &store, None).unwrap();

        assert_eq!(names(&targets), vec!["a", "b", "c", "d"]);
        for (expected, target) in targets.iter().enumerate() {
            assert_eq!(target.ordinal, expected);
        }
    }

    #[test]
    fn test_start_drops_prefix() {
        let (subprojects, graph, store, _temp) = fixture();
        let options = RunOptions {
            start: Some("c".to_string()),
            ..Default::default()
        };
        let targets = select_targets(&subprojects, &graph, &options, &store, None).unwrap();

        assert_eq!(names(&targets), vec!["c", "d"]);
        assert_eq!(targets[0].ordinal, 0);
        assert_eq!(targets[1].ordinal, 1);
    }

    #[test]
    fn test_start_unresolved_is_an_error() {
        let (subprojects, graph, store, _temp) = fixture();
        let options = RunOptions {
            start: Some("nope".to_string()),
            ..Default::default()
        };
        let err = select_targets(&subprojects, &graph, &options, &store, None).unwrap_err();
        assert!(matches!(
            err,
            SelectError::Graph(GraphError::UnresolvedTarget(_))
        ));
    }

    #[test]
    fn test_skip_removes_targets() {
        let (subprojects, graph, store, _temp) = fixture();
        let options = RunOptions {
            skip: vec!["b".to_string()],
            ..Default::default()
        };
        let targets = select_targets(&subprojects, &graph, &options, &store, None).unwrap();
        assert_eq!(names(&targets), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_upstream_of_closure() {
        let (subprojects, graph, store, _temp) = fixture();
        let options = RunOptions {
            upstream_of: vec!["c".to_string()],
            ..Default::default()
        };
        let targets = select_targets(&subprojects, &graph, &options, &store, None).unwrap();
        assert_eq!(names(&targets), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_downstream_of_closure() {
        let (subprojects, graph, store, _temp) = fixture();
        let options = RunOptions {
            downstream_of: vec!["a".to_string()],
            ..Default::default()
        };
        let targets = select_targets(&subprojects, &graph, &options, &store, None).unwrap();
        assert_eq!(names(&targets), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_upstream_from_working_directory_anchor() {
        let (subprojects, graph, store, _temp) = fixture();
        let options = RunOptions {
            upstream: true,
            ..Default::default()
        };
        let anchor = TargetId::bare("c");
        let targets =
            select_targets(&subprojects, &graph, &options, &store, Some(&anchor)).unwrap();
        assert_eq!(names(&targets), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_downstream_from_working_directory_anchor() {
        let (subprojects, graph, store, _temp) = fixture();
        let options = RunOptions {
            downstream: true,
            ..Default::default()
        };
        let anchor = TargetId::bare("a");
        let targets =
            select_targets(&subprojects, &graph, &options, &store, Some(&anchor)).unwrap();
        assert_eq!(names(&targets), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_cwd_relative_filter_without_anchor_is_an_error() {
        let (subprojects, graph, store, _temp) = fixture();
        let options = RunOptions {
            upstream: true,
            ..Default::default()
        };
        let err = select_targets(&subprojects, &graph, &options, &store, None).unwrap_err();
        assert!(matches!(err, SelectError::NoAnchor));
    }

    #[test]
    fn test_select_union_minus_skip() {
        let (subprojects, graph, store, _temp) = fixture();
        let options = RunOptions {
            select: vec!["b".to_string()],
            downstream_of: vec!["b".to_string()],
            skip: vec!["b".to_string()],
            ..Default::default()
        };
        let targets = select_targets(&subprojects, &graph, &options, &store, None).unwrap();
        assert_eq!(names(&targets), vec!["c"]);
    }

    #[test]
    fn test_changed_marker_filters_unchanged() {
        let (subprojects, graph, store, temp) = fixture();
        for sub in &subprojects {
            std::fs::create_dir_all(temp.path().join(&sub.path)).unwrap();
        }
        // Record fingerprints for b and d; they become "unchanged"
        store.save("tested", &subprojects[1]).unwrap();
        store.save("tested", &subprojects[3]).unwrap();

        let options = RunOptions {
            changed: Some("tested".to_string()),
            ..Default::default()
        };
        let targets = select_targets(&subprojects, &graph, &options, &store, None).unwrap();
        assert_eq!(names(&targets), vec!["a", "c"]);
        assert_eq!(targets[1].ordinal, 1);
    }
}
