pub mod rules;
pub mod union_find;

use ahash::AHashMap;
use serde::Serialize;
use tracing::debug;

use crate::detect::filename::is_root;
use crate::detect::{DetectorOutput, DetectorSet};
use crate::error::DetectorError;
use crate::preferences::Preferences;
use crate::storage::models::{Algorithm, FileRecord};
use union_find::UnionFind;

/// Resolved search output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    /// Clusters of two or more records, keeper first.
    clusters: Vec<Vec<FileRecord>>,
    /// Records no detector linked to another record.
    standalone: Vec<FileRecord>,
    pub errors: Vec<DetectorError>,
}

impl SearchResults {
    pub fn clusters(&self) -> &[Vec<FileRecord>] {
        &self.clusters
    }

    pub fn standalone(&self) -> &[FileRecord] {
        &self.standalone
    }

    /// Every cluster, followed by each standalone record as a group of one.
    pub fn groups(&self) -> Vec<Vec<FileRecord>> {
        self.clusters
            .iter()
            .cloned()
            .chain(self.standalone.iter().map(|r| vec![r.clone()]))
            .collect()
    }

    /// Like `groups`, without unique records nothing flagged.
    pub fn relevant(&self) -> Vec<Vec<FileRecord>> {
        self.clusters
            .iter()
            .cloned()
            .chain(
                self.standalone
                    .iter()
                    .filter(|r| !r.is_pure_keep())
                    .map(|r| vec![r.clone()]),
            )
            .collect()
    }

    pub fn flat(&self) -> Vec<FileRecord> {
        self.clusters
            .iter()
            .flatten()
            .chain(self.standalone.iter())
            .cloned()
            .collect()
    }

    /// Ids of every record not tagged `Keep`.
    pub fn removal_ids(&self) -> Vec<i64> {
        self.clusters
            .iter()
            .flatten()
            .chain(self.standalone.iter())
            .filter(|r| !r.is_kept())
            .map(|r| r.id)
            .collect()
    }
}

/// Merge detector outputs into clusters and pick one keeper per cluster.
pub fn resolve(
    mut records: Vec<FileRecord>,
    outputs: &[DetectorOutput],
    pref: &Preferences,
    detectors: &DetectorSet,
) -> SearchResults {
    let n = records.len();
    let mut uf = UnionFind::new(n);
    let mut linked_by: Vec<Vec<Algorithm>> = vec![Vec::new(); n];
    let mut marked_by: Vec<Vec<Algorithm>> = vec![Vec::new(); n];
    let index: AHashMap<i64, usize> = records.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    let mut errors = Vec::new();

    for output in outputs {
        for group in output.groups.iter().filter(|g| g.len() > 1) {
            uf.union_all(group);
            for &i in group {
                linked_by[i].push(output.algorithm);
            }
        }
        for &i in &output.marks {
            marked_by[i].push(output.algorithm);
        }
        for &i in &output.flags {
            records[i].tag(output.algorithm);
            if output.algorithm.is_removal_flag() {
                records[i].untag(Algorithm::Keep);
            }
        }
        for error in &output.errors {
            if let Some(&i) = index.get(&error.record_id) {
                records[i].tag(Algorithm::Errored);
            }
            errors.push(error.clone());
        }
    }

    let uses_roots = detectors.uses_roots();
    let mut clusters_idx: Vec<Vec<usize>> = Vec::new();
    let mut standalone_idx: Vec<usize> = Vec::new();

    for set in uf.sets() {
        if set.len() == 1 {
            let i = set[0];
            if !records[i].has_removal_flag() {
                records[i].tag(Algorithm::Keep);
            }
            standalone_idx.push(i);
            continue;
        }

        let keeper = choose_keeper(&set, &records, pref, uses_roots);
        for &i in &set {
            if Some(i) == keeper {
                records[i].tag(Algorithm::Keep);
                continue;
            }
            records[i].untag(Algorithm::Keep);
            for &algorithm in linked_by[i].iter().chain(marked_by[i].iter()) {
                records[i].tag(algorithm);
            }
        }

        let mut ordered = set;
        ordered.sort_by_key(|&i| (Some(i) != keeper, records[i].id));
        clusters_idx.push(ordered);
    }
    debug!(
        "Resolved {} clusters and {} standalone records",
        clusters_idx.len(),
        standalone_idx.len()
    );

    let mut slots: Vec<Option<FileRecord>> = records.into_iter().map(Some).collect();
    let mut take = |i: usize| slots[i].take().unwrap_or_default();
    let clusters = clusters_idx
        .into_iter()
        .map(|set| set.into_iter().map(&mut take).collect())
        .collect();
    let standalone = standalone_idx.into_iter().map(&mut take).collect();

    SearchResults {
        clusters,
        standalone,
        errors,
    }
}

/// The keep choice for one cluster. Members carrying a removal flag are never kept;
/// if all of them do, the cluster has no keeper.
fn choose_keeper(
    set: &[usize],
    records: &[FileRecord],
    pref: &Preferences,
    uses_roots: bool,
) -> Option<usize> {
    let mut candidates: Vec<usize> = set
        .iter()
        .copied()
        .filter(|&i| !records[i].has_removal_flag())
        .collect();
    if candidates.is_empty() {
        return None;
    }

    if uses_roots {
        narrow(&mut candidates, |i| is_root(&records[i], pref));
        narrow(&mut candidates, |i| !pref.has_audiosuite_tag(&records[i].filename));
    }
    rules::select_keeper(&candidates, records, &pref.preservation_order)
}

/// Keep only matching candidates, unless that would keep none or all of them.
fn narrow<F: Fn(usize) -> bool>(candidates: &mut Vec<usize>, keep: F) {
    let narrowed: Vec<usize> = candidates.iter().copied().filter(|&i| keep(i)).collect();
    if !narrowed.is_empty() && narrowed.len() < candidates.len() {
        *candidates = narrowed;
    }
}
