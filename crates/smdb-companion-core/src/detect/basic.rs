use rayon::prelude::*;

use super::{DetectorOutput, SearchContext};
use crate::storage::models::{Algorithm, FileRecord};

/// Columns compared by parsed numeric value rather than text.
const NUMERIC_COLUMNS: &[&str] = &["Channels", "SampleRate", "BitDepth"];

/// Composite key over the match criteria. With `use_root` the Filename criterion
/// compares normalized roots.
pub fn match_key(record: &FileRecord, criteria: &[String], use_root: bool) -> Vec<String> {
    criteria
        .iter()
        .map(|column| {
            if use_root && column.eq_ignore_ascii_case("Filename") {
                return record.root.clone();
            }
            let value = record.value(column).unwrap_or_default();
            if NUMERIC_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                if let Ok(n) = value.trim().parse::<f64>() {
                    return n.to_string();
                }
            }
            value.into_owned()
        })
        .collect()
}

/// Sort-and-bucket over the composite key.
pub fn detect(ctx: &SearchContext) -> DetectorOutput {
    let mut output = DetectorOutput::new(Algorithm::Basic);
    let criteria = &ctx.pref.match_criteria;
    if criteria.is_empty() {
        return output;
    }
    let use_root = ctx.detectors.uses_roots();

    let keys: Vec<Vec<String>> = ctx
        .records
        .par_iter()
        .map(|record| match_key(record, criteria, use_root))
        .collect();
    output.groups = bucket(&keys);
    output
}

/// Group indices with equal keys; only buckets of two or more are returned.
pub(crate) fn bucket<K: Ord + Sync>(keys: &[K]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.par_sort_by(|&a, &b| keys[a].cmp(&keys[b]).then(a.cmp(&b)));

    let mut groups = Vec::new();
    let mut start = 0;
    for end in 1..=order.len() {
        if end == order.len() || keys[order[end]] != keys[order[start]] {
            if end - start > 1 {
                groups.push(order[start..end].to_vec());
            }
            start = end;
        }
    }
    groups
}
