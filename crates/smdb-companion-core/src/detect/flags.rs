use rayon::prelude::*;

use super::{DetectorOutput, SearchContext};
use crate::storage::models::{Algorithm, FileRecord};

fn flag_where<F>(ctx: &SearchContext, algorithm: Algorithm, predicate: F) -> DetectorOutput
where
    F: Fn(&FileRecord) -> bool + Sync,
{
    let mut output = DetectorOutput::new(algorithm);
    output.flags = ctx
        .records
        .par_iter()
        .enumerate()
        .filter(|(_, record)| predicate(record))
        .map(|(i, _)| i)
        .collect();
    output
}

/// Records shorter than `min_dur` seconds. Unparseable durations are left alone.
pub fn detect_short(ctx: &SearchContext, min_dur: f64) -> DetectorOutput {
    flag_where(ctx, Algorithm::Duration, |record| {
        record.duration_secs().map_or(false, |secs| secs < min_dur)
    })
}

/// Records whose full path contains any autoselect string.
pub fn detect_file_tags(ctx: &SearchContext) -> DetectorOutput {
    let autoselects: Vec<&str> = ctx
        .pref
        .autoselects
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    flag_where(ctx, Algorithm::FileTags, |record| {
        let full = record.full_path();
        let full = full.to_string_lossy();
        autoselects.iter().any(|tag| full.contains(tag))
    })
}

/// Records that do not point at an existing regular file.
pub fn detect_invalid_paths(ctx: &SearchContext) -> DetectorOutput {
    flag_where(ctx, Algorithm::InvalidPath, |record| {
        record.filename.is_empty() || !record.full_path().is_file()
    })
}
