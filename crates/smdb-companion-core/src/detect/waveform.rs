use ahash::AHashMap;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use super::{record_error, DetectorOutput, SearchContext};
use crate::audio::{self, AudioError, Fingerprint};
use crate::error::SearchAborted;
use crate::preferences::WaveformMode;
use crate::progress::{self, StatusChannel, RECORD_DIVISOR};
use crate::storage::models::Algorithm;
use crate::storage::CacheValue;

enum Outcome {
    Cached(Fingerprint),
    Computed(Fingerprint),
    Failed(String),
    Cancelled,
}

pub fn detect(ctx: &SearchContext) -> Result<DetectorOutput, SearchAborted> {
    let mut output = DetectorOutput::new(Algorithm::Waveforms);
    let total = ctx.records.len();
    progress::emit(
        ctx.reporter,
        StatusChannel::SearchSub,
        "waveform",
        0,
        format!("Fingerprinting {} files", total),
    );

    let done = AtomicUsize::new(0);
    let outcomes: Vec<Outcome> = ctx.decode_pool.install(|| {
        ctx.records
            .par_iter()
            .map(|record| {
                if ctx.cancel.is_cancelled() {
                    return Outcome::Cancelled;
                }
                let cached = ctx
                    .pref
                    .fetch_waveforms
                    .then(|| record.fingerprint.as_deref().and_then(Fingerprint::from_hex))
                    .flatten();
                let outcome = match cached {
                    Some(fp) => Outcome::Cached(fp),
                    None => match audio::decode_mono(&record.full_path(), Some(ctx.cancel)) {
                        Ok((samples, _)) => Outcome::Computed(Fingerprint::from_samples(&samples)),
                        Err(AudioError::Cancelled) => Outcome::Cancelled,
                        Err(err) => Outcome::Failed(err.to_string()),
                    },
                };

                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if n % RECORD_DIVISOR == 0 {
                    progress::emit(
                        ctx.reporter,
                        StatusChannel::SearchSub,
                        "waveform",
                        progress::percent(n, total),
                        format!("Fingerprinted {}/{}", n, total),
                    );
                }
                outcome
            })
            .collect()
    });

    if ctx.cancel.is_cancelled() || outcomes.iter().any(|o| matches!(o, Outcome::Cancelled)) {
        info!("Waveform analysis cancelled");
        return Err(SearchAborted::Cancelled);
    }

    let mut fingerprints: Vec<(usize, Fingerprint)> = Vec::with_capacity(total);
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Outcome::Cached(fp) => fingerprints.push((i, fp)),
            Outcome::Computed(fp) => {
                if ctx.pref.store_waveforms {
                    output.cache.push((i, CacheValue::Fingerprint(fp.to_hex())));
                }
                fingerprints.push((i, fp));
            }
            Outcome::Failed(message) => {
                output
                    .errors
                    .push(record_error(&ctx.records[i], Algorithm::Waveforms, message));
            }
            Outcome::Cancelled => {}
        }
    }
    debug!(
        "{} fingerprints ready, {} to cache, {} failed",
        fingerprints.len(),
        output.cache.len(),
        output.errors.len()
    );

    output.groups = match ctx.pref.waveform_search_type {
        WaveformMode::Exact => exact_groups(&fingerprints),
        WaveformMode::Similar => similar_pairs(&fingerprints, ctx.pref.similarity_threshold),
    };

    progress::emit(
        ctx.reporter,
        StatusChannel::SearchSub,
        "waveform",
        100,
        format!("{} waveform groups", output.groups.len()),
    );
    Ok(output)
}

/// Bucket by hash, then split buckets on full equality.
fn exact_groups(fingerprints: &[(usize, Fingerprint)]) -> Vec<Vec<usize>> {
    let mut buckets: AHashMap<u64, Vec<&(usize, Fingerprint)>> = AHashMap::new();
    for entry in fingerprints {
        buckets.entry(entry.1.key()).or_default().push(entry);
    }

    let mut groups = Vec::new();
    for bucket in buckets.into_iter().map(|(_, b)| b).filter(|b| b.len() > 1) {
        let mut remaining = bucket;
        while let Some(first) = remaining.pop() {
            let (same, rest): (Vec<_>, Vec<_>) =
                remaining.into_iter().partition(|other| other.1 == first.1);
            if !same.is_empty() {
                let mut group: Vec<usize> = same.iter().map(|e| e.0).collect();
                group.push(first.0);
                group.sort_unstable();
                groups.push(group);
            }
            remaining = rest;
        }
    }
    groups.sort();
    groups
}

/// Every pair at or above `threshold` percent similarity.
fn similar_pairs(fingerprints: &[(usize, Fingerprint)], threshold: f64) -> Vec<Vec<usize>> {
    let mut pairs: Vec<Vec<usize>> = (0..fingerprints.len())
        .into_par_iter()
        .flat_map_iter(|a| {
            let (ia, fa) = &fingerprints[a];
            fingerprints[a + 1..]
                .iter()
                .filter(move |(_, fb)| fa.similarity(fb) * 100.0 >= threshold)
                .map(move |(ib, _)| vec![*ia, *ib])
        })
        .collect();
    pairs.sort();
    pairs
}
