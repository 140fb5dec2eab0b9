use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{record_error, DetectorOutput, SearchContext};
use crate::audio::{self, AudioError};
use crate::error::SearchAborted;
use crate::progress::{self, StatusChannel, RECORD_DIVISOR};
use crate::storage::models::Algorithm;
use crate::storage::CacheValue;

enum Outcome {
    Cached(bool),
    Computed(bool),
    Failed(String),
    Cancelled,
}

/// Multi-channel files whose channels carry identical samples.
pub fn detect(ctx: &SearchContext) -> Result<DetectorOutput, SearchAborted> {
    let mut output = DetectorOutput::new(Algorithm::DualMono);
    let candidates: Vec<usize> = ctx
        .records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.channels >= 2)
        .map(|(i, _)| i)
        .collect();
    let total = candidates.len();
    progress::emit(
        ctx.reporter,
        StatusChannel::SearchSub,
        "dual_mono",
        0,
        format!("Checking {} multichannel files", total),
    );

    let done = AtomicUsize::new(0);
    let outcomes: Vec<(usize, Outcome)> = ctx.decode_pool.install(|| {
        candidates
            .par_iter()
            .map(|&i| {
                let record = &ctx.records[i];
                if ctx.cancel.is_cancelled() {
                    return (i, Outcome::Cancelled);
                }
                let cached = if ctx.pref.fetch_waveforms {
                    record.dual_mono
                } else {
                    None
                };
                let outcome = match cached {
                    Some(identical) => Outcome::Cached(identical),
                    None => match audio::channels_identical(&record.full_path(), Some(ctx.cancel)) {
                        Ok(identical) => Outcome::Computed(identical),
                        Err(AudioError::Cancelled) => Outcome::Cancelled,
                        Err(err) => Outcome::Failed(err.to_string()),
                    },
                };
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if n % RECORD_DIVISOR == 0 {
                    progress::emit(
                        ctx.reporter,
                        StatusChannel::SearchSub,
                        "dual_mono",
                        progress::percent(n, total),
                        format!("Checked {}/{}", n, total),
                    );
                }
                (i, outcome)
            })
            .collect()
    });

    if ctx.cancel.is_cancelled() || outcomes.iter().any(|(_, o)| matches!(o, Outcome::Cancelled)) {
        return Err(SearchAborted::Cancelled);
    }

    for (i, outcome) in outcomes {
        match outcome {
            Outcome::Cached(identical) => {
                if identical {
                    output.flags.push(i);
                }
            }
            Outcome::Computed(identical) => {
                if identical {
                    output.flags.push(i);
                }
                if ctx.pref.store_waveforms {
                    output.cache.push((i, CacheValue::DualMono(identical)));
                }
            }
            Outcome::Failed(message) => {
                output
                    .errors
                    .push(record_error(&ctx.records[i], Algorithm::DualMono, message));
            }
            Outcome::Cancelled => {}
        }
    }

    progress::emit(
        ctx.reporter,
        StatusChannel::SearchSub,
        "dual_mono",
        100,
        format!("{} dual mono files", output.flags.len()),
    );
    Ok(output)
}
