use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::detect::filename::root_name;
use crate::detect::{self, DetectorOutput, DetectorSet, SearchContext};
use crate::error::{Error, SearchAborted};
use crate::preferences::Preferences;
use crate::progress::{self, CancelToken, StatusChannel, StatusReporter};
use crate::resolve::{self, SearchResults};
use crate::storage::models::RecordId;
use crate::storage::{CacheValue, Database};
use crate::store::{self, Source};

/// Runtime knobs of one search that are not user preferences.
pub struct SearchOptions<'a> {
    pub ignore_patterns: &'a [String],
    pub decode_threads: usize,
    pub cancel: &'a CancelToken,
    pub reporter: &'a dyn StatusReporter,
}

/// Load, detect, cache and resolve.
pub fn search(
    source: &Source,
    detectors: &DetectorSet,
    pref: &Preferences,
    opts: &SearchOptions,
) -> Result<SearchResults, Error> {
    let started = Instant::now();
    let reporter = opts.reporter;
    progress::emit(reporter, StatusChannel::Search, "starting", 0, "Loading records");

    let mut set = store::load(source, pref, opts.ignore_patterns)?;
    if let Err(aborted) = opts.cancel.check() {
        return Err(abort(reporter, aborted));
    }

    if detectors.uses_roots() {
        set.records_mut()
            .par_iter_mut()
            .for_each(|record| record.root = root_name(record, pref));
    }
    progress::emit(
        reporter,
        StatusChannel::Search,
        "dupes",
        10,
        format!(
            "Searching {} records with {} detectors",
            set.size(),
            detectors.configs().len()
        ),
    );

    let decode_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.decode_threads.max(1))
        .thread_name(|i| format!("smdb-decode-{}", i))
        .build()
        .map_err(|err| Error::Other(format!("could not start decode workers: {}", err)))?;

    let ctx = SearchContext {
        records: set.records(),
        pref,
        detectors,
        cancel: opts.cancel,
        reporter,
        decode_pool: &decode_pool,
    };
    let outputs = detect::run_all(&ctx).map_err(|aborted| abort(reporter, aborted))?;

    if let Source::Database(path) = source {
        write_cache(path, &set, &outputs);
    }

    let results = resolve::resolve(set.into_records(), &outputs, pref, detectors);
    let removals = results.removal_ids().len();
    progress::emit(
        reporter,
        StatusChannel::Search,
        "complete",
        100,
        format!("Found {} records to remove", removals),
    );
    info!(
        "Search finished in {:.2}s: {} clusters, {} records to remove, {} errors",
        started.elapsed().as_secs_f64(),
        results.clusters().len(),
        removals,
        results.errors.len()
    );
    Ok(results)
}

fn abort(reporter: &dyn StatusReporter, aborted: SearchAborted) -> Error {
    let stage = match aborted {
        SearchAborted::Cancelled => "cancelled",
        SearchAborted::Failed(_) => "failed",
    };
    progress::emit(reporter, StatusChannel::Search, stage, 100, aborted.to_string());
    info!("Search stopped: {}", aborted);
    Error::Aborted(aborted)
}

/// Persist fingerprints and dual-mono results. Failures only cost a recompute next time.
fn write_cache(path: &std::path::Path, set: &store::RecordSet, outputs: &[DetectorOutput]) {
    let writes: Vec<(RecordId, CacheValue)> = outputs
        .iter()
        .flat_map(|o| o.cache.iter())
        .map(|(i, value)| (set.records()[*i].id, value.clone()))
        .collect();
    if writes.is_empty() {
        return;
    }
    match Database::open(path).and_then(|db| db.store_cache(&writes)) {
        Ok(n) => debug!("Stored {} cached results in {}", n, path.display()),
        Err(err) => warn!("Could not cache results in {}: {}", path.display(), err),
    }
}
