use ahash::AHashSet;
use rayon::prelude::*;
use std::path::Path;
use tracing::info;

use super::basic::match_key;
use super::filename::root_name;
use super::{DetectorOutput, SearchContext};
use crate::error::SearchAborted;
use crate::storage::models::Algorithm;
use crate::storage::Database;

/// Flag current records that also appear in another database. The other database is
/// opened read-only.
pub fn detect(ctx: &SearchContext, db_path: &Path) -> Result<DetectorOutput, SearchAborted> {
    let mut output = DetectorOutput::new(Algorithm::Compare);
    let failed = |err: &dyn std::fmt::Display| {
        SearchAborted::Failed(format!("compare database {}: {}", db_path.display(), err))
    };

    let db = Database::open_for_load(db_path).map_err(|e| failed(&e))?;
    let schema = db.table_columns().map_err(|e| failed(&e))?;

    let criteria = &ctx.pref.match_criteria;
    let all_present = !criteria.is_empty()
        && criteria
            .iter()
            .all(|c| schema.iter().any(|s| s.eq_ignore_ascii_case(c)));
    let used: Vec<String> = if all_present {
        criteria.clone()
    } else {
        vec!["Filename".to_string()]
    };
    let use_root = ctx.detectors.uses_roots();

    let mut external = db.load_records(&used, false).map_err(|e| failed(&e))?;
    if use_root {
        external
            .par_iter_mut()
            .for_each(|record| record.root = root_name(record, ctx.pref));
    }
    let keys: AHashSet<Vec<String>> = external
        .par_iter()
        .map(|record| match_key(record, &used, use_root))
        .collect::<Vec<_>>()
        .into_iter()
        .collect();

    output.flags = ctx
        .records
        .par_iter()
        .enumerate()
        .filter(|(_, record)| keys.contains(&match_key(record, &used, use_root)))
        .map(|(i, _)| i)
        .collect();
    info!(
        "{} of {} records also appear in {}",
        output.flags.len(),
        ctx.records.len(),
        db_path.display()
    );
    Ok(output)
}
