use chrono::{NaiveDate, NaiveDateTime};

use crate::preferences::{Operator, PreservationRule};
use crate::storage::models::{parse_duration, FileRecord};

/// Numeric sort key for `Largest`/`Smallest`: integers, decimals, durations and
/// `YYYY-MM-DD HH:MM:SS` datetimes. Anything else has no key.
pub fn parse_sort_key(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(n) = value.parse::<f64>() {
        return n.is_finite().then_some(n);
    }
    if value.contains(':') && !value.contains('-') {
        if let Some(secs) = parse_duration(value) {
            return Some(secs);
        }
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp() as f64);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp() as f64);
    }
    None
}

fn matches(rule: &PreservationRule, record: &FileRecord) -> bool {
    let value = record.value(&rule.column);
    let value = value.as_deref();
    let variable = rule.variable.as_str();
    match rule.operator {
        Operator::Is => value == Some(variable),
        Operator::IsNot => value != Some(variable),
        Operator::Contains => value.map_or(false, |v| v.contains(variable)),
        Operator::DoesNotContain => !value.map_or(false, |v| v.contains(variable)),
        Operator::IsEmpty => value.map_or(true, |v| v.trim().is_empty()),
        Operator::IsNotEmpty => value.map_or(false, |v| !v.trim().is_empty()),
        Operator::Largest | Operator::Smallest => true,
    }
}

/// Narrow `candidates` by one rule. Returns `None` when the rule does not
/// discriminate, i.e. it would keep everyone or no one.
pub fn apply_rule(
    rule: &PreservationRule,
    candidates: &[usize],
    records: &[FileRecord],
) -> Option<Vec<usize>> {
    let narrowed: Vec<usize> = match rule.operator {
        Operator::Largest | Operator::Smallest => {
            let keyed: Vec<(usize, f64)> = candidates
                .iter()
                .filter_map(|&i| {
                    records[i]
                        .value(&rule.column)
                        .and_then(|v| parse_sort_key(&v))
                        .map(|k| (i, k))
                })
                .collect();
            let best = keyed.iter().map(|(_, k)| *k).reduce(|a, b| {
                if rule.operator == Operator::Largest {
                    a.max(b)
                } else {
                    a.min(b)
                }
            })?;
            keyed
                .into_iter()
                .filter(|(_, k)| *k == best)
                .map(|(i, _)| i)
                .collect()
        }
        _ => candidates
            .iter()
            .copied()
            .filter(|&i| matches(rule, &records[i]))
            .collect(),
    };
    (!narrowed.is_empty() && narrowed.len() < candidates.len()).then_some(narrowed)
}

/// Run the cascade and return the chosen index. Ties after all rules go to the
/// lowest record id.
pub fn select_keeper(
    candidates: &[usize],
    records: &[FileRecord],
    rules: &[PreservationRule],
) -> Option<usize> {
    let mut remaining = candidates.to_vec();
    for rule in rules {
        if remaining.len() <= 1 {
            break;
        }
        if let Some(narrowed) = apply_rule(rule, &remaining, records) {
            remaining = narrowed;
        }
    }
    remaining.into_iter().min_by_key(|&i| records[i].id)
}
