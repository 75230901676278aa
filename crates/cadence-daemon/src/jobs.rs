// Diffing a freshly scanned job source against the loaded jobs.
use cadence_common::{JobChangeResult, JobSpec};
use std::collections::BTreeMap;

/// Compute the difference between the loaded jobs and a fresh scan.
///
/// The three lists are disjoint by construction and sorted because both
/// maps iterate in key order.
pub fn diff_jobs(
    current: &BTreeMap<String, JobSpec>,
    next: &BTreeMap<String, JobSpec>,
    dry_run: bool,
) -> JobChangeResult {
    let removed = current
        .keys()
        .filter(|id| !next.contains_key(*id))
        .cloned()
        .collect();
    let added = next
        .keys()
        .filter(|id| !current.contains_key(*id))
        .cloned()
        .collect();
    let changed = next
        .iter()
        .filter(|(id, spec)| current.get(*id).map_or(false, |old| old != *spec))
        .map(|(id, _)| id.clone())
        .collect();

    JobChangeResult {
        removed,
        added,
        changed,
        dry_run,
    }
}
