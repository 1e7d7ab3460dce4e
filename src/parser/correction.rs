//! Post-parse fixes applied to every recovered batch. Never fails; each
//! anomaly becomes a log line and a best-effort repair.

use std::collections::HashSet;
use tracing::{debug, warn};

use super::subtask::{RawSubtask, Subtask, SubtaskBatch, SubtaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    SelfReference,
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedDependency {
    pub subtask_id: u32,
    pub dependency: i64,
    pub reason: DropReason,
}

/// What the correction pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionReport {
    /// (declared id, assigned id)
    pub renumbered: Vec<(i64, u32)>,
    pub dropped_dependencies: Vec<DroppedDependency>,
    /// Trailing subtasks discarded because the id space ran out
    pub dropped_subtasks: usize,
    /// (expected, actual) when the model produced a different number of subtasks
    pub count_mismatch: Option<(usize, usize)>,
}

impl CorrectionReport {
    pub fn is_clean(&self) -> bool {
        self.renumbered.is_empty()
            && self.dropped_dependencies.is_empty()
            && self.dropped_subtasks == 0
            && self.count_mismatch.is_none()
    }
}

pub fn correct(
    mut raw: Vec<RawSubtask>,
    start_id: u32,
    expected_count: usize,
) -> (SubtaskBatch, CorrectionReport) {
    let mut report = CorrectionReport::default();

    // Sequential ids from start_id; stops at u32::MAX instead of wrapping
    let mut next = Some(start_id);
    let mut ids = Vec::with_capacity(raw.len());
    for item in &raw {
        let Some(id) = next else {
            break;
        };
        if item.id != i64::from(id) {
            warn!("Correcting subtask id {} -> {}", item.id, id);
            report.renumbered.push((item.id, id));
        }
        ids.push(id);
        next = id.checked_add(1);
    }

    if ids.len() < raw.len() {
        report.dropped_subtasks = raw.len() - ids.len();
        warn!(
            "Subtask ids exhausted at {}; dropping {} trailing subtasks",
            u32::MAX,
            report.dropped_subtasks
        );
        raw.truncate(ids.len());
    }

    let count = raw.len();
    let range_start = i64::from(start_id);
    let range_end = range_start + count as i64;

    let subtasks = raw
        .into_iter()
        .zip(ids)
        .map(|(item, id)| {
            if let Some(status) = item.status.as_deref() {
                if status != "pending" {
                    debug!("Subtask {} status '{}' reset to pending", id, status);
                }
            }

            let mut seen = HashSet::new();
            let mut dependencies = Vec::new();
            for dep in item.dependencies.unwrap_or_default() {
                let reason = if dep == i64::from(id) {
                    Some(DropReason::SelfReference)
                } else if dep < range_start || dep >= range_end {
                    Some(DropReason::OutOfRange)
                } else {
                    None
                };

                match reason {
                    Some(reason) => {
                        warn!(
                            "Dropping dependency {} from subtask {} ({:?}, valid range {}..{})",
                            dep, id, reason, range_start, range_end
                        );
                        report.dropped_dependencies.push(DroppedDependency {
                            subtask_id: id,
                            dependency: dep,
                            reason,
                        });
                    }
                    None => {
                        // In range, so it fits in u32
                        let dep = dep as u32;
                        if seen.insert(dep) {
                            dependencies.push(dep);
                        }
                    }
                }
            }

            Subtask {
                id,
                title: item.title,
                description: item.description,
                dependencies,
                details: item.details,
                status: SubtaskStatus::Pending,
                test_strategy: item.test_strategy,
            }
        })
        .collect::<Vec<_>>();

    if count != expected_count {
        warn!(
            "Expected {} subtasks but model produced {}; keeping all",
            expected_count, count
        );
        report.count_mismatch = Some((expected_count, count));
    }

    (SubtaskBatch { subtasks }, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: i64, deps: Option<Vec<i64>>) -> RawSubtask {
        RawSubtask {
            id,
            title: format!("Subtask {}", id),
            description: "A description long enough".to_string(),
            dependencies: deps,
            details: "Details that are long enough to pass".to_string(),
            status: Some("done".to_string()),
            test_strategy: None,
        }
    }

    #[test]
    fn test_clean_batch_untouched() {
        let (batch, report) = correct(
            vec![raw(1, Some(vec![])), raw(2, Some(vec![1])), raw(3, Some(vec![1, 2]))],
            1,
            3,
        );
        assert!(report.is_clean());
        assert_eq!(batch.ids(), vec![1, 2, 3]);
        assert_eq!(batch.subtasks[2].dependencies, vec![1, 2]);
    }

    #[test]
    fn test_status_forced_pending() {
        let (batch, _) = correct(vec![raw(1, None)], 1, 1);
        assert_eq!(batch.subtasks[0].status, SubtaskStatus::Pending);
        assert!(batch.subtasks[0].dependencies.is_empty());
    }

    #[test]
    fn test_renumbers_from_offset() {
        let (batch, report) =
            correct(vec![raw(1, None), raw(1, None), raw(9, None)], 4, 3);
        assert_eq!(batch.ids(), vec![4, 5, 6]);
        assert_eq!(report.renumbered, vec![(1, 4), (1, 5), (9, 6)]);
    }

    #[test]
    fn test_drops_self_and_out_of_range_dependencies() {
        let (batch, report) = correct(
            vec![
                raw(1, Some(vec![1, 2])),
                raw(2, Some(vec![0, 1, 1, 3, 99, -4])),
            ],
            1,
            2,
        );
        assert_eq!(batch.subtasks[0].dependencies, vec![2]);
        assert_eq!(batch.subtasks[1].dependencies, vec![1]);

        let reasons: Vec<_> = report
            .dropped_dependencies
            .iter()
            .map(|d| (d.subtask_id, d.dependency, d.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (1, 1, DropReason::SelfReference),
                (2, 0, DropReason::OutOfRange),
                (2, 3, DropReason::OutOfRange),
                (2, 99, DropReason::OutOfRange),
                (2, -4, DropReason::OutOfRange),
            ]
        );
    }

    #[test]
    fn test_count_mismatch_is_not_fatal() {
        let (batch, report) = correct(vec![raw(1, None), raw(2, None)], 1, 5);
        assert_eq!(batch.len(), 2);
        assert_eq!(report.count_mismatch, Some((5, 2)));
    }

    #[test]
    fn test_invariants_hold_for_arbitrary_ids() {
        // Pseudo-random ids and dependencies; output must stay unique and in range
        let mut seed: i64 = 17;
        let mut next = || {
            seed = (seed * 1103515245 + 12345) % 2147483648;
            seed % 13 - 3
        };

        for start_id in [1u32, 5, 40] {
            for n in 0..8usize {
                let items: Vec<_> = (0..n)
                    .map(|_| raw(next(), Some((0..4).map(|_| next()).collect())))
                    .collect();
                let (batch, _) = correct(items, start_id, n);

                let ids = batch.ids();
                let unique: HashSet<_> = ids.iter().collect();
                assert_eq!(unique.len(), ids.len());

                let end = start_id + n as u32;
                for s in &batch.subtasks {
                    assert!(s.id >= start_id && s.id < end);
                    for d in &s.dependencies {
                        assert_ne!(*d, s.id);
                        assert!(*d >= start_id && *d < end);
                    }
                }
            }
        }
    }

    #[test]
    fn test_last_id_is_assignable() {
        let (batch, report) = correct(vec![raw(1, Some(vec![1]))], u32::MAX, 1);
        assert_eq!(batch.ids(), vec![u32::MAX]);
        assert_eq!(report.renumbered, vec![(1, u32::MAX)]);
        assert_eq!(report.dropped_subtasks, 0);
    }

    #[test]
    fn test_id_space_exhausted_drops_tail() {
        let (batch, report) = correct(
            vec![raw(1, None), raw(2, Some(vec![1])), raw(3, None)],
            u32::MAX - 1,
            3,
        );
        assert_eq!(batch.ids(), vec![u32::MAX - 1, u32::MAX]);
        // 1 lies below the assigned range
        assert!(batch.subtasks[1].dependencies.is_empty());
        assert_eq!(report.dropped_subtasks, 1);
        assert_eq!(report.count_mismatch, Some((3, 2)));
        assert!(!report.is_clean());
    }
}
