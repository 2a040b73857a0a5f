use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-owned snapshot metadata as read back from the EC2 adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub snapshot_id: String,
    pub volume_id: String,
    pub start_time: DateTime<Utc>,
}

/// Which snapshots to delete and which to keep for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPlan {
    pub delete: Vec<SnapshotRecord>,
    pub retain: Vec<SnapshotRecord>,
}

/// Returns a new sequence ordered by `start_time` ascending (oldest first).
///
/// The sort is stable: snapshots sharing a start time keep the
/// provider-returned order, so repeated runs over the same listing produce
/// the same ordering. The input slice is not mutated.
pub fn order_by_start_time(snapshots: &[SnapshotRecord]) -> Vec<SnapshotRecord> {
    let mut ordered = snapshots.to_vec();
    ordered.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    ordered
}

/// Splits a volume's snapshots into a delete set and a retain set.
///
/// When `generation >= snapshots.len()` nothing is deleted. Otherwise the
/// `len - generation` oldest snapshots are deleted, leaving exactly
/// `generation` most-recent snapshots. Generation 0 therefore deletes every
/// fetched snapshot.
pub fn plan_retention(generation: usize, snapshots: &[SnapshotRecord]) -> RetentionPlan {
    if generation >= snapshots.len() {
        return RetentionPlan {
            delete: Vec::new(),
            retain: snapshots.to_vec(),
        };
    }

    let mut ordered = order_by_start_time(snapshots);
    let retain = ordered.split_off(snapshots.len() - generation);

    RetentionPlan {
        delete: ordered,
        retain,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn snapshot(snapshot_id: &str, epoch_secs: i64) -> SnapshotRecord {
        SnapshotRecord {
            snapshot_id: snapshot_id.to_string(),
            volume_id: "vol-1".to_string(),
            start_time: Utc.timestamp_opt(epoch_secs, 0).unwrap(),
        }
    }

    fn ids(records: &[SnapshotRecord]) -> Vec<&str> {
        records
            .iter()
            .map(|record| record.snapshot_id.as_str())
            .collect()
    }

    #[test]
    fn generation_at_least_count_deletes_nothing() {
        let snapshots = vec![snapshot("snap-1", 100), snapshot("snap-2", 200)];

        let plan = plan_retention(2, &snapshots);
        assert!(plan.delete.is_empty());
        assert_eq!(plan.retain.len(), 2);

        let plan = plan_retention(5, &snapshots);
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn excess_snapshots_delete_the_oldest_first() {
        let snapshots = vec![
            snapshot("snap-new", 300),
            snapshot("snap-old", 100),
            snapshot("snap-mid", 200),
        ];

        let plan = plan_retention(1, &snapshots);

        assert_eq!(ids(&plan.delete), vec!["snap-old", "snap-mid"]);
        assert_eq!(ids(&plan.retain), vec!["snap-new"]);
    }

    #[test]
    fn generation_zero_deletes_every_snapshot() {
        let snapshots: Vec<SnapshotRecord> = (0..5)
            .map(|index| snapshot(&format!("snap-{index}"), 100 + index))
            .collect();

        let plan = plan_retention(0, &snapshots);

        assert_eq!(plan.delete.len(), 5);
        assert!(plan.retain.is_empty());
    }

    #[test]
    fn four_snapshots_generation_two_retains_two_most_recent() {
        let snapshots = vec![
            snapshot("snap-t1", 1),
            snapshot("snap-t2", 2),
            snapshot("snap-t3", 3),
            snapshot("snap-t4", 4),
        ];

        let plan = plan_retention(2, &snapshots);

        assert_eq!(ids(&plan.delete), vec!["snap-t1", "snap-t2"]);
        assert_eq!(ids(&plan.retain), vec!["snap-t3", "snap-t4"]);
    }

    #[test]
    fn equal_start_times_keep_input_order() {
        let snapshots = vec![
            snapshot("snap-a", 100),
            snapshot("snap-b", 100),
            snapshot("snap-c", 100),
        ];

        let plan_first = plan_retention(1, &snapshots);
        let plan_second = plan_retention(1, &snapshots);

        assert_eq!(ids(&plan_first.delete), vec!["snap-a", "snap-b"]);
        assert_eq!(ids(&plan_first.retain), vec!["snap-c"]);
        assert_eq!(plan_first, plan_second);
    }

    #[test]
    fn ordering_does_not_mutate_the_input() {
        let snapshots = vec![snapshot("snap-late", 200), snapshot("snap-early", 100)];

        let ordered = order_by_start_time(&snapshots);

        assert_eq!(ids(&ordered), vec!["snap-early", "snap-late"]);
        assert_eq!(ids(&snapshots), vec!["snap-late", "snap-early"]);
    }
}
