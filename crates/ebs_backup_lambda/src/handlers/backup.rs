use serde::{Deserialize, Serialize};
use serde_json::json;

use ebs_backup_core::policy::{build_backup_policy, BackupSet, RUN_COMPLETE_MESSAGE};
use ebs_backup_core::retention::plan_retention;

use crate::adapters::ec2::ResourceRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Discover,
    Backup,
    Prune,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Discover => "discover",
            RunPhase::Backup => "backup",
            RunPhase::Prune => "prune",
        }
    }
}

/// Fatal failure that halted the run in the named phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRunError {
    pub phase: RunPhase,
    pub message: String,
}

impl BackupRunError {
    fn new(phase: RunPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }

    pub fn to_message(&self) -> String {
        format!("{} phase failed: {}", self.phase.as_str(), self.message)
    }
}

/// A snapshot deletion that failed without aborting the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteFailure {
    pub snapshot_id: String,
    pub volume_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneSummary {
    pub deleted: usize,
    pub failures: Vec<DeleteFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupRunReport {
    pub status: String,
    pub instances: usize,
    pub snapshots_created: usize,
    pub snapshots_deleted: usize,
    pub delete_failures: Vec<DeleteFailure>,
}

/// Queries the repository for opted-in running instances and builds one
/// backup policy per instance, in provider order. A repository error is
/// fatal: pruning decisions must never be made from a partial listing.
pub fn discover_backup_targets(
    repository: &dyn ResourceRepository,
) -> Result<BackupSet, BackupRunError> {
    let records = repository
        .list_backup_instances()
        .map_err(|message| BackupRunError::new(RunPhase::Discover, message))?;

    let mut backup_set = Vec::with_capacity(records.len());
    for record in &records {
        let build = build_backup_policy(record);
        if let Some(raw_value) = build.malformed_generation {
            log_backup_warn(
                "malformed_generation_tag",
                json!({
                    "instance_id": record.instance_id.clone(),
                    "raw_value": raw_value,
                    "resolved_generation": 0,
                }),
            );
        }
        backup_set.push(build.policy);
    }

    log_backup_info(
        "discovery_completed",
        json!({
            "instances": backup_set.len(),
            "volumes": backup_set
                .iter()
                .map(|policy| policy.volumes.len())
                .sum::<usize>(),
        }),
    );

    Ok(backup_set)
}

/// Creates one snapshot per volume and tags it after creation succeeds.
/// Any create or tag error aborts the run; a silently incomplete backup is
/// worse than a loud failed one.
pub fn create_snapshots(
    repository: &dyn ResourceRepository,
    backup_set: &BackupSet,
) -> Result<usize, BackupRunError> {
    let mut created = 0usize;

    for policy in backup_set {
        for volume in &policy.volumes {
            let snapshot_id = repository
                .create_snapshot(&volume.volume_id, &volume.description)
                .map_err(|message| BackupRunError::new(RunPhase::Backup, message))?;

            repository
                .tag_snapshot(&snapshot_id, &policy.name, &volume.volume_id)
                .map_err(|message| BackupRunError::new(RunPhase::Backup, message))?;

            log_backup_info(
                "snapshot_created",
                json!({
                    "instance_id": policy.instance_id.clone(),
                    "volume_id": volume.volume_id.clone(),
                    "snapshot_id": snapshot_id,
                }),
            );
            created += 1;
        }
    }

    Ok(created)
}

/// Deletes each volume's excess snapshots, oldest first, leaving the
/// configured generation count. Listing errors are fatal; individual delete
/// failures are recorded and reported without aborting the rest of the run,
/// since a missed deletion is retried naturally on the next run.
pub fn prune_snapshots(
    repository: &dyn ResourceRepository,
    backup_set: &BackupSet,
) -> Result<PruneSummary, BackupRunError> {
    let mut summary = PruneSummary {
        deleted: 0,
        failures: Vec::new(),
    };

    for policy in backup_set {
        for volume in &policy.volumes {
            let snapshots = repository
                .list_snapshots(&volume.volume_id)
                .map_err(|message| BackupRunError::new(RunPhase::Prune, message))?;

            let plan = plan_retention(policy.generation, &snapshots);
            for snapshot in &plan.delete {
                match repository.delete_snapshot(&snapshot.snapshot_id) {
                    Ok(()) => {
                        log_backup_info(
                            "snapshot_deleted",
                            json!({
                                "volume_id": volume.volume_id.clone(),
                                "snapshot_id": snapshot.snapshot_id.clone(),
                            }),
                        );
                        summary.deleted += 1;
                    }
                    Err(message) => {
                        log_backup_error(
                            "snapshot_delete_failed",
                            json!({
                                "volume_id": volume.volume_id.clone(),
                                "snapshot_id": snapshot.snapshot_id.clone(),
                                "message": message.clone(),
                            }),
                        );
                        summary.failures.push(DeleteFailure {
                            snapshot_id: snapshot.snapshot_id.clone(),
                            volume_id: volume.volume_id.clone(),
                            message,
                        });
                    }
                }
            }
        }
    }

    Ok(summary)
}

/// Runs one full backup cycle: Discover, then Backup, then Prune. Phases are
/// strictly sequential and a fatal error in an earlier phase halts the run
/// before the next phase starts.
pub fn run_backup(
    repository: &dyn ResourceRepository,
    region_label: Option<&str>,
) -> Result<BackupRunReport, BackupRunError> {
    log_backup_info(
        "run_started",
        json!({
            "region_label": region_label,
        }),
    );

    let backup_set = discover_backup_targets(repository)?;
    let snapshots_created = create_snapshots(repository, &backup_set)?;
    let prune_summary = prune_snapshots(repository, &backup_set)?;

    let report = BackupRunReport {
        status: RUN_COMPLETE_MESSAGE.to_string(),
        instances: backup_set.len(),
        snapshots_created,
        snapshots_deleted: prune_summary.deleted,
        delete_failures: prune_summary.failures,
    };

    log_backup_info(
        "run_completed",
        json!({
            "instances": report.instances,
            "snapshots_created": report.snapshots_created,
            "snapshots_deleted": report.snapshots_deleted,
            "delete_failures": report.delete_failures.len(),
        }),
    );

    Ok(report)
}

fn log_backup_info(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "backup_handler",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_backup_warn(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "backup_handler",
            "level": "warning",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_backup_error(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "backup_handler",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
