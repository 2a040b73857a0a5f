use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const NAME_TAG_KEY: &str = "Name";
pub const GENERATION_TAG_KEY: &str = "Backup-Generation";
pub const VOLUME_ID_TAG_KEY: &str = "VolumeId";
pub const RUNNING_STATE: &str = "running";
pub const RUN_COMPLETE_MESSAGE: &str = "ebs backup done";

/// Provider-neutral projection of a running instance that opted into backup.
///
/// `volume_ids` only contains volumes with a backing EBS device; the adapter
/// drops mappings without one before records reach this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub tags: BTreeMap<String, String>,
    pub volume_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeInfo {
    pub volume_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceBackupPolicy {
    pub instance_id: String,
    pub name: String,
    pub generation: usize,
    pub volumes: Vec<VolumeInfo>,
}

/// One backup run's worth of policies, immutable after discovery.
pub type BackupSet = Vec<InstanceBackupPolicy>;

/// Outcome of parsing a `Backup-Generation` tag value.
///
/// A missing or non-numeric value resolves to generation 0, which means
/// "retain nothing"; `malformed` carries the offending raw value so callers
/// can report it instead of silently deleting all history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParse {
    pub generation: usize,
    pub malformed: Option<String>,
}

/// Result of building a policy from an instance record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyBuild {
    pub policy: InstanceBackupPolicy,
    pub malformed_generation: Option<String>,
}

/// Extracts `(name, generation_raw)` from an instance's tag set.
///
/// `name` falls back to the instance id when the `Name` tag is absent or
/// empty; `generation_raw` is empty when the `Backup-Generation` tag is
/// absent.
pub fn parse_backup_tags(instance_id: &str, tags: &BTreeMap<String, String>) -> (String, String) {
    let name = match tags.get(NAME_TAG_KEY) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => instance_id.to_string(),
    };

    let generation_raw = tags
        .get(GENERATION_TAG_KEY)
        .cloned()
        .unwrap_or_default();

    (name, generation_raw)
}

pub fn parse_generation(raw: &str) -> GenerationParse {
    match raw.parse::<usize>() {
        Ok(generation) => GenerationParse {
            generation,
            malformed: None,
        },
        Err(_) => GenerationParse {
            generation: 0,
            malformed: Some(raw.to_string()),
        },
    }
}

/// Fixed description attached to every snapshot for auditability.
pub fn volume_description(name: &str, volume_id: &str) -> String {
    format!("Auto Snapshot {name} volumeId: {volume_id}")
}

pub fn build_backup_policy(record: &InstanceRecord) -> PolicyBuild {
    let (name, generation_raw) = parse_backup_tags(&record.instance_id, &record.tags);
    let parsed = parse_generation(&generation_raw);

    let volumes = record
        .volume_ids
        .iter()
        .map(|volume_id| VolumeInfo {
            volume_id: volume_id.clone(),
            description: volume_description(&name, volume_id),
        })
        .collect();

    PolicyBuild {
        policy: InstanceBackupPolicy {
            instance_id: record.instance_id.clone(),
            name,
            generation: parsed.generation,
            volumes,
        },
        malformed_generation: parsed.malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(instance_id: &str, tags: &[(&str, &str)], volume_ids: &[&str]) -> InstanceRecord {
        InstanceRecord {
            instance_id: instance_id.to_string(),
            tags: tags
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            volume_ids: volume_ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    #[test]
    fn name_tag_takes_precedence_over_instance_id() {
        let record = record("i-1", &[("Name", "web-01"), ("Backup-Generation", "3")], &[]);
        let (name, generation_raw) = parse_backup_tags(&record.instance_id, &record.tags);

        assert_eq!(name, "web-01");
        assert_eq!(generation_raw, "3");
    }

    #[test]
    fn missing_name_tag_falls_back_to_instance_id() {
        let record = record("i-2", &[("Backup-Generation", "1")], &["vol-1"]);
        let build = build_backup_policy(&record);

        assert_eq!(build.policy.name, "i-2");
        assert_eq!(
            build.policy.volumes[0].description,
            "Auto Snapshot i-2 volumeId: vol-1"
        );
    }

    #[test]
    fn empty_name_tag_falls_back_to_instance_id() {
        let record = record("i-3", &[("Name", ""), ("Backup-Generation", "2")], &[]);
        let (name, _) = parse_backup_tags(&record.instance_id, &record.tags);

        assert_eq!(name, "i-3");
    }

    #[test]
    fn non_numeric_generation_resolves_to_zero_and_flags_raw_value() {
        let parsed = parse_generation("three");

        assert_eq!(parsed.generation, 0);
        assert_eq!(parsed.malformed, Some("three".to_string()));
    }

    #[test]
    fn missing_generation_tag_resolves_to_zero() {
        let record = record("i-4", &[("Name", "db-01")], &["vol-1"]);
        let build = build_backup_policy(&record);

        assert_eq!(build.policy.generation, 0);
        assert_eq!(build.malformed_generation, Some(String::new()));
    }

    #[test]
    fn numeric_generation_parses_without_warning() {
        let parsed = parse_generation("7");

        assert_eq!(parsed.generation, 7);
        assert_eq!(parsed.malformed, None);
    }

    #[test]
    fn negative_generation_is_treated_as_malformed() {
        let parsed = parse_generation("-2");

        assert_eq!(parsed.generation, 0);
        assert_eq!(parsed.malformed, Some("-2".to_string()));
    }

    #[test]
    fn policy_carries_one_volume_info_per_reported_volume() {
        let record = record(
            "i-5",
            &[("Name", "app-01"), ("Backup-Generation", "2")],
            &["vol-a", "vol-b"],
        );
        let build = build_backup_policy(&record);

        assert_eq!(build.policy.generation, 2);
        assert_eq!(build.policy.volumes.len(), 2);
        assert_eq!(build.policy.volumes[0].volume_id, "vol-a");
        assert_eq!(
            build.policy.volumes[1].description,
            "Auto Snapshot app-01 volumeId: vol-b"
        );
        assert_eq!(build.malformed_generation, None);
    }
}
