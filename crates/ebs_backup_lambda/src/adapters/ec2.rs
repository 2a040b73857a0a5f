use std::collections::BTreeMap;

use aws_sdk_ec2::types::{Filter, Tag};
use chrono::{DateTime, Utc};
use ebs_backup_core::policy::{
    InstanceRecord, GENERATION_TAG_KEY, NAME_TAG_KEY, RUNNING_STATE, VOLUME_ID_TAG_KEY,
};
use ebs_backup_core::retention::SnapshotRecord;

/// Abstraction over the EC2 compute/storage API consumed by the backup
/// handlers. The production implementation wraps the AWS SDK; tests provide
/// scripted implementations.
pub trait ResourceRepository {
    /// Lists running instances carrying the `Backup-Generation` tag key.
    /// Both filters are applied server-side; instances without the tag never
    /// appear in the result.
    fn list_backup_instances(&self) -> Result<Vec<InstanceRecord>, String>;

    fn list_snapshots(&self, volume_id: &str) -> Result<Vec<SnapshotRecord>, String>;

    /// Creates a snapshot of `volume_id` and returns the new snapshot id.
    fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<String, String>;

    /// Attaches `Name` and `VolumeId` tags to a snapshot. Tag keys are
    /// last-write-wins, so re-tagging with the same pair is idempotent.
    fn tag_snapshot(&self, snapshot_id: &str, name: &str, volume_id: &str) -> Result<(), String>;

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), String>;
}

/// EC2-backed repository. The client is injected once at construction and
/// shared for the process lifetime.
pub struct Ec2ResourceRepository {
    ec2_client: aws_sdk_ec2::Client,
}

impl Ec2ResourceRepository {
    pub fn new(ec2_client: aws_sdk_ec2::Client) -> Self {
        Self { ec2_client }
    }
}

impl ResourceRepository for Ec2ResourceRepository {
    fn list_backup_instances(&self) -> Result<Vec<InstanceRecord>, String> {
        let client = self.ec2_client.clone();

        let output = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .describe_instances()
                    .filters(
                        Filter::builder()
                            .name("tag-key")
                            .values(GENERATION_TAG_KEY)
                            .build(),
                    )
                    .filters(
                        Filter::builder()
                            .name("instance-state-name")
                            .values(RUNNING_STATE)
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|error| format!("failed to describe instances: {error}"))
            })
        })?;

        let mut records = Vec::new();
        for reservation in output.reservations() {
            for instance in reservation.instances() {
                let Some(instance_id) = instance.instance_id() else {
                    continue;
                };

                let mut tags = BTreeMap::new();
                for tag in instance.tags() {
                    if let (Some(key), Some(value)) = (tag.key(), tag.value()) {
                        tags.insert(key.to_string(), value.to_string());
                    }
                }

                // Only EBS-backed device mappings carry a volume id.
                let volume_ids = instance
                    .block_device_mappings()
                    .iter()
                    .filter_map(|mapping| mapping.ebs())
                    .filter_map(|ebs| ebs.volume_id())
                    .map(|volume_id| volume_id.to_string())
                    .collect();

                records.push(InstanceRecord {
                    instance_id: instance_id.to_string(),
                    tags,
                    volume_ids,
                });
            }
        }

        Ok(records)
    }

    fn list_snapshots(&self, volume_id: &str) -> Result<Vec<SnapshotRecord>, String> {
        let client = self.ec2_client.clone();
        let filter_volume_id = volume_id.to_string();

        let output = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .describe_snapshots()
                    .filters(
                        Filter::builder()
                            .name("volume-id")
                            .values(filter_volume_id)
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|error| format!("failed to describe snapshots: {error}"))
            })
        })?;

        let records = output
            .snapshots()
            .iter()
            .filter_map(|snapshot| {
                let snapshot_id = snapshot.snapshot_id()?;
                let volume_id = snapshot.volume_id()?;
                // A snapshot without a start time sorts as oldest.
                let start_time = snapshot
                    .start_time()
                    .and_then(|time| DateTime::<Utc>::from_timestamp(time.secs(), 0))
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

                Some(SnapshotRecord {
                    snapshot_id: snapshot_id.to_string(),
                    volume_id: volume_id.to_string(),
                    start_time,
                })
            })
            .collect();

        Ok(records)
    }

    fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<String, String> {
        let client = self.ec2_client.clone();
        let request_volume_id = volume_id.to_string();
        let request_description = description.to_string();

        let output = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .create_snapshot()
                    .volume_id(request_volume_id)
                    .description(request_description)
                    .dry_run(false)
                    .send()
                    .await
                    .map_err(|error| format!("failed to create snapshot: {error}"))
            })
        })?;

        output
            .snapshot_id()
            .map(|snapshot_id| snapshot_id.to_string())
            .ok_or_else(|| format!("snapshot of {volume_id} was created without an id"))
    }

    fn tag_snapshot(&self, snapshot_id: &str, name: &str, volume_id: &str) -> Result<(), String> {
        let client = self.ec2_client.clone();
        let resource_id = snapshot_id.to_string();
        let name_value = name.to_string();
        let volume_id_value = volume_id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .create_tags()
                    .resources(resource_id)
                    .tags(Tag::builder().key(NAME_TAG_KEY).value(name_value).build())
                    .tags(
                        Tag::builder()
                            .key(VOLUME_ID_TAG_KEY)
                            .value(volume_id_value)
                            .build(),
                    )
                    .dry_run(false)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to tag snapshot: {error}"))
            })
        })
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), String> {
        let client = self.ec2_client.clone();
        let request_snapshot_id = snapshot_id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .delete_snapshot()
                    .snapshot_id(request_snapshot_id)
                    .dry_run(false)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to delete snapshot: {error}"))
            })
        })
    }
}
