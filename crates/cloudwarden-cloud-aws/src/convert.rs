//! SDK response types → [`ResourceDescriptor`]
//!
//! Nothing outside this crate sees SDK types; everything crosses the
//! boundary through these functions.

use aws_sdk_ec2::primitives::DateTime as AwsDateTime;
use chrono::{DateTime, Utc};
use cloudwarden_cloud::{ResourceDescriptor, ResourceKind};
use serde_json::json;
use std::collections::HashMap;

/// Convert an SDK timestamp; missing or out-of-range values become the epoch
pub fn timestamp(dt: Option<&AwsDateTime>) -> DateTime<Utc> {
    dt.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn optional_timestamp(dt: Option<&AwsDateTime>) -> serde_json::Value {
    match dt.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())) {
        Some(t) => json!(t.to_rfc3339()),
        None => serde_json::Value::Null,
    }
}

fn extract_tags<T>(
    tags: &[T],
    key: impl Fn(&T) -> Option<&str>,
    value: impl Fn(&T) -> Option<&str>,
) -> HashMap<String, String> {
    tags.iter()
        .filter_map(|t| Some((key(t)?.to_string(), value(t).unwrap_or_default().to_string())))
        .collect()
}

pub fn extract_ec2_tags(tags: &[aws_sdk_ec2::types::Tag]) -> HashMap<String, String> {
    extract_tags(tags, |t| t.key(), |t| t.value())
}

pub fn extract_iam_tags(tags: &[aws_sdk_iam::types::Tag]) -> HashMap<String, String> {
    extract_tags(tags, |t| Some(t.key()), |t| Some(t.value()))
}

pub fn instance(instance: &aws_sdk_ec2::types::Instance) -> Option<ResourceDescriptor> {
    let id = instance.instance_id()?;
    let state = instance
        .state()
        .and_then(|s| s.name())
        .map(|n| n.as_str())
        .unwrap_or("unknown");

    Some(
        ResourceDescriptor::new(
            ResourceKind::Instance,
            id,
            state,
            timestamp(instance.launch_time()),
        )
        .with_tags(extract_ec2_tags(instance.tags()))
        .with_metadata(
            "instance_type",
            json!(instance.instance_type().map(|t| t.as_str())),
        )
        .with_metadata(
            "availability_zone",
            json!(instance.placement().and_then(|p| p.availability_zone())),
        )
        .with_metadata("private_ip", json!(instance.private_ip_address()))
        .with_metadata("public_ip", json!(instance.public_ip_address())),
    )
}

/// Status reports carry no timestamp; `created_at` is the epoch
pub fn instance_status(status: &aws_sdk_ec2::types::InstanceStatus) -> Option<ResourceDescriptor> {
    let id = status.instance_id()?;
    let state = status
        .instance_state()
        .and_then(|s| s.name())
        .map(|n| n.as_str())
        .unwrap_or("unknown");
    let summary = |s: Option<&aws_sdk_ec2::types::InstanceStatusSummary>| {
        json!(s.and_then(|s| s.status()).map(|s| s.as_str()))
    };

    Some(
        ResourceDescriptor::new(ResourceKind::InstanceStatus, id, state, timestamp(None))
            .with_metadata("system_status", summary(status.system_status()))
            .with_metadata("instance_status", summary(status.instance_status()))
            .with_metadata("availability_zone", json!(status.availability_zone())),
    )
}

pub fn volume(volume: &aws_sdk_ec2::types::Volume) -> Option<ResourceDescriptor> {
    let id = volume.volume_id()?;
    let state = volume.state().map(|s| s.as_str()).unwrap_or("unknown");
    let attached: Vec<&str> = volume
        .attachments()
        .iter()
        .filter_map(|a| a.instance_id())
        .collect();

    Some(
        ResourceDescriptor::new(ResourceKind::Volume, id, state, timestamp(volume.create_time()))
            .with_tags(extract_ec2_tags(volume.tags()))
            .with_metadata("size_gib", json!(volume.size()))
            .with_metadata("volume_type", json!(volume.volume_type().map(|t| t.as_str())))
            .with_metadata("availability_zone", json!(volume.availability_zone()))
            .with_metadata("attached_to", json!(attached)),
    )
}

pub fn snapshot(snapshot: &aws_sdk_ec2::types::Snapshot) -> Option<ResourceDescriptor> {
    let id = snapshot.snapshot_id()?;
    let state = snapshot.state().map(|s| s.as_str()).unwrap_or("unknown");

    Some(
        ResourceDescriptor::new(
            ResourceKind::Snapshot,
            id,
            state,
            timestamp(snapshot.start_time()),
        )
        .with_tags(extract_ec2_tags(snapshot.tags()))
        .with_metadata("volume_id", json!(snapshot.volume_id()))
        .with_metadata("size_gib", json!(snapshot.volume_size()))
        .with_metadata("progress", json!(snapshot.progress()))
        .with_metadata("description", json!(snapshot.description())),
    )
}

/// IAM users carry no lifecycle state; listed users are `active`
pub fn user(user: &aws_sdk_iam::types::User, tags: HashMap<String, String>) -> ResourceDescriptor {
    ResourceDescriptor::new(
        ResourceKind::User,
        user.user_name(),
        "active",
        timestamp(Some(user.create_date())),
    )
    .with_tags(tags)
    .with_metadata("user_id", json!(user.user_id()))
    .with_metadata("arn", json!(user.arn()))
    .with_metadata("path", json!(user.path()))
    .with_metadata("password_last_used", optional_timestamp(user.password_last_used()))
}

/// Access key; the status (`Active` / `Inactive`) is the descriptor state
pub fn access_key(
    key: &aws_sdk_iam::types::AccessKeyMetadata,
    user_name: &str,
    last_used: Option<&AwsDateTime>,
) -> Option<ResourceDescriptor> {
    let id = key.access_key_id()?;
    let status = key.status().map(|s| s.as_str()).unwrap_or("unknown");

    Some(
        ResourceDescriptor::new(ResourceKind::Credential, id, status, timestamp(key.create_date()))
            .with_metadata("user_name", json!(user_name))
            .with_metadata("last_used", optional_timestamp(last_used)),
    )
}
