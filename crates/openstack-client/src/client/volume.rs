//! Cinder v3 calls

use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::models::*;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Deserialize)]
struct VolumeBody {
    volume: Volume,
}

#[derive(Deserialize)]
struct SnapshotBody {
    snapshot: Snapshot,
}

#[derive(Deserialize)]
struct MetadataBody {
    #[serde(default)]
    metadata: HashMap<String, String>,
}

pub async fn create_volume(client: &ServiceClient, opts: &CreateVolumeOpts) -> Result<Volume, OpenStackError> {
    let body: VolumeBody = client.post("/volumes", &opts.to_request_body()).await?;
    Ok(body.volume)
}

pub async fn get_volume(client: &ServiceClient, id: &str) -> Result<Volume, OpenStackError> {
    let body: VolumeBody = client.get(&format!("/volumes/{}", id)).await?;
    Ok(body.volume)
}

pub async fn delete_volume(client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
    client.delete(&format!("/volumes/{}", id)).await
}

pub async fn extend_volume(client: &ServiceClient, id: &str, new_size: u64) -> Result<(), OpenStackError> {
    let body = serde_json::json!({ "os-extend": { "new_size": new_size } });
    client.post_no_content(&format!("/volumes/{}/action", id), &body).await
}

pub async fn update_volume_metadata(
    client: &ServiceClient,
    id: &str,
    metadata: &HashMap<String, String>,
) -> Result<HashMap<String, String>, OpenStackError> {
    let body = serde_json::json!({ "metadata": metadata });
    let response: MetadataBody = client.post(&format!("/volumes/{}/metadata", id), &body).await?;
    Ok(response.metadata)
}

pub async fn create_snapshot(client: &ServiceClient, opts: &CreateSnapshotOpts) -> Result<Snapshot, OpenStackError> {
    let body: SnapshotBody = client.post("/snapshots", &opts.to_request_body()).await?;
    Ok(body.snapshot)
}

pub async fn get_snapshot(client: &ServiceClient, id: &str) -> Result<Snapshot, OpenStackError> {
    let body: SnapshotBody = client.get(&format!("/snapshots/{}", id)).await?;
    Ok(body.snapshot)
}

pub async fn delete_snapshot(client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
    client.delete(&format!("/snapshots/{}", id)).await
}
