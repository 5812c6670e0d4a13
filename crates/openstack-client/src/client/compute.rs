//! Nova v2.1 calls

use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::models::*;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Deserialize)]
struct FlavorsBody {
    flavors: Vec<Flavor>,
}

#[derive(Deserialize)]
struct KeyPairBody {
    keypair: KeyPair,
}

#[derive(Deserialize)]
struct ServerBody {
    server: Server,
}

#[derive(Deserialize)]
struct MetadataBody {
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
struct AttachmentBody {
    #[serde(rename = "volumeAttachment")]
    volume_attachment: VolumeAttachment,
}

#[derive(Deserialize)]
struct AttachmentsBody {
    #[serde(rename = "volumeAttachments", default)]
    volume_attachments: Vec<VolumeAttachment>,
}

pub async fn list_flavors(client: &ServiceClient) -> Result<Vec<Flavor>, OpenStackError> {
    let body: FlavorsBody = client.get("/flavors/detail").await?;
    Ok(body.flavors)
}

pub async fn get_key_pair(client: &ServiceClient, name: &str) -> Result<KeyPair, OpenStackError> {
    let body: KeyPairBody = client
        .get(&format!("/os-keypairs/{}", urlencoding::encode(name)))
        .await?;
    Ok(body.keypair)
}

pub async fn create_server(client: &ServiceClient, opts: &CreateServerOpts) -> Result<Server, OpenStackError> {
    let body: ServerBody = client.post("/servers", &opts.to_request_body()).await?;
    Ok(body.server)
}

pub async fn get_server(client: &ServiceClient, id: &str) -> Result<Server, OpenStackError> {
    let body: ServerBody = client.get(&format!("/servers/{}", id)).await?;
    Ok(body.server)
}

pub async fn delete_server(client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
    client.delete(&format!("/servers/{}", id)).await
}

pub async fn reboot_server(client: &ServiceClient, id: &str, reboot_type: RebootType) -> Result<(), OpenStackError> {
    let body = serde_json::json!({ "reboot": { "type": reboot_type.as_str() } });
    client.post_no_content(&format!("/servers/{}/action", id), &body).await
}

pub async fn update_server_name(client: &ServiceClient, id: &str, name: &str) -> Result<Server, OpenStackError> {
    let body = serde_json::json!({ "server": { "name": name } });
    let response: ServerBody = client.put(&format!("/servers/{}", id), &body).await?;
    Ok(response.server)
}

pub async fn get_server_metadata(client: &ServiceClient, id: &str) -> Result<HashMap<String, String>, OpenStackError> {
    let body: MetadataBody = client.get(&format!("/servers/{}/metadata", id)).await?;
    Ok(body.metadata)
}

/// Merges `metadata` into the existing server metadata
pub async fn update_server_metadata(
    client: &ServiceClient,
    id: &str,
    metadata: &HashMap<String, String>,
) -> Result<HashMap<String, String>, OpenStackError> {
    let body = serde_json::json!({ "metadata": metadata });
    let response: MetadataBody = client.post(&format!("/servers/{}/metadata", id), &body).await?;
    Ok(response.metadata)
}

pub async fn delete_server_metadata_item(client: &ServiceClient, id: &str, key: &str) -> Result<(), OpenStackError> {
    client
        .delete(&format!("/servers/{}/metadata/{}", id, urlencoding::encode(key)))
        .await
}

pub async fn attach_volume(
    client: &ServiceClient,
    server_id: &str,
    volume_id: &str,
    device: Option<&str>,
) -> Result<VolumeAttachment, OpenStackError> {
    let mut attachment = serde_json::json!({ "volumeId": volume_id });
    if let Some(device) = device {
        attachment["device"] = serde_json::json!(device);
    }
    let body = serde_json::json!({ "volumeAttachment": attachment });
    let response: AttachmentBody = client
        .post(&format!("/servers/{}/os-volume_attachments", server_id), &body)
        .await?;
    Ok(response.volume_attachment)
}

pub async fn list_volume_attachments(client: &ServiceClient, server_id: &str) -> Result<Vec<VolumeAttachment>, OpenStackError> {
    let body: AttachmentsBody = client
        .get(&format!("/servers/{}/os-volume_attachments", server_id))
        .await?;
    Ok(body.volume_attachments)
}

pub async fn detach_volume(client: &ServiceClient, server_id: &str, volume_id: &str) -> Result<(), OpenStackError> {
    client
        .delete(&format!("/servers/{}/os-volume_attachments/{}", server_id, volume_id))
        .await
}
