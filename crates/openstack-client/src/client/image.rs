//! Glance v2 calls

use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::models::*;
use std::path::Path;

pub async fn get_image(client: &ServiceClient, id: &str) -> Result<Image, OpenStackError> {
    client.get(&format!("/v2/images/{}", id)).await
}

pub async fn create_image(client: &ServiceClient, opts: &CreateImageOpts) -> Result<Image, OpenStackError> {
    client.post("/v2/images", &opts.to_request_body()).await
}

pub async fn upload_image_data(client: &ServiceClient, id: &str, path: &Path) -> Result<(), OpenStackError> {
    let file = tokio::fs::File::open(path).await?;
    client
        .put_file(&format!("/v2/images/{}/file", id), file, "application/octet-stream")
        .await
}

pub async fn delete_image(client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
    client.delete(&format!("/v2/images/{}", id)).await
}
