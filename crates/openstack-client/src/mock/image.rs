//! Image operations for MockOpenStack

use super::MockOpenStack;
use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::facade::ImageFacade;
use crate::models::*;
use std::path::Path;

#[async_trait::async_trait]
impl ImageFacade for MockOpenStack {
    async fn get_image(&self, client: &ServiceClient, id: &str) -> Result<Image, OpenStackError> {
        self.begin("get_image", client)?;
        self.lock()
            .images
            .get(id)
            .cloned()
            .ok_or_else(|| OpenStackError::NotFound(format!("Image {} not found", id)))
    }

    async fn create_image(&self, client: &ServiceClient, opts: &CreateImageOpts) -> Result<Image, OpenStackError> {
        self.begin("create_image", client)?;
        let id = self.next_id("image");
        let image = Image {
            id: id.clone(),
            name: Some(opts.name.clone()),
            status: "queued".to_string(),
            visibility: Some(opts.visibility.clone()),
        };
        self.lock().images.insert(id, image.clone());
        Ok(image)
    }

    async fn upload_image_data(&self, client: &ServiceClient, id: &str, path: &Path) -> Result<(), OpenStackError> {
        self.begin("upload_image_data", client)?;
        if !path.exists() {
            return Err(OpenStackError::InvalidRequest(format!(
                "image file {} does not exist",
                path.display()
            )));
        }
        let mut state = self.lock();
        let image = state
            .images
            .get_mut(id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Image {} not found", id)))?;
        image.status = "active".to_string();
        state.uploads.push(id.to_string());
        Ok(())
    }

    async fn delete_image(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
        self.begin("delete_image", client)?;
        self.lock()
            .images
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| OpenStackError::NotFound(format!("Image {} not found", id)))
    }
}
