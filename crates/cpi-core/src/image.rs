//! Image service
//!
//! Heavy stemcells ship a gzipped tarball holding `root.img`; the image is
//! uploaded to Glance from a scratch directory and polled until active.

use crate::error::{CpiError, ResultExt};
use crate::polling::PollingConfig;
use flate2::read::GzDecoder;
use openstack_client::{CreateImageOpts, Image, ImageFacade, ServiceClients};
use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the disk image inside a stemcell image tarball
pub const ROOT_IMAGE: &str = "root.img";

/// Stemcell images on Glance
#[derive(Clone)]
pub struct ImageService {
    facade: Arc<dyn ImageFacade>,
    clients: ServiceClients,
    polling: PollingConfig,
}

impl ImageService {
    /// Create an image service
    pub fn new(facade: Arc<dyn ImageFacade>, clients: ServiceClients, polling: PollingConfig) -> Self {
        Self {
            facade,
            clients,
            polling,
        }
    }

    /// Fetch an image
    pub async fn get_image(&self, id: &str) -> Result<Image, CpiError> {
        self.facade
            .get_image(&self.clients.retryable, id)
            .await
            .with_context(|| format!("failed to get image '{}'", id))
    }

    /// Create an image from the stemcell tarball at `tarball`
    pub async fn create_image_from_tarball(&self, opts: &CreateImageOpts, tarball: &Path) -> Result<Image, CpiError> {
        let workdir = tempfile::tempdir()?;
        let source = tarball.to_path_buf();
        let target = workdir.path().to_path_buf();
        let root_image = tokio::task::spawn_blocking(move || extract_root_image(&source, &target))
            .await
            .map_err(|e| CpiError::Io(std::io::Error::other(e)))?
            .with_context(|| format!("failed to unpack stemcell image '{}'", tarball.display()))?;

        self.create_image(opts, &root_image).await
    }

    /// Create an image, upload `path` as its data and wait until it is active
    pub async fn create_image(&self, opts: &CreateImageOpts, path: &Path) -> Result<Image, CpiError> {
        let image = self
            .facade
            .create_image(&self.clients.client, opts)
            .await
            .with_context(|| format!("failed to create image '{}'", opts.name))?;
        info!("Created image '{}', uploading {}", image.id, path.display());

        self.facade
            .upload_image_data(&self.clients.client, &image.id, path)
            .await
            .with_context(|| format!("failed to upload data of image '{}'", image.id))?;

        self.wait_for_image_active(&image.id).await
    }

    /// Delete an image; a missing image is skipped
    pub async fn delete_image(&self, id: &str) -> Result<(), CpiError> {
        match self.facade.delete_image(&self.clients.retryable, id).await {
            Ok(()) => {
                info!("Deleted image '{}'", id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!("SKIPPING: image '{}' not found, already deleted", id);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("failed to delete image '{}'", id)),
        }
    }

    async fn wait_for_image_active(&self, id: &str) -> Result<Image, CpiError> {
        let deadline = self.polling.deadline();
        loop {
            deadline.check(|| format!("image '{}' to become active", id))?;

            let image = self.get_image(id).await?;
            match image.status.as_str() {
                "active" => return Ok(image),
                "killed" | "deleted" | "deactivated" => {
                    return Err(CpiError::ResourceState(format!(
                        "image '{}' became {} while waiting for active",
                        id, image.status
                    )));
                }
                status => debug!("Image '{}' is {}, waiting for active", id, status),
            }
            self.polling.pause().await;
        }
    }
}

/// Unpack `root.img` from a gzipped tarball into `dir`
pub fn extract_root_image(tarball: &Path, dir: &Path) -> Result<PathBuf, CpiError> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(tarball)?));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.file_name() != Some(OsStr::new(ROOT_IMAGE)) {
            continue;
        }
        let target = dir.join(ROOT_IMAGE);
        entry.unpack(&target)?;
        return Ok(target);
    }
    Err(CpiError::NotFound(format!(
        "'{}' not found in '{}'",
        ROOT_IMAGE,
        tarball.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{clients, fast_polling};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use openstack_client::MockOpenStack;

    fn write_tarball(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("image");
        let mut builder = tar::Builder::new(GzEncoder::new(File::create(&path).unwrap(), Compression::default()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    fn opts() -> CreateImageOpts {
        CreateImageOpts {
            name: "bosh-openstack-kvm-ubuntu/1.0".to_string(),
            disk_format: "qcow2".to_string(),
            container_format: "bare".to_string(),
            visibility: "private".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_root_image() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = write_tarball(dir.path(), &[("./stemcell.MF", b"name: x".as_slice()), ("./root.img", b"disk".as_slice())]);
        let out = tempfile::tempdir().unwrap();

        let root_image = extract_root_image(&tarball, out.path()).unwrap();
        assert_eq!(std::fs::read(root_image).unwrap(), b"disk");
    }

    #[test]
    fn test_extract_without_root_image() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = write_tarball(dir.path(), &[("stemcell.MF", b"name: x".as_slice())]);

        let err = extract_root_image(&tarball, dir.path()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_image_from_tarball() {
        let mock = MockOpenStack::new();
        let dir = tempfile::tempdir().unwrap();
        let tarball = write_tarball(dir.path(), &[("root.img", b"disk".as_slice())]);
        let service = ImageService::new(Arc::new(mock.clone()), clients(), fast_polling());

        let image = service.create_image_from_tarball(&opts(), &tarball).await.unwrap();
        assert_eq!(image.status, "active");
        assert_eq!(mock.uploads(), vec![image.id.clone()]);
        assert!(!mock.always_retryable("create_image"));
    }

    #[tokio::test]
    async fn test_delete_image_skips_missing() {
        let mock = MockOpenStack::new();
        mock.add_image("image-1", "active");
        let service = ImageService::new(Arc::new(mock.clone()), clients(), fast_polling());

        service.delete_image("image-1").await.unwrap();
        service.delete_image("image-1").await.unwrap();
        assert!(mock.image("image-1").is_none());
        assert_eq!(mock.call_count("delete_image"), 2);
    }
}
