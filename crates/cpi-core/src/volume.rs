//! Volume service
//!
//! Volumes and snapshots share one pattern: issue the call, then poll the
//! resource until it reaches the target status. `error` is always fatal.

use crate::error::{CpiError, ResultExt};
use crate::polling::PollingConfig;
use openstack_client::{
    CreateSnapshotOpts, CreateVolumeOpts, ServiceClients, Snapshot, Volume, VolumeFacade,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Volume status values
pub mod volume_status {
    pub const AVAILABLE: &str = "available";
    pub const IN_USE: &str = "in-use";
    pub const DELETED: &str = "deleted";
    pub const ERROR: &str = "error";
}

/// Volume and snapshot lifecycle on Cinder
#[derive(Clone)]
pub struct VolumeService {
    facade: Arc<dyn VolumeFacade>,
    clients: ServiceClients,
    polling: PollingConfig,
}

impl VolumeService {
    /// Create a volume service
    pub fn new(facade: Arc<dyn VolumeFacade>, clients: ServiceClients, polling: PollingConfig) -> Self {
        Self {
            facade,
            clients,
            polling,
        }
    }

    /// Create a volume and wait until it is available
    pub async fn create_volume(&self, opts: &CreateVolumeOpts) -> Result<Volume, CpiError> {
        let volume = self
            .facade
            .create_volume(&self.clients.client, opts)
            .await
            .with_context(|| format!("failed to create volume of {} GiB", opts.size))?;
        info!("Created volume '{}', waiting for it to become available", volume.id);

        self.wait_for_volume_to_become_status(&volume.id, volume_status::AVAILABLE)
            .await
            .with_context(|| format!("failed to create volume '{}'", volume.id))
    }

    /// Fetch a volume
    pub async fn get_volume(&self, id: &str) -> Result<Volume, CpiError> {
        self.facade
            .get_volume(&self.clients.retryable, id)
            .await
            .with_context(|| format!("failed to get volume '{}'", id))
    }

    /// Delete an available (or errored) volume and wait until it is gone
    pub async fn delete_volume(&self, id: &str) -> Result<(), CpiError> {
        let volume = match self.facade.get_volume(&self.clients.retryable, id).await {
            Ok(volume) => volume,
            Err(e) if e.is_not_found() => {
                info!("SKIPPING: volume '{}' not found, already deleted", id);
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("failed to get volume '{}'", id)),
        };

        if volume.status != volume_status::AVAILABLE && volume.status != volume_status::ERROR {
            return Err(CpiError::ResourceState(format!(
                "cannot delete volume '{}', state is {}",
                id, volume.status
            )));
        }

        self.facade
            .delete_volume(&self.clients.retryable, id)
            .await
            .with_context(|| format!("failed to delete volume '{}'", id))?;
        self.wait_for_volume_to_become_status(id, volume_status::DELETED)
            .await
            .with_context(|| format!("failed to delete volume '{}'", id))?;
        Ok(())
    }

    /// Grow a volume and wait until it is available again
    pub async fn extend_volume(&self, id: &str, new_size: u64) -> Result<(), CpiError> {
        self.facade
            .extend_volume(&self.clients.client, id, new_size)
            .await
            .with_context(|| format!("failed to resize volume '{}' to {} GiB", id, new_size))?;
        self.wait_for_volume_to_become_status(id, volume_status::AVAILABLE)
            .await
            .with_context(|| format!("failed to resize volume '{}'", id))?;
        Ok(())
    }

    /// Merge `metadata` into the volume's metadata
    pub async fn update_volume_metadata(&self, id: &str, metadata: &HashMap<String, String>) -> Result<(), CpiError> {
        self.facade
            .update_volume_metadata(&self.clients.retryable, id, metadata)
            .await
            .with_context(|| format!("failed to update metadata of volume '{}'", id))?;
        Ok(())
    }

    /// Poll until the volume reaches `status`. A 404 counts as reaching
    /// `deleted`; `error` and `error_*` statuses are fatal.
    pub async fn wait_for_volume_to_become_status(&self, id: &str, status: &str) -> Result<Volume, CpiError> {
        let deadline = self.polling.deadline();
        loop {
            deadline.check(|| format!("volume '{}' to become {}", id, status))?;

            let volume = match self.facade.get_volume(&self.clients.retryable, id).await {
                Ok(volume) => volume,
                Err(e) if e.is_not_found() && status == volume_status::DELETED => {
                    return Ok(Volume {
                        id: id.to_string(),
                        status: volume_status::DELETED.to_string(),
                        ..Default::default()
                    });
                }
                Err(e) => return Err(e).with_context(|| format!("failed to get volume '{}'", id)),
            };

            if volume.status == status {
                return Ok(volume);
            }
            if volume.status == volume_status::ERROR || volume.status.starts_with("error_") {
                return Err(CpiError::ResourceState(format!(
                    "volume '{}' became {} while waiting for {}",
                    id, volume.status, status
                )));
            }
            debug!("Volume '{}' is {}, waiting for {}", id, volume.status, status);
            self.polling.pause().await;
        }
    }

    /// Snapshot a volume and wait until the snapshot is available
    pub async fn create_snapshot(&self, opts: &CreateSnapshotOpts) -> Result<Snapshot, CpiError> {
        let snapshot = self
            .facade
            .create_snapshot(&self.clients.client, opts)
            .await
            .with_context(|| format!("failed to create snapshot of volume '{}'", opts.volume_id))?;
        info!("Created snapshot '{}' of volume '{}'", snapshot.id, opts.volume_id);

        self.wait_for_snapshot_to_become_status(&snapshot.id, volume_status::AVAILABLE)
            .await
            .with_context(|| format!("failed to create snapshot '{}'", snapshot.id))
    }

    /// Delete a snapshot and wait until it is gone
    pub async fn delete_snapshot(&self, id: &str) -> Result<(), CpiError> {
        match self.facade.delete_snapshot(&self.clients.retryable, id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("SKIPPING: snapshot '{}' not found, already deleted", id);
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("failed to delete snapshot '{}'", id)),
        }
        self.wait_for_snapshot_to_become_status(id, volume_status::DELETED)
            .await
            .with_context(|| format!("failed to delete snapshot '{}'", id))?;
        Ok(())
    }

    /// Poll until the snapshot reaches `status`. `error`, `failed` and
    /// `killed` are fatal.
    pub async fn wait_for_snapshot_to_become_status(&self, id: &str, status: &str) -> Result<Snapshot, CpiError> {
        let deadline = self.polling.deadline();
        loop {
            deadline.check(|| format!("snapshot '{}' to become {}", id, status))?;

            let snapshot = match self.facade.get_snapshot(&self.clients.retryable, id).await {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_not_found() && status == volume_status::DELETED => {
                    return Ok(Snapshot {
                        id: id.to_string(),
                        status: volume_status::DELETED.to_string(),
                        ..Default::default()
                    });
                }
                Err(e) => return Err(e).with_context(|| format!("failed to get snapshot '{}'", id)),
            };

            if snapshot.status == status {
                return Ok(snapshot);
            }
            if matches!(snapshot.status.as_str(), "error" | "failed" | "killed") {
                return Err(CpiError::ResourceState(format!(
                    "snapshot '{}' became {} while waiting for {}",
                    id, snapshot.status, status
                )));
            }
            debug!("Snapshot '{}' is {}, waiting for {}", id, snapshot.status, status);
            self.polling.pause().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{clients, expired_polling, fast_polling};
    use openstack_client::MockOpenStack;

    fn service(mock: &MockOpenStack) -> VolumeService {
        VolumeService::new(Arc::new(mock.clone()), clients(), fast_polling())
    }

    fn volume(id: &str, status: &str) -> Volume {
        Volume {
            id: id.to_string(),
            status: status.to_string(),
            size: 10,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_volume_waits_for_available() {
        let mock = MockOpenStack::new();
        let created = service(&mock)
            .create_volume(&CreateVolumeOpts {
                size: 10,
                name: "volume-1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.status, "available");
        assert!(!mock.calls().iter().any(|c| c.operation == "create_volume" && c.retryable));
        assert!(mock.always_retryable("get_volume"));
    }

    #[tokio::test]
    async fn test_delete_volume_treats_404_while_polling_as_deleted() {
        let mock = MockOpenStack::new();
        mock.add_volume(volume("vol-1", "available"));

        service(&mock).delete_volume("vol-1").await.unwrap();
        assert!(mock.volume("vol-1").is_none());
        assert_eq!(mock.call_count("get_volume"), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_volume_is_skipped() {
        let mock = MockOpenStack::new();
        service(&mock).delete_volume("vol-404").await.unwrap();
        assert_eq!(mock.call_count("delete_volume"), 0);
    }

    #[tokio::test]
    async fn test_delete_attached_volume_is_refused() {
        let mock = MockOpenStack::new();
        mock.add_volume(volume("vol-1", "in-use"));

        let err = service(&mock).delete_volume("vol-1").await.unwrap_err();
        assert_eq!(err.to_string(), "cannot delete volume 'vol-1', state is in-use");
        assert!(mock.volume("vol-1").is_some());
    }

    #[tokio::test]
    async fn test_404_is_fatal_unless_waiting_for_deleted() {
        let mock = MockOpenStack::new();
        let err = service(&mock)
            .wait_for_volume_to_become_status("vol-404", "available")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_error_statuses_are_fatal() {
        let mock = MockOpenStack::new();
        mock.add_volume(volume("vol-1", "extending"));
        mock.set_volume_statuses("vol-1", &["extending", "error_extending"]);

        let err = service(&mock).extend_volume("vol-1", 20).await.unwrap_err();
        assert!(err.to_string().contains("became error_extending while waiting for available"));
        assert_eq!(mock.volume("vol-1").unwrap().size, 20);
    }

    #[tokio::test]
    async fn test_zero_timeout_reads_no_status() {
        let mock = MockOpenStack::new();
        mock.add_volume(volume("vol-1", "available"));
        let service = VolumeService::new(Arc::new(mock.clone()), clients(), expired_polling());

        let err = service
            .wait_for_volume_to_become_status("vol-1", "available")
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "timeout while waiting for volume 'vol-1' to become available");
        assert_eq!(mock.call_count("get_volume"), 0);
    }

    #[tokio::test]
    async fn test_snapshot_lifecycle() {
        let mock = MockOpenStack::new();
        mock.add_volume(volume("vol-1", "in-use"));
        let service = service(&mock);

        let snapshot = service
            .create_snapshot(&CreateSnapshotOpts {
                volume_id: "vol-1".to_string(),
                name: "snapshot-1".to_string(),
                force: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(snapshot.status, "available");

        service.delete_snapshot(&snapshot.id).await.unwrap();
        assert!(mock.snapshot(&snapshot.id).is_none());
        service.delete_snapshot(&snapshot.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_snapshot_is_fatal() {
        let mock = MockOpenStack::new();
        mock.add_snapshot(Snapshot {
            id: "snap-1".to_string(),
            status: "creating".to_string(),
            volume_id: "vol-1".to_string(),
            ..Default::default()
        });
        mock.set_snapshot_statuses("snap-1", &["creating", "killed"]);

        let err = service(&mock)
            .wait_for_snapshot_to_become_status("snap-1", "available")
            .await
            .unwrap_err();
        assert!(matches!(err, CpiError::ResourceState(_)));
    }
}
