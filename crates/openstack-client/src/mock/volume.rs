//! Volume operations for MockOpenStack

use super::{MockOpenStack, next_status};
use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::facade::VolumeFacade;
use crate::models::*;
use std::collections::HashMap;

#[async_trait::async_trait]
impl VolumeFacade for MockOpenStack {
    async fn create_volume(&self, client: &ServiceClient, opts: &CreateVolumeOpts) -> Result<Volume, OpenStackError> {
        self.begin("create_volume", client)?;
        let id = self.next_id("volume");
        let volume = Volume {
            id: id.clone(),
            name: Some(opts.name.clone()),
            status: "available".to_string(),
            size: opts.size,
            availability_zone: opts.availability_zone.clone(),
            metadata: opts.metadata.clone(),
            attachments: Vec::new(),
        };
        self.lock().volumes.insert(id, volume.clone());
        Ok(Volume {
            status: "creating".to_string(),
            ..volume
        })
    }

    async fn get_volume(&self, client: &ServiceClient, id: &str) -> Result<Volume, OpenStackError> {
        self.begin("get_volume", client)?;
        let mut state = self.lock();
        let scripted = next_status(&mut state.volume_statuses, id);
        let volume = state
            .volumes
            .get_mut(id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Volume {} not found", id)))?;
        if let Some(status) = scripted {
            volume.status = status;
        }
        Ok(volume.clone())
    }

    async fn delete_volume(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
        self.begin("delete_volume", client)?;
        self.lock()
            .volumes
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| OpenStackError::NotFound(format!("Volume {} not found", id)))
    }

    async fn extend_volume(&self, client: &ServiceClient, id: &str, new_size: u64) -> Result<(), OpenStackError> {
        self.begin("extend_volume", client)?;
        let mut state = self.lock();
        let volume = state
            .volumes
            .get_mut(id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Volume {} not found", id)))?;
        volume.size = new_size;
        Ok(())
    }

    async fn update_volume_metadata(
        &self,
        client: &ServiceClient,
        id: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, OpenStackError> {
        self.begin("update_volume_metadata", client)?;
        let mut state = self.lock();
        let volume = state
            .volumes
            .get_mut(id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Volume {} not found", id)))?;
        volume
            .metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(volume.metadata.clone())
    }

    async fn create_snapshot(&self, client: &ServiceClient, opts: &CreateSnapshotOpts) -> Result<Snapshot, OpenStackError> {
        self.begin("create_snapshot", client)?;
        let size = self
            .lock()
            .volumes
            .get(&opts.volume_id)
            .map(|v| v.size)
            .ok_or_else(|| OpenStackError::NotFound(format!("Volume {} not found", opts.volume_id)))?;
        let id = self.next_id("snapshot");
        let snapshot = Snapshot {
            id: id.clone(),
            name: Some(opts.name.clone()),
            status: "available".to_string(),
            volume_id: opts.volume_id.clone(),
            size,
        };
        self.lock().snapshots.insert(id, snapshot.clone());
        Ok(Snapshot {
            status: "creating".to_string(),
            ..snapshot
        })
    }

    async fn get_snapshot(&self, client: &ServiceClient, id: &str) -> Result<Snapshot, OpenStackError> {
        self.begin("get_snapshot", client)?;
        let mut state = self.lock();
        let scripted = next_status(&mut state.snapshot_statuses, id);
        let snapshot = state
            .snapshots
            .get_mut(id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Snapshot {} not found", id)))?;
        if let Some(status) = scripted {
            snapshot.status = status;
        }
        Ok(snapshot.clone())
    }

    async fn delete_snapshot(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
        self.begin("delete_snapshot", client)?;
        self.lock()
            .snapshots
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| OpenStackError::NotFound(format!("Snapshot {} not found", id)))
    }
}
