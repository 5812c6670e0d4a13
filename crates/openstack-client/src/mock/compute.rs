//! Compute operations for MockOpenStack

use super::{MockOpenStack, next_status};
use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::facade::ComputeFacade;
use crate::models::*;
use std::collections::HashMap;

#[async_trait::async_trait]
impl ComputeFacade for MockOpenStack {
    async fn list_flavors(&self, client: &ServiceClient) -> Result<Vec<Flavor>, OpenStackError> {
        self.begin("list_flavors", client)?;
        Ok(self.lock().flavors.clone())
    }

    async fn get_key_pair(&self, client: &ServiceClient, name: &str) -> Result<KeyPair, OpenStackError> {
        self.begin("get_key_pair", client)?;
        self.lock()
            .key_pairs
            .get(name)
            .cloned()
            .ok_or_else(|| OpenStackError::NotFound(format!("Key pair {} not found", name)))
    }

    async fn create_server(&self, client: &ServiceClient, opts: &CreateServerOpts) -> Result<Server, OpenStackError> {
        self.lock().server_requests.push(opts.clone());
        self.begin("create_server", client)?;

        if self.lock().failing_zones.contains(&opts.availability_zone) {
            return Err(OpenStackError::Api {
                status: 400,
                message: format!("No valid host was found in {}", opts.availability_zone),
            });
        }

        let id = self.next_id("server");
        let mut state = self.lock();
        let status = state
            .initial_server_status
            .clone()
            .unwrap_or_else(|| server_status::ACTIVE.to_string());
        let server = Server {
            id: id.clone(),
            name: opts.name.clone(),
            status,
            metadata: opts.metadata.clone(),
            availability_zone: (!opts.availability_zone.is_empty()).then(|| opts.availability_zone.clone()),
            fault: None,
        };
        state.servers.insert(id.clone(), server.clone());

        for network in &opts.networks {
            if let Some(port_id) = &network.port {
                if let Some(port) = state.ports.get_mut(port_id) {
                    port.device_id = id.clone();
                    port.device_owner = "compute:nova".to_string();
                    port.status = "ACTIVE".to_string();
                }
            }
        }

        Ok(server)
    }

    async fn get_server(&self, client: &ServiceClient, id: &str) -> Result<Server, OpenStackError> {
        self.begin("get_server", client)?;
        let mut state = self.lock();
        let scripted = next_status(&mut state.server_statuses, id);
        let server = state
            .servers
            .get_mut(id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Server {} not found", id)))?;
        if let Some(status) = scripted {
            server.status = status;
        }
        Ok(server.clone())
    }

    async fn delete_server(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
        self.begin("delete_server", client)?;
        let mut state = self.lock();
        if state.servers.remove(id).is_none() {
            return Err(OpenStackError::NotFound(format!("Server {} not found", id)));
        }
        state.attachments.remove(id);
        for port in state.ports.values_mut().filter(|p| p.device_id == id) {
            port.device_id = String::new();
            port.device_owner = String::new();
            port.status = "DOWN".to_string();
        }
        Ok(())
    }

    async fn reboot_server(&self, client: &ServiceClient, id: &str, _reboot_type: RebootType) -> Result<(), OpenStackError> {
        self.begin("reboot_server", client)?;
        if self.lock().servers.contains_key(id) {
            Ok(())
        } else {
            Err(OpenStackError::NotFound(format!("Server {} not found", id)))
        }
    }

    async fn update_server_name(&self, client: &ServiceClient, id: &str, name: &str) -> Result<Server, OpenStackError> {
        self.begin("update_server_name", client)?;
        let mut state = self.lock();
        let server = state
            .servers
            .get_mut(id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Server {} not found", id)))?;
        server.name = name.to_string();
        Ok(server.clone())
    }

    async fn get_server_metadata(&self, client: &ServiceClient, id: &str) -> Result<HashMap<String, String>, OpenStackError> {
        self.begin("get_server_metadata", client)?;
        self.lock()
            .servers
            .get(id)
            .map(|s| s.metadata.clone())
            .ok_or_else(|| OpenStackError::NotFound(format!("Server {} not found", id)))
    }

    async fn update_server_metadata(
        &self,
        client: &ServiceClient,
        id: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, OpenStackError> {
        self.begin("update_server_metadata", client)?;
        let mut state = self.lock();
        let server = state
            .servers
            .get_mut(id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Server {} not found", id)))?;
        server
            .metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(server.metadata.clone())
    }

    async fn delete_server_metadata_item(&self, client: &ServiceClient, id: &str, key: &str) -> Result<(), OpenStackError> {
        self.begin("delete_server_metadata_item", client)?;
        let mut state = self.lock();
        let server = state
            .servers
            .get_mut(id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Server {} not found", id)))?;
        server
            .metadata
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| OpenStackError::NotFound(format!("Metadata item {} not found", key)))
    }

    async fn attach_volume(
        &self,
        client: &ServiceClient,
        server_id: &str,
        volume_id: &str,
        device: Option<&str>,
    ) -> Result<VolumeAttachment, OpenStackError> {
        self.begin("attach_volume", client)?;
        let mut state = self.lock();
        if !state.servers.contains_key(server_id) {
            return Err(OpenStackError::NotFound(format!("Server {} not found", server_id)));
        }
        let attached = state.attachments.get(server_id).map_or(0, Vec::len);
        let device = device.map_or_else(
            || format!("/dev/vd{}", char::from(b'b' + u8::try_from(attached).unwrap_or(0))),
            str::to_string,
        );
        let volume = state
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Volume {} not found", volume_id)))?;
        if volume.status != "available" {
            return Err(OpenStackError::Api {
                status: 400,
                message: format!("Volume {} status must be available, got {}", volume_id, volume.status),
            });
        }
        volume.status = "in-use".to_string();
        volume.attachments.push(VolumeAttachmentInfo {
            server_id: server_id.to_string(),
            device: Some(device.clone()),
        });

        let attachment = VolumeAttachment {
            id: volume_id.to_string(),
            server_id: server_id.to_string(),
            volume_id: volume_id.to_string(),
            device: Some(device),
        };
        state
            .attachments
            .entry(server_id.to_string())
            .or_default()
            .push(attachment.clone());
        Ok(attachment)
    }

    async fn list_volume_attachments(&self, client: &ServiceClient, server_id: &str) -> Result<Vec<VolumeAttachment>, OpenStackError> {
        self.begin("list_volume_attachments", client)?;
        let state = self.lock();
        if !state.servers.contains_key(server_id) {
            return Err(OpenStackError::NotFound(format!("Server {} not found", server_id)));
        }
        Ok(state.attachments.get(server_id).cloned().unwrap_or_default())
    }

    async fn detach_volume(&self, client: &ServiceClient, server_id: &str, volume_id: &str) -> Result<(), OpenStackError> {
        self.begin("detach_volume", client)?;
        let mut state = self.lock();
        let attachments = state.attachments.entry(server_id.to_string()).or_default();
        let before = attachments.len();
        attachments.retain(|a| a.volume_id != volume_id);
        if attachments.len() == before {
            return Err(OpenStackError::NotFound(format!(
                "Volume {} is not attached to server {}",
                volume_id, server_id
            )));
        }
        if let Some(volume) = state.volumes.get_mut(volume_id) {
            volume.status = "available".to_string();
            volume.attachments.retain(|a| a.server_id != server_id);
        }
        Ok(())
    }
}
