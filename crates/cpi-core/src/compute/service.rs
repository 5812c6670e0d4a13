//! Compute service
//!
//! Server creation walks the candidate availability zones in order and keeps
//! the first server that becomes ACTIVE.

use super::availability_zone::AvailabilityZoneProvider;
use super::flavor::{FlavorResolver, get_closest_matched_flavor};
use super::user_data::{UserData, UserDataSettings};
use super::volume_configurator::configure_volumes;
use crate::config::{AgentOptions, OpenstackConfig};
use crate::error::{CpiError, ResultExt};
use crate::network::{NetworkConfig, NetworkService};
use crate::polling::PollingConfig;
use crate::properties::{CreateVmCloudProperties, Networks, VmResources};
use openstack_client::{
    ComputeFacade, CreateServerOpts, Flavor, Port, RebootType, Server, ServerNetwork, ServiceClients,
    VolumeAttachment, server_status,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Metadata keys that are overwritten in place instead of deleted first,
/// which keeps their order in the dashboard
const DELETE_METADATA_BLACKLIST: &[&str] = &[
    "director",
    "deployment",
    "instance_group",
    "job",
    "id",
    "name",
    "index",
    "created_at",
    "compiling",
];

const UPDATE_METADATA_BLACKLIST: &[&str] = &["id"];

/// Everything `create_server` needs besides the service's own configuration
#[derive(Debug, Clone, Copy)]
pub struct CreateServerRequest<'a> {
    /// Server name
    pub name: &'a str,
    /// Agent ID written to user data
    pub agent_id: &'a str,
    /// Glance image to boot from
    pub image_id: &'a str,
    /// VM cloud properties
    pub cloud_properties: &'a CreateVmCloudProperties,
    /// Director network settings, echoed into user data
    pub networks: &'a Networks,
    /// Classified networks
    pub network_config: &'a NetworkConfig,
    /// Director `env`, echoed into user data
    pub env: &'a serde_json::Value,
    /// Initial server metadata
    pub metadata: &'a HashMap<String, String>,
}

/// Server lifecycle on Nova
#[derive(Clone)]
pub struct ComputeService {
    facade: Arc<dyn ComputeFacade>,
    clients: ServiceClients,
    flavor_resolver: FlavorResolver,
    az_provider: Arc<dyn AvailabilityZoneProvider>,
    network_service: NetworkService,
    config: OpenstackConfig,
    agent: AgentOptions,
    polling: PollingConfig,
}

impl ComputeService {
    /// Create a compute service
    pub fn new(
        facade: Arc<dyn ComputeFacade>,
        clients: ServiceClients,
        az_provider: Arc<dyn AvailabilityZoneProvider>,
        network_service: NetworkService,
        config: OpenstackConfig,
        agent: AgentOptions,
        polling: PollingConfig,
    ) -> Self {
        let flavor_resolver = FlavorResolver::new(Arc::clone(&facade), clients.clone());
        Self {
            facade,
            clients,
            flavor_resolver,
            az_provider,
            network_service,
            config,
            agent,
            polling,
        }
    }

    /// Flavor resolver backed by the same compute client
    #[must_use]
    pub fn flavor_resolver(&self) -> &FlavorResolver {
        &self.flavor_resolver
    }

    /// Create a server and wait for it to become ACTIVE
    pub async fn create_server(&self, request: &CreateServerRequest<'_>) -> Result<Server, CpiError> {
        let props = request.cloud_properties;

        let flavor = self
            .flavor_resolver
            .resolve_flavor_for_instance_type(&props.instance_type)
            .await?;

        let key_name = self.resolve_key_name(props).await?;
        let block_devices = configure_volumes(request.image_id, &self.config, props, &flavor)?;

        let ports = self.create_ports(request).await?;
        match self
            .create_server_with_ports(request, &flavor, key_name, block_devices, &ports)
            .await
        {
            Ok(server) => Ok(server),
            Err(e) => {
                if let Err(cleanup) = self.network_service.delete_ports(&ports).await {
                    warn!("Failed to clean up ports after server creation failed: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    async fn resolve_key_name(&self, props: &CreateVmCloudProperties) -> Result<String, CpiError> {
        let key_name = if props.key_name.is_empty() {
            self.config.default_key_name.clone().unwrap_or_default()
        } else {
            props.key_name.clone()
        };
        if key_name.is_empty() {
            return Err(CpiError::Validation(
                "key pair name must be set in 'key_name' or 'openstack.default_key_name'".to_string(),
            ));
        }
        self.facade
            .get_key_pair(&self.clients.retryable, &key_name)
            .await
            .with_context(|| format!("failed to get key pair '{}'", key_name))?;
        Ok(key_name)
    }

    async fn create_ports(&self, request: &CreateServerRequest<'_>) -> Result<Vec<Port>, CpiError> {
        let network_config = request.network_config;
        let mut ports = Vec::with_capacity(network_config.manual_networks.len());
        for network in &network_config.manual_networks {
            let created = self
                .network_service
                .create_port(network, &network_config.security_groups, request.cloud_properties)
                .await
                .with_context(|| format!("failed to create port on network '{}'", network.name));
            match created {
                Ok(port) => ports.push(port),
                Err(e) => {
                    if let Err(cleanup) = self.network_service.delete_ports(&ports).await {
                        warn!("Failed to clean up ports: {}", cleanup);
                    }
                    return Err(e);
                }
            }
        }
        Ok(ports)
    }

    async fn create_server_with_ports(
        &self,
        request: &CreateServerRequest<'_>,
        flavor: &Flavor,
        key_name: String,
        block_devices: Vec<openstack_client::BlockDevice>,
        ports: &[Port],
    ) -> Result<Server, CpiError> {
        let network_config = request.network_config;

        let mut nics: Vec<ServerNetwork> = ports
            .iter()
            .map(|p| ServerNetwork {
                port: Some(p.id.clone()),
                ..Default::default()
            })
            .collect();
        if let Some(dynamic) = &network_config.dynamic_network {
            nics.push(ServerNetwork {
                uuid: Some(dynamic.net_id().to_string()),
                ..Default::default()
            });
        }

        let macs: HashMap<String, String> = network_config
            .manual_networks
            .iter()
            .zip(ports)
            .map(|(n, p)| (n.name.clone(), p.mac_address.clone()))
            .collect();
        let user_data = UserData::new(UserDataSettings {
            server_name: request.name,
            agent_id: request.agent_id,
            networks: request.networks,
            macs: &macs,
            flavor,
            env: request.env,
            agent: &self.agent,
            use_dhcp: self.config.use_dhcp,
        })?
        .to_base64()?;

        let mut opts = CreateServerOpts {
            name: request.name.to_string(),
            image_ref: request.image_id.to_string(),
            flavor_ref: flavor.id.clone(),
            key_name,
            security_groups: network_config.security_groups.clone(),
            networks: nics,
            availability_zone: String::new(),
            user_data: Some(user_data),
            config_drive: self.config.config_drive_enabled(),
            metadata: request.metadata.clone(),
            block_devices,
        };

        let zones = self.az_provider.get_availability_zones(request.cloud_properties);
        let last = zones.len().saturating_sub(1);
        for (attempt, zone) in zones.iter().enumerate() {
            opts.availability_zone.clone_from(zone);
            let is_last = attempt == last;

            let server = match self.facade.create_server(&self.clients.client, &opts).await {
                Ok(server) => server,
                Err(e) => {
                    if is_last {
                        return Err(e).with_context(|| format!("failed to create server in availability zone '{}'", zone));
                    }
                    warn!("Failed to create server in availability zone '{}': {}. Trying next zone", zone, e);
                    continue;
                }
            };
            info!("Created server '{}' in availability zone '{}'", server.id, zone);

            match self.wait_for_server_to_become_active(&server.id).await {
                Ok(active) => return Ok(active),
                Err(e) => {
                    if let Err(cleanup) = self.delete_server(&server.id).await {
                        warn!("Failed to delete server '{}' that did not become ACTIVE: {}", server.id, cleanup);
                    }
                    if is_last {
                        return Err(e).with_context(|| {
                            format!("server '{}' did not become ACTIVE in availability zone '{}'", server.id, zone)
                        });
                    }
                    warn!(
                        "Server '{}' did not become ACTIVE in availability zone '{}': {}. Trying next zone",
                        server.id, zone, e
                    );
                }
            }
        }

        Err(CpiError::Validation("no availability zone candidates for server".to_string()))
    }

    /// Poll until the server is ACTIVE. ERROR and DELETED are fatal.
    pub async fn wait_for_server_to_become_active(&self, id: &str) -> Result<Server, CpiError> {
        let deadline = self.polling.deadline();
        loop {
            deadline.check(|| format!("server '{}' to become ACTIVE", id))?;

            let server = self
                .facade
                .get_server(&self.clients.retryable, id)
                .await
                .with_context(|| format!("failed to get server '{}'", id))?;

            match server.status.as_str() {
                server_status::ACTIVE => return Ok(server),
                server_status::ERROR | server_status::DELETED => {
                    let fault = server
                        .fault
                        .as_ref()
                        .map(|f| format!(": {}", f.message))
                        .unwrap_or_default();
                    return Err(CpiError::ResourceState(format!(
                        "server '{}' became {} while waiting for ACTIVE{}",
                        id, server.status, fault
                    )));
                }
                other => debug!("Server '{}' is {}, waiting for ACTIVE", id, other),
            }
            self.polling.pause().await;
        }
    }

    /// Delete a server and wait until it is gone. A missing server is not an error.
    pub async fn delete_server(&self, id: &str) -> Result<(), CpiError> {
        match self.facade.get_server(&self.clients.retryable, id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                info!("SKIPPING: server '{}' not found, already deleted", id);
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("failed to get server '{}'", id)),
        }

        match self.facade.delete_server(&self.clients.retryable, id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("SKIPPING: server '{}' disappeared before delete", id);
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("failed to delete server '{}'", id)),
        }

        self.wait_for_server_to_become_deleted(id).await
    }

    async fn wait_for_server_to_become_deleted(&self, id: &str) -> Result<(), CpiError> {
        let deadline = self.polling.deadline();
        loop {
            deadline.check(|| format!("server '{}' to become DELETED", id))?;

            let server = match self.facade.get_server(&self.clients.retryable, id).await {
                Ok(server) => server,
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e).with_context(|| format!("failed to get server '{}'", id)),
            };

            match server.status.as_str() {
                server_status::DELETED | server_status::TERMINATED => return Ok(()),
                server_status::ERROR => {
                    return Err(CpiError::ResourceState(format!(
                        "server '{}' became ERROR while waiting for DELETED",
                        id
                    )));
                }
                other => debug!("Server '{}' is {}, waiting for DELETED", id, other),
            }
            self.polling.pause().await;
        }
    }

    /// Soft reboot and wait for ACTIVE
    pub async fn reboot_server(&self, id: &str) -> Result<(), CpiError> {
        self.get_server(id).await?;
        self.facade
            .reboot_server(&self.clients.client, id, RebootType::Soft)
            .await
            .with_context(|| format!("failed to reboot server '{}'", id))?;
        self.wait_for_server_to_become_active(id).await?;
        Ok(())
    }

    /// Fetch a server
    pub async fn get_server(&self, id: &str) -> Result<Server, CpiError> {
        self.facade
            .get_server(&self.clients.retryable, id)
            .await
            .with_context(|| format!("failed to get server '{}'", id))
    }

    /// Whether a server exists and is not being torn down
    pub async fn has_server(&self, id: &str) -> Result<bool, CpiError> {
        match self.facade.get_server(&self.clients.retryable, id).await {
            Ok(server) => Ok(!matches!(
                server.status.as_str(),
                server_status::DELETED | server_status::TERMINATED
            )),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e).with_context(|| format!("failed to get server '{}'", id)),
        }
    }

    /// Rename a server
    pub async fn update_server_name(&self, id: &str, name: &str) -> Result<(), CpiError> {
        self.facade
            .update_server_name(&self.clients.retryable, id, name)
            .await
            .with_context(|| format!("failed to rename server '{}' to '{}'", id, name))?;
        Ok(())
    }

    /// Current server metadata
    pub async fn get_server_metadata(&self, id: &str) -> Result<HashMap<String, String>, CpiError> {
        self.facade
            .get_server_metadata(&self.clients.retryable, id)
            .await
            .with_context(|| format!("failed to get metadata of server '{}'", id))
    }

    /// Merge `metadata` into the server's metadata, never touching `id`
    pub async fn update_server_metadata(&self, id: &str, metadata: &HashMap<String, String>) -> Result<(), CpiError> {
        let filtered: HashMap<String, String> = metadata
            .iter()
            .filter(|(k, _)| !UPDATE_METADATA_BLACKLIST.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if filtered.is_empty() {
            debug!("No metadata to update on server '{}'", id);
            return Ok(());
        }
        self.facade
            .update_server_metadata(&self.clients.retryable, id, &filtered)
            .await
            .with_context(|| format!("failed to update metadata of server '{}'", id))?;
        Ok(())
    }

    /// Delete the keys present in both `old_metadata` and `new_metadata`,
    /// except the ones that are overwritten in place
    pub async fn delete_server_metadata(
        &self,
        id: &str,
        old_metadata: &HashMap<String, String>,
        new_metadata: &HashMap<String, String>,
    ) -> Result<(), CpiError> {
        let mut keys: Vec<&String> = old_metadata
            .keys()
            .filter(|k| new_metadata.contains_key(*k))
            .filter(|k| !DELETE_METADATA_BLACKLIST.contains(&k.as_str()))
            .collect();
        if keys.is_empty() {
            info!("SKIPPING: no metadata keys to delete on server '{}'", id);
            return Ok(());
        }
        keys.sort();

        for key in keys {
            self.facade
                .delete_server_metadata_item(&self.clients.retryable, id, key)
                .await
                .with_context(|| format!("failed to delete metadata key '{}' of server '{}'", key, id))?;
        }
        Ok(())
    }

    /// Smallest flavor satisfying `resources`
    pub async fn get_matching_flavor(&self, resources: &VmResources, boot_from_volume: bool) -> Result<Flavor, CpiError> {
        let candidates = self
            .flavor_resolver
            .resolve_flavor_for_requirements(resources, boot_from_volume)
            .await?;
        get_closest_matched_flavor(&candidates).ok_or_else(|| {
            CpiError::NotFound(format!(
                "unable to meet requested VM requirements: {} CPU, {} MB RAM, {} GB Disk",
                resources.cpu,
                resources.ram,
                resources.ephemeral_disk_size.div_ceil(1024)
            ))
        })
    }

    /// Attach a volume; Nova picks the device when `device` is `None`
    pub async fn attach_volume(
        &self,
        server_id: &str,
        volume_id: &str,
        device: Option<&str>,
    ) -> Result<VolumeAttachment, CpiError> {
        self.facade
            .attach_volume(&self.clients.client, server_id, volume_id, device)
            .await
            .with_context(|| format!("failed to attach volume '{}' to server '{}'", volume_id, server_id))
    }

    /// Detach a volume; an attachment that is already gone is skipped
    pub async fn detach_volume(&self, server_id: &str, volume_id: &str) -> Result<(), CpiError> {
        match self
            .facade
            .detach_volume(&self.clients.retryable, server_id, volume_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                info!("SKIPPING: volume '{}' is not attached to server '{}'", volume_id, server_id);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("failed to detach volume '{}' from server '{}'", volume_id, server_id)),
        }
    }

    /// Volumes attached to a server
    pub async fn list_volume_attachments(&self, server_id: &str) -> Result<Vec<VolumeAttachment>, CpiError> {
        self.facade
            .list_volume_attachments(&self.clients.retryable, server_id)
            .await
            .with_context(|| format!("failed to list volume attachments of server '{}'", server_id))
    }
}
