//! VM methods
//!
//! `create_vm` hands the heavy lifting to the compute service. Once the
//! server exists, the VIP and load balancer steps run here; if one of them
//! fails the server is torn down again and the director may retry.

use super::stemcell::image_id;
use super::stringify_metadata;
use crate::cpi::Cpi;
use crate::error::MethodError;
use cpi_core::{
    CpiError, CreateServerRequest, CreateVmCloudProperties, NetworkConfig, NetworkConfigBuilder, Networks,
    OS_OVERHEAD_GB, ResultExt, VmResources,
};
use openstack_client::{CreateMemberOpts, Server};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Server metadata key prefix recording `<pool_id>/<member_id>` memberships
pub const LBAAS_POOL_PREFIX: &str = "lbaas_pool_";

/// Arguments of `create_vm`
#[derive(Debug, Clone)]
pub struct CreateVm {
    pub agent_id: String,
    pub stemcell_cid: String,
    pub cloud_properties: CreateVmCloudProperties,
    pub networks: Networks,
    pub env: Value,
}

pub async fn create_vm(cpi: &Cpi, request: &CreateVm) -> Result<String, MethodError> {
    let props = &request.cloud_properties;
    props.validate(&cpi.config)?;
    if !props.loadbalancer_pools.is_empty() {
        cpi.loadbalancer()?;
    }

    let image_id = image_id(&request.stemcell_cid);
    cpi.images
        .get_image(image_id)
        .await
        .with_context(|| format!("failed to find stemcell '{}'", request.stemcell_cid))?;

    let network_config = NetworkConfigBuilder::new(cpi.security_groups.as_ref(), &cpi.config)
        .build(&request.networks, props)
        .await?;

    let name = format!("vm-{}", Uuid::new_v4());
    let metadata = HashMap::new();
    let server = cpi
        .compute
        .create_server(&CreateServerRequest {
            name: &name,
            agent_id: &request.agent_id,
            image_id,
            cloud_properties: props,
            networks: &request.networks,
            network_config: &network_config,
            env: &request.env,
            metadata: &metadata,
        })
        .await?;

    if let Err(e) = complete_server(cpi, &server, &network_config, props).await {
        warn!("Failed to complete server '{}', deleting it: {}", server.id, e);
        if let Err(cleanup) = delete_vm(cpi, &server.id).await {
            warn!("Failed to clean up server '{}': {}", server.id, cleanup);
        }
        return Err(MethodError::VmCreationFailed(format!(
            "failed to complete server '{}': {}",
            server.id, e
        )));
    }

    info!("Created VM '{}' ({})", server.id, name);
    Ok(server.id)
}

async fn complete_server(
    cpi: &Cpi,
    server: &Server,
    network_config: &NetworkConfig,
    props: &CreateVmCloudProperties,
) -> Result<(), CpiError> {
    cpi.network.configure_vip_network(&server.id, network_config).await?;
    join_pools(cpi, server, network_config, props).await
}

/// Register the server's default network address in every requested pool.
/// Each membership is recorded right away so a later failure can undo it.
async fn join_pools(
    cpi: &Cpi,
    server: &Server,
    network_config: &NetworkConfig,
    props: &CreateVmCloudProperties,
) -> Result<(), CpiError> {
    if props.loadbalancer_pools.is_empty() {
        return Ok(());
    }
    let loadbalancer = cpi.loadbalancer()?;

    let default_network = &network_config.default_network;
    let ports = cpi
        .network
        .get_ports(&server.id, Some(default_network), true)
        .await?;
    let fixed_ip = ports
        .iter()
        .flat_map(|port| port.fixed_ips.iter())
        .next()
        .ok_or_else(|| {
            CpiError::NotFound(format!(
                "server '{}' has no address on network '{}'",
                server.id, default_network.name
            ))
        })?;
    let subnet_id = if fixed_ip.subnet_id.is_empty() {
        cpi.network
            .get_subnet_id(default_network.net_id(), &fixed_ip.ip_address)
            .await?
    } else {
        fixed_ip.subnet_id.clone()
    };

    for (index, pool_props) in props.loadbalancer_pools.iter().enumerate() {
        let pool = loadbalancer.get_pool(&pool_props.name).await?;
        let member = loadbalancer
            .create_pool_member(
                &pool,
                &CreateMemberOpts {
                    name: server.name.clone(),
                    address: fixed_ip.ip_address.clone(),
                    protocol_port: pool_props.port,
                    subnet_id: subnet_id.clone(),
                    monitor_port: pool_props.monitoring_port,
                },
            )
            .await?;

        let membership = HashMap::from([(
            format!("{}{}", LBAAS_POOL_PREFIX, index),
            format!("{}/{}", pool.id, member.id),
        )]);
        cpi.compute.update_server_metadata(&server.id, &membership).await?;
    }
    Ok(())
}

pub async fn delete_vm(cpi: &Cpi, vm_cid: &str) -> Result<(), MethodError> {
    let metadata = match cpi.compute.get_server_metadata(vm_cid).await {
        Ok(metadata) => metadata,
        Err(e) if e.is_not_found() => {
            info!("SKIPPING: server '{}' not found, already deleted", vm_cid);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    leave_pools(cpi, &metadata).await?;

    let ports = cpi.network.get_ports(vm_cid, None, true).await?;
    cpi.compute.delete_server(vm_cid).await?;
    cpi.network.delete_ports(&ports).await?;
    info!("Deleted VM '{}'", vm_cid);
    Ok(())
}

async fn leave_pools(cpi: &Cpi, metadata: &HashMap<String, String>) -> Result<(), CpiError> {
    let mut memberships: Vec<(&String, &String)> = metadata
        .iter()
        .filter(|(key, _)| key.starts_with(LBAAS_POOL_PREFIX))
        .collect();
    if memberships.is_empty() {
        return Ok(());
    }
    memberships.sort();
    let loadbalancer = cpi.loadbalancer()?;

    for (key, value) in memberships {
        let Some((pool_id, member_id)) = value.split_once('/') else {
            warn!("Ignoring malformed pool membership {}={}", key, value);
            continue;
        };
        loadbalancer.delete_pool_member(pool_id, member_id).await?;
    }
    Ok(())
}

pub async fn has_vm(cpi: &Cpi, vm_cid: &str) -> Result<bool, MethodError> {
    Ok(cpi.compute.has_server(vm_cid).await?)
}

pub async fn reboot_vm(cpi: &Cpi, vm_cid: &str) -> Result<(), MethodError> {
    if !cpi.compute.has_server(vm_cid).await? {
        return Err(MethodError::VmNotFound(vm_cid.to_string()));
    }
    cpi.compute.reboot_server(vm_cid).await?;
    Ok(())
}

pub async fn set_vm_metadata(cpi: &Cpi, vm_cid: &str, metadata: &Map<String, Value>) -> Result<(), MethodError> {
    if !cpi.compute.has_server(vm_cid).await? {
        return Err(MethodError::VmNotFound(vm_cid.to_string()));
    }
    let metadata = stringify_metadata(metadata);
    let current = cpi.compute.get_server_metadata(vm_cid).await?;

    cpi.compute.delete_server_metadata(vm_cid, &current, &metadata).await?;
    cpi.compute.update_server_metadata(vm_cid, &metadata).await?;

    if cpi.config.human_readable_vm_names {
        if let Some(name) = human_readable_name(&metadata) {
            cpi.compute.update_server_name(vm_cid, &name).await?;
            info!("Renamed server '{}' to '{}'", vm_cid, name);
        }
    }
    Ok(())
}

fn human_readable_name(metadata: &HashMap<String, String>) -> Option<String> {
    if let Some(name) = metadata.get("name").filter(|n| !n.is_empty()) {
        return Some(name.clone());
    }
    match (metadata.get("job"), metadata.get("index")) {
        (Some(job), Some(index)) => Some(format!("{}/{}", job, index)),
        _ => None,
    }
}

/// Instance type (and root disk when booting from volume) for `resources`
pub async fn calculate_vm_cloud_properties(cpi: &Cpi, resources: &VmResources) -> Result<Value, MethodError> {
    let boot_from_volume = cpi.config.boot_from_volume;
    let flavor = cpi.compute.get_matching_flavor(resources, boot_from_volume).await?;

    let mut properties = json!({ "instance_type": flavor.name });
    if boot_from_volume {
        properties["root_disk"] = json!({
            "size": resources.ephemeral_disk_size.div_ceil(1024) + OS_OVERHEAD_GB,
        });
    }
    Ok(properties)
}
