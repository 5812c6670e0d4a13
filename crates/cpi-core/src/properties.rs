//! Cloud properties and network settings handed over by the director
//!
//! These are parsed from the RPC arguments by the method layer; the services
//! receive them already validated.

use crate::config::OpenstackConfig;
use crate::error::CpiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cloud properties of `create_vm`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVmCloudProperties {
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub availability_zones: Vec<String>,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub key_name: String,
    #[serde(default)]
    pub security_groups: Vec<String>,
    /// Overrides `openstack.boot_from_volume` when set
    #[serde(default)]
    pub boot_from_volume: Option<bool>,
    #[serde(default)]
    pub root_disk: RootDisk,
    #[serde(default)]
    pub loadbalancer_pools: Vec<LoadbalancerPool>,
    /// IP address the port is allowed to answer for (VRRP)
    #[serde(default)]
    pub allowed_address_pairs: String,
    /// Require a port owning `allowed_address_pairs` to exist
    #[serde(default)]
    pub vrrp_port_check: bool,
}

/// Requested root disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootDisk {
    /// Size in GiB; 0 means use the flavor's root disk
    #[serde(default)]
    pub size: u64,
}

/// Load balancer pool a VM joins on creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadbalancerPool {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub monitoring_port: Option<u16>,
}

impl CreateVmCloudProperties {
    /// Check the combinations the services rely on
    pub fn validate(&self, config: &OpenstackConfig) -> Result<(), CpiError> {
        if self.instance_type.is_empty() {
            return Err(CpiError::Validation(
                "cloud property 'instance_type' must be set".to_string(),
            ));
        }
        if !self.availability_zone.is_empty() && !self.availability_zones.is_empty() {
            return Err(CpiError::Validation(
                "only one of 'availability_zone' and 'availability_zones' may be set".to_string(),
            ));
        }
        if self.availability_zones.len() > 1 && !config.ignore_server_availability_zone {
            return Err(CpiError::Validation(
                "multiple 'availability_zones' require 'openstack.ignore_server_availability_zone' to be enabled"
                    .to_string(),
            ));
        }
        for pool in &self.loadbalancer_pools {
            if pool.name.is_empty() || pool.port == 0 {
                return Err(CpiError::Validation(format!(
                    "load balancer pool '{}' must have a name and a port",
                    pool.name
                )));
            }
        }
        Ok(())
    }

    /// Cloud property if set, else the config default
    #[must_use]
    pub fn boot_from_volume(&self, config: &OpenstackConfig) -> bool {
        self.boot_from_volume.unwrap_or(config.boot_from_volume)
    }
}

/// Cloud properties of `create_disk`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCloudProperties {
    /// Volume type; falls back to `openstack.default_volume_type`
    #[serde(rename = "type", default)]
    pub volume_type: Option<String>,
}

/// Cloud properties of `create_stemcell`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemcellCloudProperties {
    /// Existing image of a light stemcell
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_disk_format")]
    pub disk_format: String,
    #[serde(default = "default_container_format")]
    pub container_format: String,
    #[serde(default)]
    pub os_type: Option<String>,
    #[serde(default)]
    pub os_distro: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub hypervisor: Option<String>,
    #[serde(default)]
    pub auto_disk_config: Option<bool>,
}

fn default_disk_format() -> String {
    "qcow2".to_string()
}

fn default_container_format() -> String {
    "bare".to_string()
}

/// Resources passed to `calculate_vm_cloud_properties`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmResources {
    pub cpu: u32,
    /// MiB
    pub ram: u64,
    /// MiB
    #[serde(default)]
    pub ephemeral_disk_size: u64,
}

/// Network settings of a VM, keyed by network name
pub type Networks = BTreeMap<String, Network>;

/// Kind of a network in the director's settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Manual,
    Dynamic,
    Vip,
}

/// One network of the director's network settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// `manual` (also when absent), `dynamic` or `vip`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub netmask: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub default: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default)]
    pub cloud_properties: NetworkCloudProperties,
}

/// Cloud properties of a network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCloudProperties {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub net_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
}

impl Network {
    /// Classify the network by its `type`
    pub fn kind(&self) -> Result<NetworkType, CpiError> {
        match self.network_type.as_deref() {
            None | Some("" | "manual") => Ok(NetworkType::Manual),
            Some("dynamic") => Ok(NetworkType::Dynamic),
            Some("vip") => Ok(NetworkType::Vip),
            Some(other) => Err(CpiError::Validation(format!("unknown network type '{}'", other))),
        }
    }

    /// OpenStack network ID
    #[must_use]
    pub fn net_id(&self) -> &str {
        &self.cloud_properties.net_id
    }

    /// Whether the `gateway` default is routed through this network
    #[must_use]
    pub fn is_gateway_default(&self) -> bool {
        self.default.iter().any(|d| d == "gateway")
    }
}
