//! OpenStack API models
//!
//! Only the fields the CPI reads are modelled; everything else in the API
//! responses is ignored on deserialization.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Compute (Nova)
// ---------------------------------------------------------------------------

/// Flavor catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    pub vcpus: u32,
    /// RAM in MiB
    pub ram: u64,
    /// Root disk in GiB
    pub disk: u64,
    /// Ephemeral disk in GiB
    #[serde(rename = "OS-FLV-EXT-DATA:ephemeral", default)]
    pub ephemeral: u64,
}

/// SSH key pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPair {
    pub name: String,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

/// Server status values observed while polling
pub mod server_status {
    pub const ACTIVE: &str = "ACTIVE";
    pub const ERROR: &str = "ERROR";
    pub const DELETED: &str = "DELETED";
    pub const TERMINATED: &str = "TERMINATED";
    pub const BUILD: &str = "BUILD";
    pub const REBOOT: &str = "REBOOT";
}

/// Compute server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(rename = "OS-EXT-AZ:availability_zone", default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub fault: Option<ServerFault>,
}

/// Fault details reported for servers in ERROR
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerFault {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// NIC of a server create request: a network or a pre-created port
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerNetwork {
    pub uuid: Option<String>,
    pub port: Option<String>,
    pub fixed_ip: Option<String>,
}

/// `block_device_mapping_v2` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    pub uuid: String,
    pub source_type: String,
    pub destination_type: String,
    pub boot_index: i32,
    pub delete_on_termination: bool,
    pub volume_size: u64,
}

/// Options of a server create request
#[derive(Debug, Clone, Default)]
pub struct CreateServerOpts {
    pub name: String,
    pub image_ref: String,
    pub flavor_ref: String,
    pub key_name: String,
    /// Security group IDs or names
    pub security_groups: Vec<String>,
    pub networks: Vec<ServerNetwork>,
    /// Empty means let the cloud choose
    pub availability_zone: String,
    /// Base64 encoded user data
    pub user_data: Option<String>,
    pub config_drive: bool,
    pub metadata: HashMap<String, String>,
    pub block_devices: Vec<BlockDevice>,
}

impl CreateServerOpts {
    /// Request body for `POST /servers`
    pub fn to_request_body(&self) -> serde_json::Value {
        let networks: Vec<serde_json::Value> = self
            .networks
            .iter()
            .map(|n| {
                let mut nic = serde_json::Map::new();
                if let Some(uuid) = &n.uuid {
                    nic.insert("uuid".to_string(), serde_json::json!(uuid));
                }
                if let Some(port) = &n.port {
                    nic.insert("port".to_string(), serde_json::json!(port));
                }
                if let Some(ip) = &n.fixed_ip {
                    nic.insert("fixed_ip".to_string(), serde_json::json!(ip));
                }
                serde_json::Value::Object(nic)
            })
            .collect();

        let mut server = serde_json::json!({
            "name": self.name,
            "flavorRef": self.flavor_ref,
            "key_name": self.key_name,
            "networks": networks,
            "config_drive": self.config_drive,
            "metadata": self.metadata,
        });

        if !self.security_groups.is_empty() {
            server["security_groups"] = self
                .security_groups
                .iter()
                .map(|sg| serde_json::json!({ "name": sg }))
                .collect();
        }
        if self.block_devices.is_empty() {
            server["imageRef"] = serde_json::json!(self.image_ref);
        } else {
            server["block_device_mapping_v2"] = serde_json::json!(self.block_devices);
        }
        if !self.availability_zone.is_empty() {
            server["availability_zone"] = serde_json::json!(self.availability_zone);
        }
        if let Some(user_data) = &self.user_data {
            server["user_data"] = serde_json::json!(user_data);
        }

        serde_json::json!({ "server": server })
    }
}

/// Server reboot type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootType {
    Soft,
    Hard,
}

impl RebootType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Soft => "SOFT",
            Self::Hard => "HARD",
        }
    }
}

/// Volume attached to a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub id: String,
    #[serde(rename = "serverId")]
    pub server_id: String,
    #[serde(rename = "volumeId")]
    pub volume_id: String,
    #[serde(default)]
    pub device: Option<String>,
}

// ---------------------------------------------------------------------------
// Networking (Neutron)
// ---------------------------------------------------------------------------

/// Subnet of a network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
    pub cidr: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gateway_ip: Option<String>,
}

/// Fixed IP of a port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    pub ip_address: String,
    #[serde(default)]
    pub subnet_id: String,
}

/// Allowed address pair of a port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPair {
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

/// Network port
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub network_id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_owner: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub allowed_address_pairs: Vec<AddressPair>,
}

/// Options of a port create request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatePortOpts {
    pub network_id: String,
    pub fixed_ips: Vec<FixedIp>,
    /// Security group IDs
    pub security_groups: Vec<String>,
    pub allowed_address_pairs: Vec<AddressPair>,
}

impl CreatePortOpts {
    /// Request body for `POST /v2.0/ports`
    pub fn to_request_body(&self) -> serde_json::Value {
        let mut port = serde_json::json!({
            "network_id": self.network_id,
            "fixed_ips": self.fixed_ips,
            "security_groups": self.security_groups,
        });
        if !self.allowed_address_pairs.is_empty() {
            port["allowed_address_pairs"] = serde_json::json!(self.allowed_address_pairs);
        }
        serde_json::json!({ "port": port })
    }
}

/// Filters for listing ports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortListOpts {
    pub device_id: Option<String>,
    pub network_id: Option<String>,
    pub fixed_ip: Option<String>,
}

/// Floating IP
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    pub floating_ip_address: String,
    #[serde(default)]
    pub floating_network_id: String,
    #[serde(default)]
    pub port_id: Option<String>,
}

/// Security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Block storage (Cinder)
// ---------------------------------------------------------------------------

/// Block storage volume
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    /// Size in GiB
    pub size: u64,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<VolumeAttachmentInfo>,
}

/// Attachment entry reported on a volume
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeAttachmentInfo {
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub device: Option<String>,
}

/// Options of a volume create request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateVolumeOpts {
    /// Size in GiB
    pub size: u64,
    pub name: String,
    pub description: String,
    pub availability_zone: Option<String>,
    pub volume_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl CreateVolumeOpts {
    /// Request body for `POST /volumes`
    pub fn to_request_body(&self) -> serde_json::Value {
        let mut volume = serde_json::json!({
            "size": self.size,
            "name": self.name,
            "description": self.description,
            "metadata": self.metadata,
        });
        if let Some(az) = &self.availability_zone {
            volume["availability_zone"] = serde_json::json!(az);
        }
        if let Some(volume_type) = &self.volume_type {
            volume["volume_type"] = serde_json::json!(volume_type);
        }
        serde_json::json!({ "volume": volume })
    }
}

/// Volume snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    #[serde(default)]
    pub volume_id: String,
    #[serde(default)]
    pub size: u64,
}

/// Options of a snapshot create request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSnapshotOpts {
    pub volume_id: String,
    pub name: String,
    pub description: String,
    pub force: bool,
    pub metadata: HashMap<String, String>,
}

impl CreateSnapshotOpts {
    /// Request body for `POST /snapshots`
    pub fn to_request_body(&self) -> serde_json::Value {
        serde_json::json!({
            "snapshot": {
                "volume_id": self.volume_id,
                "name": self.name,
                "description": self.description,
                "force": self.force,
                "metadata": self.metadata,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Load balancer (Octavia)
// ---------------------------------------------------------------------------

/// Reference to another resource by ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: String,
}

/// Load balancer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub provisioning_status: String,
    #[serde(default)]
    pub operating_status: String,
}

/// Load balancer pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub loadbalancers: Vec<IdRef>,
    #[serde(default)]
    pub listeners: Vec<IdRef>,
}

/// Load balancer listener
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Listener {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub loadbalancers: Vec<IdRef>,
}

/// Pool member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub address: String,
    pub protocol_port: u16,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub monitor_port: Option<u16>,
    #[serde(default)]
    pub provisioning_status: String,
}

/// Options of a pool member create request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateMemberOpts {
    pub name: String,
    pub address: String,
    pub protocol_port: u16,
    pub subnet_id: String,
    pub monitor_port: Option<u16>,
}

impl CreateMemberOpts {
    /// Request body for `POST /v2/lbaas/pools/{pool_id}/members`
    pub fn to_request_body(&self) -> serde_json::Value {
        let mut member = serde_json::json!({
            "name": self.name,
            "address": self.address,
            "protocol_port": self.protocol_port,
            "subnet_id": self.subnet_id,
        });
        if let Some(port) = self.monitor_port {
            member["monitor_port"] = serde_json::json!(port);
        }
        serde_json::json!({ "member": member })
    }
}

/// Filters for listing pool members
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberListOpts {
    pub address: String,
    pub protocol_port: u16,
    pub subnet_id: String,
    pub monitor_port: Option<u16>,
}

// ---------------------------------------------------------------------------
// Image (Glance)
// ---------------------------------------------------------------------------

/// Glance image
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    #[serde(default)]
    pub visibility: Option<String>,
}

/// Options of an image create request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateImageOpts {
    pub name: String,
    pub disk_format: String,
    pub container_format: String,
    pub visibility: String,
    /// Additional image properties (os_type, version, hypervisor_type, ...)
    pub properties: HashMap<String, String>,
}

impl CreateImageOpts {
    /// Request body for `POST /v2/images`; properties are top-level keys in Glance v2
    pub fn to_request_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "name": self.name,
            "disk_format": self.disk_format,
            "container_format": self.container_format,
            "visibility": self.visibility,
        });
        for (key, value) in &self.properties {
            if body.get(key).is_none() {
                body[key.as_str()] = serde_json::json!(value);
            }
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_deserializes_ephemeral() {
        let flavor: Flavor = serde_json::from_value(serde_json::json!({
            "id": "1", "name": "m1.small", "vcpus": 1, "ram": 2048, "disk": 20,
            "OS-FLV-EXT-DATA:ephemeral": 10
        }))
        .unwrap();
        assert_eq!(flavor.ephemeral, 10);
    }

    #[test]
    fn test_create_server_body_boot_from_image() {
        let opts = CreateServerOpts {
            name: "vm-1".to_string(),
            image_ref: "image-1".to_string(),
            flavor_ref: "flavor-1".to_string(),
            key_name: "key".to_string(),
            security_groups: vec!["sg-1".to_string()],
            networks: vec![ServerNetwork {
                port: Some("port-1".to_string()),
                ..Default::default()
            }],
            availability_zone: "z1".to_string(),
            ..Default::default()
        };
        let body = opts.to_request_body();

        assert_eq!(body["server"]["imageRef"], "image-1");
        assert_eq!(body["server"]["availability_zone"], "z1");
        assert_eq!(body["server"]["networks"][0]["port"], "port-1");
        assert_eq!(body["server"]["security_groups"][0]["name"], "sg-1");
        assert!(body["server"].get("block_device_mapping_v2").is_none());
    }

    #[test]
    fn test_create_server_body_boot_from_volume_omits_image_ref() {
        let opts = CreateServerOpts {
            image_ref: "image-1".to_string(),
            block_devices: vec![BlockDevice {
                uuid: "image-1".to_string(),
                source_type: "image".to_string(),
                destination_type: "volume".to_string(),
                boot_index: 0,
                delete_on_termination: true,
                volume_size: 10,
            }],
            ..Default::default()
        };
        let body = opts.to_request_body();

        assert!(body["server"].get("imageRef").is_none());
        assert!(body["server"].get("availability_zone").is_none());
        assert_eq!(body["server"]["block_device_mapping_v2"][0]["volume_size"], 10);
    }

    #[test]
    fn test_create_image_body_flattens_properties() {
        let mut properties = HashMap::new();
        properties.insert("os_type".to_string(), "linux".to_string());
        let opts = CreateImageOpts {
            name: "bosh-stemcell".to_string(),
            disk_format: "qcow2".to_string(),
            container_format: "bare".to_string(),
            visibility: "private".to_string(),
            properties,
        };
        let body = opts.to_request_body();
        assert_eq!(body["os_type"], "linux");
        assert_eq!(body["visibility"], "private");
    }
}
