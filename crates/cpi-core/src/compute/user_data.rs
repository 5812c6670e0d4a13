//! Agent settings delivered as server user data

use crate::config::AgentOptions;
use crate::error::CpiError;
use crate::properties::{NetworkCloudProperties, NetworkType, Networks};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openstack_client::Flavor;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const SYSTEM_DISK: &str = "/dev/sda";
const EPHEMERAL_DISK: &str = "/dev/sdb";

/// Inputs for [`UserData::new`]
#[derive(Debug, Clone, Copy)]
pub struct UserDataSettings<'a> {
    /// Server name, also used as `vm.name`
    pub server_name: &'a str,
    /// Agent ID
    pub agent_id: &'a str,
    /// Director network settings
    pub networks: &'a Networks,
    /// MAC addresses of pre-created ports, by network name
    pub macs: &'a HashMap<String, String>,
    /// Flavor, decides whether an ephemeral disk is announced
    pub flavor: &'a Flavor,
    /// Director `env`
    pub env: &'a serde_json::Value,
    /// `mbus`, `ntp` and `blobstore` settings
    pub agent: &'a AgentOptions,
    /// `openstack.use_dhcp`, applied to manual networks
    pub use_dhcp: bool,
}

/// Settings document read by the agent on first boot
#[derive(Debug, Clone, Serialize)]
pub struct UserData {
    server: Name,
    vm: Name,
    agent_id: String,
    networks: BTreeMap<String, UserDataNetwork>,
    disks: Disks,
    env: serde_json::Value,
    mbus: String,
    ntp: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blobstore: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
struct Name {
    name: String,
}

#[derive(Debug, Clone, Serialize)]
struct UserDataNetwork {
    #[serde(rename = "type")]
    network_type: String,
    ip: String,
    netmask: String,
    gateway: String,
    dns: Vec<String>,
    default: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mac: Option<String>,
    use_dhcp: bool,
    cloud_properties: NetworkCloudProperties,
}

#[derive(Debug, Clone, Serialize)]
struct Disks {
    system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ephemeral: Option<String>,
    persistent: BTreeMap<String, String>,
}

impl UserData {
    /// Build the agent settings from `settings`
    pub fn new(settings: UserDataSettings<'_>) -> Result<Self, CpiError> {
        let mut networks = BTreeMap::new();
        for (name, network) in settings.networks {
            let (network_type, use_dhcp) = match network.kind()? {
                NetworkType::Manual => ("manual", settings.use_dhcp),
                NetworkType::Dynamic => ("dynamic", true),
                NetworkType::Vip => ("vip", false),
            };
            networks.insert(
                name.clone(),
                UserDataNetwork {
                    network_type: network_type.to_string(),
                    ip: network.ip.clone(),
                    netmask: network.netmask.clone(),
                    gateway: network.gateway.clone(),
                    dns: network.dns.clone(),
                    default: network.default.clone(),
                    mac: settings.macs.get(name).cloned().or_else(|| network.mac.clone()),
                    use_dhcp,
                    cloud_properties: network.cloud_properties.clone(),
                },
            );
        }

        Ok(Self {
            server: Name {
                name: settings.server_name.to_string(),
            },
            vm: Name {
                name: settings.server_name.to_string(),
            },
            agent_id: settings.agent_id.to_string(),
            networks,
            disks: Disks {
                system: SYSTEM_DISK.to_string(),
                ephemeral: (settings.flavor.ephemeral > 0).then(|| EPHEMERAL_DISK.to_string()),
                persistent: BTreeMap::new(),
            },
            env: settings.env.clone(),
            mbus: settings.agent.mbus.clone(),
            ntp: settings.agent.ntp.clone(),
            blobstore: settings.agent.blobstore.clone(),
        })
    }

    /// JSON document, base64 encoded for the Nova `user_data` field
    pub fn to_base64(&self) -> Result<String, CpiError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| CpiError::Validation(format!("cannot serialize user data: {}", e)))?;
        Ok(STANDARD.encode(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Network;
    use crate::test_utils::flavor;

    fn decode(user_data: &UserData) -> serde_json::Value {
        let bytes = STANDARD.decode(user_data.to_base64().unwrap()).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_user_data_document() {
        let mut networks = Networks::new();
        networks.insert(
            "private".to_string(),
            Network {
                ip: "10.0.0.5".to_string(),
                netmask: "255.255.255.0".to_string(),
                gateway: "10.0.0.1".to_string(),
                default: vec!["dns".to_string(), "gateway".to_string()],
                cloud_properties: NetworkCloudProperties {
                    net_id: "net-1".to_string(),
                    security_groups: Vec::new(),
                },
                ..Default::default()
            },
        );
        networks.insert(
            "pool".to_string(),
            Network {
                network_type: Some("dynamic".to_string()),
                ..Default::default()
            },
        );
        let mut macs = HashMap::new();
        macs.insert("private".to_string(), "fa:16:3e:00:00:01".to_string());
        let agent = AgentOptions {
            mbus: "nats://nats:4222".to_string(),
            ntp: vec!["0.pool.ntp.org".to_string()],
            blobstore: None,
        };
        let env = serde_json::json!({ "bosh": { "group": "g" } });
        let flavor = flavor("m1.small", 1, 2048, 10, 10);

        let user_data = UserData::new(UserDataSettings {
            server_name: "vm-1234",
            agent_id: "agent-1",
            networks: &networks,
            macs: &macs,
            flavor: &flavor,
            env: &env,
            agent: &agent,
            use_dhcp: false,
        })
        .unwrap();
        let doc = decode(&user_data);

        assert_eq!(doc["server"]["name"], "vm-1234");
        assert_eq!(doc["vm"]["name"], "vm-1234");
        assert_eq!(doc["agent_id"], "agent-1");
        assert_eq!(doc["networks"]["private"]["type"], "manual");
        assert_eq!(doc["networks"]["private"]["mac"], "fa:16:3e:00:00:01");
        assert_eq!(doc["networks"]["private"]["use_dhcp"], false);
        assert_eq!(doc["networks"]["pool"]["use_dhcp"], true);
        assert_eq!(doc["disks"]["system"], "/dev/sda");
        assert_eq!(doc["disks"]["ephemeral"], "/dev/sdb");
        assert_eq!(doc["env"]["bosh"]["group"], "g");
        assert_eq!(doc["mbus"], "nats://nats:4222");
        assert!(doc.get("blobstore").is_none());
    }

    #[test]
    fn test_no_ephemeral_disk_without_ephemeral_flavor() {
        let networks = Networks::new();
        let user_data = UserData::new(UserDataSettings {
            server_name: "vm-1",
            agent_id: "agent-1",
            networks: &networks,
            macs: &HashMap::new(),
            flavor: &flavor("f", 1, 1024, 10, 0),
            env: &serde_json::Value::Null,
            agent: &AgentOptions::default(),
            use_dhcp: true,
        })
        .unwrap();
        assert!(decode(&user_data)["disks"].get("ephemeral").is_none());
    }
}
