//! Network configuration
//!
//! Classifies the director's network settings into manual, dynamic and VIP
//! networks and picks the security groups for the server's ports.

use super::security_groups::SecurityGroupsResolver;
use crate::config::OpenstackConfig;
use crate::error::{CpiError, ResultExt};
use crate::properties::{CreateVmCloudProperties, Network, NetworkType, Networks};
use std::collections::HashMap;

/// A network together with its name in the director's settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedNetwork {
    /// Name in the director's settings
    pub name: String,
    /// Network settings
    pub network: Network,
}

impl NamedNetwork {
    fn new(name: &str, network: &Network) -> Self {
        Self {
            name: name.to_string(),
            network: network.clone(),
        }
    }

    /// OpenStack network ID
    #[must_use]
    pub fn net_id(&self) -> &str {
        self.network.net_id()
    }

    /// Requested IP address (empty for dynamic networks)
    #[must_use]
    pub fn ip(&self) -> &str {
        &self.network.ip
    }
}

/// Validated network topology of one VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network carrying the default gateway; never a VIP network
    pub default_network: NamedNetwork,
    /// Manual networks in name order
    pub manual_networks: Vec<NamedNetwork>,
    /// The dynamic network, if any
    pub dynamic_network: Option<NamedNetwork>,
    /// The VIP network, if any
    pub vip_network: Option<NamedNetwork>,
    /// Resolved security group IDs
    pub security_groups: Vec<String>,
}

/// Builds a [`NetworkConfig`] from the director's network settings
pub struct NetworkConfigBuilder<'a> {
    resolver: &'a dyn SecurityGroupsResolver,
    config: &'a OpenstackConfig,
}

impl<'a> NetworkConfigBuilder<'a> {
    /// Create a builder resolving security groups through `resolver`
    pub fn new(resolver: &'a dyn SecurityGroupsResolver, config: &'a OpenstackConfig) -> Self {
        Self { resolver, config }
    }

    /// Validate and classify `networks` (processed in name order)
    pub async fn build(
        &self,
        networks: &Networks,
        cloud_properties: &CreateVmCloudProperties,
    ) -> Result<NetworkConfig, CpiError> {
        let mut manual_networks = Vec::new();
        let mut dynamic_network: Option<NamedNetwork> = None;
        let mut vip_network: Option<NamedNetwork> = None;

        for (name, network) in networks {
            match network.kind()? {
                NetworkType::Manual => {
                    if network.net_id().is_empty() {
                        return Err(CpiError::Validation("manual network must have a net_id".to_string()));
                    }
                    manual_networks.push(NamedNetwork::new(name, network));
                }
                NetworkType::Dynamic => {
                    if dynamic_network.is_some() {
                        return Err(CpiError::Validation("only one dynamic network is allowed".to_string()));
                    }
                    dynamic_network = Some(NamedNetwork::new(name, network));
                }
                NetworkType::Vip => {
                    if vip_network.is_some() {
                        return Err(CpiError::Validation("only one VIP network is allowed".to_string()));
                    }
                    vip_network = Some(NamedNetwork::new(name, network));
                }
            }
        }

        if manual_networks.len() > 1 && (self.config.use_dhcp || !self.config.config_drive_enabled()) {
            return Err(CpiError::Validation(
                "multiple manual networks can only be used with 'openstack.use_dhcp=false' and 'openstack.config_drive=cdrom|disk'"
                    .to_string(),
            ));
        }

        check_unique_net_ids(networks)?;

        let default_network = networks
            .iter()
            .filter(|(_, n)| !matches!(n.kind(), Ok(NetworkType::Vip)))
            .find(|(_, n)| n.is_gateway_default())
            .or_else(|| {
                networks
                    .iter()
                    .find(|(_, n)| !matches!(n.kind(), Ok(NetworkType::Vip)))
            })
            .map(|(name, network)| NamedNetwork::new(name, network))
            .ok_or_else(|| {
                CpiError::Validation("at least one manual or dynamic network is required".to_string())
            })?;

        let requested = requested_security_groups(networks, cloud_properties, self.config);
        let security_groups = self
            .resolver
            .resolve(&requested)
            .await
            .context("failed to resolve security groups")?;

        Ok(NetworkConfig {
            default_network,
            manual_networks,
            dynamic_network,
            vip_network,
            security_groups,
        })
    }
}

fn check_unique_net_ids(networks: &Networks) -> Result<(), CpiError> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (name, network) in networks {
        let net_id = network.net_id();
        if net_id.is_empty() {
            continue;
        }
        if let Some(first) = seen.insert(net_id, name) {
            return Err(CpiError::Validation(format!(
                "duplicate net_id '{}' on networks '{}' and '{}'",
                net_id, first, name
            )));
        }
    }
    Ok(())
}

/// Cloud properties first, then the union of the networks' groups, then the config defaults
fn requested_security_groups(
    networks: &Networks,
    cloud_properties: &CreateVmCloudProperties,
    config: &OpenstackConfig,
) -> Vec<String> {
    if !cloud_properties.security_groups.is_empty() {
        return cloud_properties.security_groups.clone();
    }

    let mut union: Vec<String> = Vec::new();
    for group in networks.values().flat_map(|n| &n.cloud_properties.security_groups) {
        if !union.contains(group) {
            union.push(group.clone());
        }
    }
    if !union.is_empty() {
        return union;
    }

    config.default_security_groups.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::NetworkCloudProperties;
    use crate::test_utils::openstack_config;

    /// Resolver that echoes its input
    struct EchoResolver;

    #[async_trait::async_trait]
    impl SecurityGroupsResolver for EchoResolver {
        async fn resolve(&self, names_or_ids: &[String]) -> Result<Vec<String>, CpiError> {
            Ok(names_or_ids.to_vec())
        }
    }

    fn network(network_type: Option<&str>, net_id: &str, groups: &[&str]) -> Network {
        Network {
            network_type: network_type.map(str::to_string),
            ip: "10.0.0.5".to_string(),
            cloud_properties: NetworkCloudProperties {
                net_id: net_id.to_string(),
                security_groups: groups.iter().map(|g| (*g).to_string()).collect(),
            },
            ..Default::default()
        }
    }

    async fn build(networks: Networks, config: &OpenstackConfig) -> Result<NetworkConfig, CpiError> {
        NetworkConfigBuilder::new(&EchoResolver, config)
            .build(&networks, &CreateVmCloudProperties::default())
            .await
    }

    #[tokio::test]
    async fn test_manual_network_without_net_id() {
        let mut networks = Networks::new();
        networks.insert("a".to_string(), network(Some("manual"), "", &[]));
        let err = build(networks, &openstack_config()).await.unwrap_err();
        assert_eq!(err.to_string(), "manual network must have a net_id");
    }

    #[tokio::test]
    async fn test_multiple_manual_networks_need_config_drive_and_no_dhcp() {
        let mut networks = Networks::new();
        networks.insert("a".to_string(), network(None, "net-1", &[]));
        networks.insert("b".to_string(), network(Some("manual"), "net-2", &[]));

        let err = build(networks.clone(), &openstack_config()).await.unwrap_err();
        assert!(err.to_string().starts_with("multiple manual networks can only be used"));

        let mut config = openstack_config();
        config.use_dhcp = false;
        config.config_drive = Some("cdrom".to_string());
        let built = build(networks, &config).await.unwrap();
        assert_eq!(built.manual_networks.len(), 2);
    }

    #[tokio::test]
    async fn test_second_dynamic_or_vip_network_fails() {
        let mut networks = Networks::new();
        networks.insert("a".to_string(), network(Some("dynamic"), "net-1", &[]));
        networks.insert("b".to_string(), network(Some("dynamic"), "net-2", &[]));
        let err = build(networks, &openstack_config()).await.unwrap_err();
        assert_eq!(err.to_string(), "only one dynamic network is allowed");

        let mut networks = Networks::new();
        networks.insert("a".to_string(), network(None, "net-1", &[]));
        networks.insert("b".to_string(), network(Some("vip"), "", &[]));
        networks.insert("c".to_string(), network(Some("vip"), "", &[]));
        let err = build(networks, &openstack_config()).await.unwrap_err();
        assert_eq!(err.to_string(), "only one VIP network is allowed");
    }

    #[tokio::test]
    async fn test_duplicate_net_ids_fail_for_any_type_combination() {
        for (first, second) in [(None, Some("dynamic")), (Some("dynamic"), None), (Some("vip"), None)] {
            let mut networks = Networks::new();
            networks.insert("a".to_string(), network(first, "net-1", &[]));
            networks.insert("b".to_string(), network(second, "net-1", &[]));
            let err = build(networks, &openstack_config()).await.unwrap_err();
            assert_eq!(err.to_string(), "duplicate net_id 'net-1' on networks 'a' and 'b'");
        }
    }

    #[tokio::test]
    async fn test_default_network_prefers_gateway() {
        let mut gateway = network(Some("dynamic"), "net-2", &[]);
        gateway.default = vec!["gateway".to_string()];
        let mut networks = Networks::new();
        networks.insert("a".to_string(), network(None, "net-1", &[]));
        networks.insert("b".to_string(), gateway);
        networks.insert("c".to_string(), network(Some("vip"), "", &[]));

        let built = build(networks, &openstack_config()).await.unwrap();
        assert_eq!(built.default_network.name, "b");
        assert_eq!(built.vip_network.unwrap().name, "c");
    }

    #[tokio::test]
    async fn test_vip_only_is_rejected() {
        let mut networks = Networks::new();
        networks.insert("a".to_string(), network(Some("vip"), "", &[]));
        assert!(build(networks, &openstack_config()).await.is_err());
    }

    #[tokio::test]
    async fn test_security_group_precedence() {
        let mut networks = Networks::new();
        networks.insert("a".to_string(), network(None, "net-1", &["web", "ssh"]));
        networks.insert("b".to_string(), network(Some("dynamic"), "net-2", &["ssh", "db"]));

        let mut config = openstack_config();
        config.default_security_groups = vec!["default".to_string()];

        let union = requested_security_groups(&networks, &CreateVmCloudProperties::default(), &config);
        assert_eq!(union, vec!["web", "ssh", "db"]);

        let props = CreateVmCloudProperties {
            security_groups: vec!["override".to_string()],
            ..Default::default()
        };
        assert_eq!(requested_security_groups(&networks, &props, &config), vec!["override"]);

        let plain: Networks = [("a".to_string(), network(None, "net-1", &[]))].into_iter().collect();
        assert_eq!(
            requested_security_groups(&plain, &CreateVmCloudProperties::default(), &config),
            vec!["default"]
        );
    }
}
