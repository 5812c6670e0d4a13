//! Network service
//!
//! Ports are created on the plain client: a replayed create would allocate a
//! second port. Reads and deletes go through the retryable client.

use super::network_config::{NamedNetwork, NetworkConfig};
use crate::error::{CpiError, ResultExt};
use crate::properties::CreateVmCloudProperties;
use ipnet::IpNet;
use openstack_client::{
    AddressPair, CreatePortOpts, FixedIp, NetworkingFacade, Port, PortListOpts, ServiceClients,
};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Manages ports, subnets and floating IPs of VMs
#[derive(Clone)]
pub struct NetworkService {
    facade: Arc<dyn NetworkingFacade>,
    clients: ServiceClients,
}

impl NetworkService {
    /// Create a network service
    pub fn new(facade: Arc<dyn NetworkingFacade>, clients: ServiceClients) -> Self {
        Self { facade, clients }
    }

    /// ID of the single subnet of `network_id` whose CIDR contains `ip`
    pub async fn get_subnet_id(&self, network_id: &str, ip: &str) -> Result<String, CpiError> {
        let address: IpAddr = ip
            .parse()
            .map_err(|e| CpiError::Validation(format!("invalid IP address '{}': {}", ip, e)))?;

        let subnets = self
            .facade
            .list_subnets(&self.clients.retryable, network_id)
            .await
            .with_context(|| format!("failed to list subnets of network '{}'", network_id))?;

        let mut matching = Vec::new();
        for subnet in subnets {
            let cidr: IpNet = subnet.cidr.parse().map_err(|e| {
                CpiError::Validation(format!("subnet '{}' has an invalid CIDR '{}': {}", subnet.id, subnet.cidr, e))
            })?;
            if cidr.contains(&address) {
                matching.push(subnet.id);
            }
        }

        match matching.len() {
            1 => Ok(matching.remove(0)),
            0 => Err(CpiError::NotFound(format!(
                "no subnet of network '{}' contains IP '{}'",
                network_id, ip
            ))),
            _ => Err(CpiError::Ambiguous(format!(
                "IP '{}' is contained in multiple subnets of network '{}': {}",
                ip,
                network_id,
                matching.join(", ")
            ))),
        }
    }

    /// Create the port of a manual network. A failed create is retried once
    /// after removing an orphaned port holding the same IP.
    pub async fn create_port(
        &self,
        network: &NamedNetwork,
        security_groups: &[String],
        cloud_properties: &CreateVmCloudProperties,
    ) -> Result<Port, CpiError> {
        let net_id = network.net_id();
        let ip = network.ip();
        let subnet_id = self.get_subnet_id(net_id, ip).await?;

        let mut opts = CreatePortOpts {
            network_id: net_id.to_string(),
            fixed_ips: vec![FixedIp {
                ip_address: ip.to_string(),
                subnet_id,
            }],
            security_groups: security_groups.to_vec(),
            allowed_address_pairs: Vec::new(),
        };

        let vrrp_ip = cloud_properties.allowed_address_pairs.as_str();
        if !vrrp_ip.is_empty() {
            if cloud_properties.vrrp_port_check {
                self.check_vrrp_port(vrrp_ip).await?;
            }
            opts.allowed_address_pairs.push(AddressPair {
                ip_address: vrrp_ip.to_string(),
                mac_address: None,
            });
        }

        match self.facade.create_port(&self.clients.client, &opts).await {
            Ok(port) => {
                info!("Created port '{}' with IP {} on network '{}'", port.id, ip, net_id);
                Ok(port)
            }
            Err(e) => {
                warn!(
                    "Failed to create port with IP {} on network '{}': {}. Removing conflicting ports and retrying",
                    ip, net_id, e
                );
                self.delete_conflicting_ports(net_id, ip).await?;
                let port = self
                    .facade
                    .create_port(&self.clients.client, &opts)
                    .await
                    .with_context(|| format!("failed to create port with IP {} on network '{}'", ip, net_id))?;
                info!("Created port '{}' with IP {} on network '{}'", port.id, ip, net_id);
                Ok(port)
            }
        }
    }

    async fn check_vrrp_port(&self, ip: &str) -> Result<(), CpiError> {
        let ports = self
            .facade
            .list_ports(
                &self.clients.retryable,
                &PortListOpts {
                    fixed_ip: Some(ip.to_string()),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("failed to list ports with IP {}", ip))?;
        if ports.is_empty() {
            return Err(CpiError::NotFound(format!(
                "configured VRRP port with IP '{}' does not exist",
                ip
            )));
        }
        Ok(())
    }

    async fn delete_conflicting_ports(&self, network_id: &str, ip: &str) -> Result<(), CpiError> {
        let ports = self
            .facade
            .list_ports(
                &self.clients.retryable,
                &PortListOpts {
                    network_id: Some(network_id.to_string()),
                    fixed_ip: Some(ip.to_string()),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("failed to list ports with IP {} on network '{}'", ip, network_id))?;

        for port in ports.iter().filter(|p| p.status == "DOWN" && p.device_owner.is_empty()) {
            warn!("Deleting orphaned port '{}' holding IP {}", port.id, ip);
            self.facade
                .delete_port(&self.clients.retryable, &port.id)
                .await
                .with_context(|| format!("failed to delete conflicting port '{}'", port.id))?;
        }
        Ok(())
    }

    /// Ports attached to `instance_id`, optionally only those of `network`
    pub async fn get_ports(
        &self,
        instance_id: &str,
        network: Option<&NamedNetwork>,
        retryable: bool,
    ) -> Result<Vec<Port>, CpiError> {
        let opts = PortListOpts {
            device_id: Some(instance_id.to_string()),
            network_id: network.map(|n| n.net_id().to_string()),
            ..Default::default()
        };
        self.facade
            .list_ports(self.clients.select(retryable), &opts)
            .await
            .with_context(|| format!("failed to list ports of server '{}'", instance_id))
    }

    /// Delete `ports`. A port that is already gone ends the run successfully
    /// without touching the remaining ports.
    pub async fn delete_ports(&self, ports: &[Port]) -> Result<(), CpiError> {
        for port in ports {
            debug!("Deleting port '{}'", port.id);
            match self.facade.delete_port(&self.clients.retryable, &port.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    info!("SKIPPING: port '{}' not found, already deleted", port.id);
                    return Ok(());
                }
                Err(e) => return Err(e).with_context(|| format!("failed to delete port '{}'", port.id)),
            }
        }
        Ok(())
    }

    /// Associate the floating IP of the VIP network with the server's
    /// port on the default network
    pub async fn configure_vip_network(
        &self,
        instance_id: &str,
        network_config: &NetworkConfig,
    ) -> Result<(), CpiError> {
        let Some(vip) = &network_config.vip_network else {
            return Ok(());
        };

        let floating_ip = self
            .facade
            .list_floating_ips(&self.clients.retryable, vip.ip())
            .await
            .with_context(|| format!("failed to look up floating IP '{}'", vip.ip()))?
            .into_iter()
            .next()
            .ok_or_else(|| CpiError::NotFound(format!("floating IP '{}' not allocated", vip.ip())))?;

        let ports = self
            .get_ports(instance_id, Some(&network_config.default_network), true)
            .await?;
        let port = ports.first().ok_or_else(|| {
            CpiError::NotFound(format!(
                "server '{}' has no port on network '{}'",
                instance_id, network_config.default_network.name
            ))
        })?;

        self.facade
            .associate_floating_ip(&self.clients.client, &floating_ip.id, &port.id)
            .await
            .with_context(|| {
                format!(
                    "failed to associate floating IP '{}' with port '{}'",
                    floating_ip.floating_ip_address, port.id
                )
            })?;
        info!(
            "Associated floating IP {} with server '{}'",
            floating_ip.floating_ip_address, instance_id
        );
        Ok(())
    }
}
