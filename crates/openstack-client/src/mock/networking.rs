//! Networking operations for MockOpenStack

use super::MockOpenStack;
use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::facade::NetworkingFacade;
use crate::models::*;

#[async_trait::async_trait]
impl NetworkingFacade for MockOpenStack {
    async fn list_subnets(&self, client: &ServiceClient, network_id: &str) -> Result<Vec<Subnet>, OpenStackError> {
        self.begin("list_subnets", client)?;
        Ok(self
            .lock()
            .subnets
            .iter()
            .filter(|s| s.network_id == network_id)
            .cloned()
            .collect())
    }

    async fn create_port(&self, client: &ServiceClient, opts: &CreatePortOpts) -> Result<Port, OpenStackError> {
        self.lock().port_requests.push(opts.clone());
        self.begin("create_port", client)?;

        let id = self.next_id("port");
        let mut state = self.lock();
        let in_use = opts.fixed_ips.iter().any(|wanted| {
            state.ports.values().any(|p| {
                p.network_id == opts.network_id
                    && p.fixed_ips.iter().any(|ip| ip.ip_address == wanted.ip_address)
            })
        });
        if in_use {
            return Err(OpenStackError::Conflict(format!(
                "IP address already allocated on network {}",
                opts.network_id
            )));
        }

        let suffix = state.next_id;
        let port = Port {
            id: id.clone(),
            network_id: opts.network_id.clone(),
            device_id: String::new(),
            device_owner: String::new(),
            status: "DOWN".to_string(),
            mac_address: format!("fa:16:3e:00:00:{:02x}", suffix % 256),
            fixed_ips: opts.fixed_ips.clone(),
            allowed_address_pairs: opts.allowed_address_pairs.clone(),
        };
        state.ports.insert(id, port.clone());
        Ok(port)
    }

    async fn list_ports(&self, client: &ServiceClient, opts: &PortListOpts) -> Result<Vec<Port>, OpenStackError> {
        self.begin("list_ports", client)?;
        let mut ports: Vec<Port> = self
            .lock()
            .ports
            .values()
            .filter(|p| opts.device_id.as_ref().is_none_or(|d| &p.device_id == d))
            .filter(|p| opts.network_id.as_ref().is_none_or(|n| &p.network_id == n))
            .filter(|p| {
                opts.fixed_ip
                    .as_ref()
                    .is_none_or(|ip| p.fixed_ips.iter().any(|f| &f.ip_address == ip))
            })
            .cloned()
            .collect();
        ports.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(ports)
    }

    async fn delete_port(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
        self.begin("delete_port", client)?;
        self.lock()
            .ports
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| OpenStackError::NotFound(format!("Port {} not found", id)))
    }

    async fn list_floating_ips(&self, client: &ServiceClient, floating_ip_address: &str) -> Result<Vec<FloatingIp>, OpenStackError> {
        self.begin("list_floating_ips", client)?;
        Ok(self
            .lock()
            .floating_ips
            .values()
            .filter(|f| f.floating_ip_address == floating_ip_address)
            .cloned()
            .collect())
    }

    async fn associate_floating_ip(&self, client: &ServiceClient, floating_ip_id: &str, port_id: &str) -> Result<FloatingIp, OpenStackError> {
        self.begin("associate_floating_ip", client)?;
        let mut state = self.lock();
        let floating_ip = state
            .floating_ips
            .get_mut(floating_ip_id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Floating IP {} not found", floating_ip_id)))?;
        floating_ip.port_id = Some(port_id.to_string());
        Ok(floating_ip.clone())
    }

    async fn get_security_group(&self, client: &ServiceClient, id: &str) -> Result<Option<SecurityGroup>, OpenStackError> {
        self.begin("get_security_group", client)?;
        let state = self.lock();
        if state.empty_security_group_ids.contains(id) {
            return Ok(None);
        }
        state
            .security_groups
            .iter()
            .find(|g| g.id == id)
            .cloned()
            .map(Some)
            .ok_or_else(|| OpenStackError::NotFound(format!("Security group {} not found", id)))
    }

    async fn list_security_groups(&self, client: &ServiceClient, name: &str) -> Result<Vec<SecurityGroup>, OpenStackError> {
        self.begin("list_security_groups", client)?;
        Ok(self
            .lock()
            .security_groups
            .iter()
            .filter(|g| g.name == name)
            .cloned()
            .collect())
    }
}
