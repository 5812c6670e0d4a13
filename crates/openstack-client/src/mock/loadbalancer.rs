//! Load balancer operations for MockOpenStack

use super::{MockOpenStack, next_status};
use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::facade::LoadbalancerFacade;
use crate::models::*;

#[async_trait::async_trait]
impl LoadbalancerFacade for MockOpenStack {
    async fn list_pools(&self, client: &ServiceClient, name: &str) -> Result<Vec<Pool>, OpenStackError> {
        self.begin("list_pools", client)?;
        let mut pools: Vec<Pool> = self
            .lock()
            .pools
            .values()
            .filter(|p| p.name == name)
            .cloned()
            .collect();
        pools.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(pools)
    }

    async fn get_pool(&self, client: &ServiceClient, id: &str) -> Result<Pool, OpenStackError> {
        self.begin("get_pool", client)?;
        self.lock()
            .pools
            .get(id)
            .cloned()
            .ok_or_else(|| OpenStackError::NotFound(format!("Pool {} not found", id)))
    }

    async fn get_listener(&self, client: &ServiceClient, id: &str) -> Result<Listener, OpenStackError> {
        self.begin("get_listener", client)?;
        self.lock()
            .listeners
            .get(id)
            .cloned()
            .ok_or_else(|| OpenStackError::NotFound(format!("Listener {} not found", id)))
    }

    async fn get_load_balancer(&self, client: &ServiceClient, id: &str) -> Result<LoadBalancer, OpenStackError> {
        self.begin("get_load_balancer", client)?;
        let mut state = self.lock();
        let scripted = next_status(&mut state.load_balancer_statuses, id);
        let load_balancer = state
            .load_balancers
            .get_mut(id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Load balancer {} not found", id)))?;
        if let Some(status) = scripted {
            load_balancer.provisioning_status = status;
        }
        Ok(load_balancer.clone())
    }

    async fn create_pool_member(&self, client: &ServiceClient, pool_id: &str, opts: &CreateMemberOpts) -> Result<Member, OpenStackError> {
        self.begin("create_pool_member", client)?;
        let id = self.next_id("member");
        let mut state = self.lock();
        if !state.pools.contains_key(pool_id) {
            return Err(OpenStackError::NotFound(format!("Pool {} not found", pool_id)));
        }
        let members = state.members.entry(pool_id.to_string()).or_default();
        let duplicate = members.iter().any(|m| {
            m.address == opts.address
                && m.protocol_port == opts.protocol_port
                && m.subnet_id.as_deref() == Some(opts.subnet_id.as_str())
        });
        if duplicate {
            return Err(OpenStackError::Conflict(format!(
                "Duplicate member {}:{} in pool {}",
                opts.address, opts.protocol_port, pool_id
            )));
        }
        let member = Member {
            id,
            address: opts.address.clone(),
            protocol_port: opts.protocol_port,
            subnet_id: Some(opts.subnet_id.clone()),
            monitor_port: opts.monitor_port,
            provisioning_status: "PENDING_CREATE".to_string(),
        };
        members.push(member.clone());
        Ok(member)
    }

    async fn list_pool_members(&self, client: &ServiceClient, pool_id: &str, opts: &MemberListOpts) -> Result<Vec<Member>, OpenStackError> {
        self.begin("list_pool_members", client)?;
        Ok(self
            .lock()
            .members
            .get(pool_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|m| {
                        m.address == opts.address
                            && m.protocol_port == opts.protocol_port
                            && m.subnet_id.as_deref() == Some(opts.subnet_id.as_str())
                            && opts.monitor_port.is_none_or(|p| m.monitor_port == Some(p))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_pool_member(&self, client: &ServiceClient, pool_id: &str, member_id: &str) -> Result<(), OpenStackError> {
        self.begin("delete_pool_member", client)?;
        let mut state = self.lock();
        let members = state.members.entry(pool_id.to_string()).or_default();
        let before = members.len();
        members.retain(|m| m.id != member_id);
        if members.len() == before {
            return Err(OpenStackError::NotFound(format!(
                "Member {} not found in pool {}",
                member_id, pool_id
            )));
        }
        Ok(())
    }
}
