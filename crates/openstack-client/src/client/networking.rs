//! Neutron v2.0 calls

use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::models::*;
use serde::Deserialize;

#[derive(Deserialize)]
struct SubnetsBody {
    subnets: Vec<Subnet>,
}

#[derive(Deserialize)]
struct PortBody {
    port: Port,
}

#[derive(Deserialize)]
struct PortsBody {
    ports: Vec<Port>,
}

#[derive(Deserialize)]
struct FloatingIpBody {
    floatingip: FloatingIp,
}

#[derive(Deserialize)]
struct FloatingIpsBody {
    floatingips: Vec<FloatingIp>,
}

#[derive(Deserialize)]
struct SecurityGroupBody {
    #[serde(default)]
    security_group: Option<SecurityGroup>,
}

#[derive(Deserialize)]
struct SecurityGroupsBody {
    security_groups: Vec<SecurityGroup>,
}

pub async fn list_subnets(client: &ServiceClient, network_id: &str) -> Result<Vec<Subnet>, OpenStackError> {
    let query = ServiceClient::build_query_string(&[("network_id", network_id)]);
    let body: SubnetsBody = client.get(&format!("/v2.0/subnets{}", query)).await?;
    Ok(body.subnets)
}

pub async fn create_port(client: &ServiceClient, opts: &CreatePortOpts) -> Result<Port, OpenStackError> {
    let body: PortBody = client.post("/v2.0/ports", &opts.to_request_body()).await?;
    Ok(body.port)
}

pub async fn list_ports(client: &ServiceClient, opts: &PortListOpts) -> Result<Vec<Port>, OpenStackError> {
    let fixed_ip = opts
        .fixed_ip
        .as_ref()
        .map(|ip| format!("ip_address={}", ip))
        .unwrap_or_default();
    let query = ServiceClient::build_query_string(&[
        ("device_id", opts.device_id.as_deref().unwrap_or_default()),
        ("network_id", opts.network_id.as_deref().unwrap_or_default()),
        ("fixed_ips", fixed_ip.as_str()),
    ]);
    let body: PortsBody = client.get(&format!("/v2.0/ports{}", query)).await?;
    Ok(body.ports)
}

pub async fn delete_port(client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
    client.delete(&format!("/v2.0/ports/{}", id)).await
}

pub async fn list_floating_ips(client: &ServiceClient, floating_ip_address: &str) -> Result<Vec<FloatingIp>, OpenStackError> {
    let query = ServiceClient::build_query_string(&[("floating_ip_address", floating_ip_address)]);
    let body: FloatingIpsBody = client.get(&format!("/v2.0/floatingips{}", query)).await?;
    Ok(body.floatingips)
}

pub async fn associate_floating_ip(
    client: &ServiceClient,
    floating_ip_id: &str,
    port_id: &str,
) -> Result<FloatingIp, OpenStackError> {
    let body = serde_json::json!({ "floatingip": { "port_id": port_id } });
    let response: FloatingIpBody = client
        .put(&format!("/v2.0/floatingips/{}", floating_ip_id), &body)
        .await?;
    Ok(response.floatingip)
}

pub async fn get_security_group(client: &ServiceClient, id: &str) -> Result<Option<SecurityGroup>, OpenStackError> {
    let body: SecurityGroupBody = client
        .get(&format!("/v2.0/security-groups/{}", urlencoding::encode(id)))
        .await?;
    Ok(body.security_group)
}

pub async fn list_security_groups(client: &ServiceClient, name: &str) -> Result<Vec<SecurityGroup>, OpenStackError> {
    let query = ServiceClient::build_query_string(&[("name", name)]);
    let body: SecurityGroupsBody = client.get(&format!("/v2.0/security-groups{}", query)).await?;
    Ok(body.security_groups)
}
