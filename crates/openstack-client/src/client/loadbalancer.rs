//! Octavia v2 calls

use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::models::*;
use serde::Deserialize;

#[derive(Deserialize)]
struct PoolsBody {
    pools: Vec<Pool>,
}

#[derive(Deserialize)]
struct PoolBody {
    pool: Pool,
}

#[derive(Deserialize)]
struct ListenerBody {
    listener: Listener,
}

#[derive(Deserialize)]
struct LoadBalancerBody {
    loadbalancer: LoadBalancer,
}

#[derive(Deserialize)]
struct MemberBody {
    member: Member,
}

#[derive(Deserialize)]
struct MembersBody {
    members: Vec<Member>,
}

pub async fn list_pools(client: &ServiceClient, name: &str) -> Result<Vec<Pool>, OpenStackError> {
    let query = ServiceClient::build_query_string(&[("name", name)]);
    let body: PoolsBody = client.get(&format!("/v2/lbaas/pools{}", query)).await?;
    Ok(body.pools)
}

pub async fn get_pool(client: &ServiceClient, id: &str) -> Result<Pool, OpenStackError> {
    let body: PoolBody = client.get(&format!("/v2/lbaas/pools/{}", id)).await?;
    Ok(body.pool)
}

pub async fn get_listener(client: &ServiceClient, id: &str) -> Result<Listener, OpenStackError> {
    let body: ListenerBody = client.get(&format!("/v2/lbaas/listeners/{}", id)).await?;
    Ok(body.listener)
}

pub async fn get_load_balancer(client: &ServiceClient, id: &str) -> Result<LoadBalancer, OpenStackError> {
    let body: LoadBalancerBody = client.get(&format!("/v2/lbaas/loadbalancers/{}", id)).await?;
    Ok(body.loadbalancer)
}

pub async fn create_pool_member(
    client: &ServiceClient,
    pool_id: &str,
    opts: &CreateMemberOpts,
) -> Result<Member, OpenStackError> {
    let body: MemberBody = client
        .post(&format!("/v2/lbaas/pools/{}/members", pool_id), &opts.to_request_body())
        .await?;
    Ok(body.member)
}

pub async fn list_pool_members(
    client: &ServiceClient,
    pool_id: &str,
    opts: &MemberListOpts,
) -> Result<Vec<Member>, OpenStackError> {
    let protocol_port = opts.protocol_port.to_string();
    let monitor_port = opts.monitor_port.map(|p| p.to_string()).unwrap_or_default();
    let query = ServiceClient::build_query_string(&[
        ("address", opts.address.as_str()),
        ("protocol_port", protocol_port.as_str()),
        ("subnet_id", opts.subnet_id.as_str()),
        ("monitor_port", monitor_port.as_str()),
    ]);
    let body: MembersBody = client
        .get(&format!("/v2/lbaas/pools/{}/members{}", pool_id, query))
        .await?;
    Ok(body.members)
}

pub async fn delete_pool_member(client: &ServiceClient, pool_id: &str, member_id: &str) -> Result<(), OpenStackError> {
    client
        .delete(&format!("/v2/lbaas/pools/{}/members/{}", pool_id, member_id))
        .await
}
