//! Resource facades
//!
//! One trait per OpenStack service, one method per remote operation. Every
//! method takes the `ServiceClient` to issue the call with, so callers decide
//! between the plain and the retryable client. No business logic lives here.
//! The concrete `OpenStackFacade` implements all of them, and tests can use
//! `MockOpenStack`.

use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::models::*;
use std::collections::HashMap;

/// Nova operations
#[async_trait::async_trait]
pub trait ComputeFacade: Send + Sync {
    async fn list_flavors(&self, client: &ServiceClient) -> Result<Vec<Flavor>, OpenStackError>;
    async fn get_key_pair(&self, client: &ServiceClient, name: &str) -> Result<KeyPair, OpenStackError>;
    async fn create_server(&self, client: &ServiceClient, opts: &CreateServerOpts) -> Result<Server, OpenStackError>;
    async fn get_server(&self, client: &ServiceClient, id: &str) -> Result<Server, OpenStackError>;
    async fn delete_server(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError>;
    async fn reboot_server(&self, client: &ServiceClient, id: &str, reboot_type: RebootType) -> Result<(), OpenStackError>;
    async fn update_server_name(&self, client: &ServiceClient, id: &str, name: &str) -> Result<Server, OpenStackError>;
    async fn get_server_metadata(&self, client: &ServiceClient, id: &str) -> Result<HashMap<String, String>, OpenStackError>;
    async fn update_server_metadata(&self, client: &ServiceClient, id: &str, metadata: &HashMap<String, String>) -> Result<HashMap<String, String>, OpenStackError>;
    async fn delete_server_metadata_item(&self, client: &ServiceClient, id: &str, key: &str) -> Result<(), OpenStackError>;
    async fn attach_volume(&self, client: &ServiceClient, server_id: &str, volume_id: &str, device: Option<&str>) -> Result<VolumeAttachment, OpenStackError>;
    async fn list_volume_attachments(&self, client: &ServiceClient, server_id: &str) -> Result<Vec<VolumeAttachment>, OpenStackError>;
    async fn detach_volume(&self, client: &ServiceClient, server_id: &str, volume_id: &str) -> Result<(), OpenStackError>;
}

/// Neutron operations
#[async_trait::async_trait]
pub trait NetworkingFacade: Send + Sync {
    async fn list_subnets(&self, client: &ServiceClient, network_id: &str) -> Result<Vec<Subnet>, OpenStackError>;
    async fn create_port(&self, client: &ServiceClient, opts: &CreatePortOpts) -> Result<Port, OpenStackError>;
    async fn list_ports(&self, client: &ServiceClient, opts: &PortListOpts) -> Result<Vec<Port>, OpenStackError>;
    async fn delete_port(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError>;
    async fn list_floating_ips(&self, client: &ServiceClient, floating_ip_address: &str) -> Result<Vec<FloatingIp>, OpenStackError>;
    async fn associate_floating_ip(&self, client: &ServiceClient, floating_ip_id: &str, port_id: &str) -> Result<FloatingIp, OpenStackError>;
    /// `Ok(None)` when the API answered without a security group body
    async fn get_security_group(&self, client: &ServiceClient, id: &str) -> Result<Option<SecurityGroup>, OpenStackError>;
    async fn list_security_groups(&self, client: &ServiceClient, name: &str) -> Result<Vec<SecurityGroup>, OpenStackError>;
}

/// Cinder operations
#[async_trait::async_trait]
pub trait VolumeFacade: Send + Sync {
    async fn create_volume(&self, client: &ServiceClient, opts: &CreateVolumeOpts) -> Result<Volume, OpenStackError>;
    async fn get_volume(&self, client: &ServiceClient, id: &str) -> Result<Volume, OpenStackError>;
    async fn delete_volume(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError>;
    async fn extend_volume(&self, client: &ServiceClient, id: &str, new_size: u64) -> Result<(), OpenStackError>;
    async fn update_volume_metadata(&self, client: &ServiceClient, id: &str, metadata: &HashMap<String, String>) -> Result<HashMap<String, String>, OpenStackError>;
    async fn create_snapshot(&self, client: &ServiceClient, opts: &CreateSnapshotOpts) -> Result<Snapshot, OpenStackError>;
    async fn get_snapshot(&self, client: &ServiceClient, id: &str) -> Result<Snapshot, OpenStackError>;
    async fn delete_snapshot(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError>;
}

/// Octavia operations
#[async_trait::async_trait]
pub trait LoadbalancerFacade: Send + Sync {
    async fn list_pools(&self, client: &ServiceClient, name: &str) -> Result<Vec<Pool>, OpenStackError>;
    async fn get_pool(&self, client: &ServiceClient, id: &str) -> Result<Pool, OpenStackError>;
    async fn get_listener(&self, client: &ServiceClient, id: &str) -> Result<Listener, OpenStackError>;
    async fn get_load_balancer(&self, client: &ServiceClient, id: &str) -> Result<LoadBalancer, OpenStackError>;
    async fn create_pool_member(&self, client: &ServiceClient, pool_id: &str, opts: &CreateMemberOpts) -> Result<Member, OpenStackError>;
    async fn list_pool_members(&self, client: &ServiceClient, pool_id: &str, opts: &MemberListOpts) -> Result<Vec<Member>, OpenStackError>;
    async fn delete_pool_member(&self, client: &ServiceClient, pool_id: &str, member_id: &str) -> Result<(), OpenStackError>;
}

/// Glance operations
#[async_trait::async_trait]
pub trait ImageFacade: Send + Sync {
    async fn get_image(&self, client: &ServiceClient, id: &str) -> Result<Image, OpenStackError>;
    async fn create_image(&self, client: &ServiceClient, opts: &CreateImageOpts) -> Result<Image, OpenStackError>;
    async fn upload_image_data(&self, client: &ServiceClient, id: &str, path: &std::path::Path) -> Result<(), OpenStackError>;
    async fn delete_image(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError>;
}
