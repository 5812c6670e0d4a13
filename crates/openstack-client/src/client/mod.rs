//! OpenStack API facade
//!
//! `OpenStackFacade` implements every facade trait with plain REST calls.
//! The calls are organized per service:
//! - `compute.rs` - Nova v2.1
//! - `networking.rs` - Neutron v2.0
//! - `volume.rs` - Cinder v3
//! - `loadbalancer.rs` - Octavia v2
//! - `image.rs` - Glance v2

mod compute;
mod image;
mod loadbalancer;
mod networking;
mod volume;

use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::facade::{ComputeFacade, ImageFacade, LoadbalancerFacade, NetworkingFacade, VolumeFacade};
use crate::models::*;
use std::collections::HashMap;

/// Facade over the real OpenStack APIs
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenStackFacade;

#[async_trait::async_trait]
impl ComputeFacade for OpenStackFacade {
    async fn list_flavors(&self, client: &ServiceClient) -> Result<Vec<Flavor>, OpenStackError> {
        compute::list_flavors(client).await
    }

    async fn get_key_pair(&self, client: &ServiceClient, name: &str) -> Result<KeyPair, OpenStackError> {
        compute::get_key_pair(client, name).await
    }

    async fn create_server(&self, client: &ServiceClient, opts: &CreateServerOpts) -> Result<Server, OpenStackError> {
        compute::create_server(client, opts).await
    }

    async fn get_server(&self, client: &ServiceClient, id: &str) -> Result<Server, OpenStackError> {
        compute::get_server(client, id).await
    }

    async fn delete_server(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
        compute::delete_server(client, id).await
    }

    async fn reboot_server(&self, client: &ServiceClient, id: &str, reboot_type: RebootType) -> Result<(), OpenStackError> {
        compute::reboot_server(client, id, reboot_type).await
    }

    async fn update_server_name(&self, client: &ServiceClient, id: &str, name: &str) -> Result<Server, OpenStackError> {
        compute::update_server_name(client, id, name).await
    }

    async fn get_server_metadata(&self, client: &ServiceClient, id: &str) -> Result<HashMap<String, String>, OpenStackError> {
        compute::get_server_metadata(client, id).await
    }

    async fn update_server_metadata(&self, client: &ServiceClient, id: &str, metadata: &HashMap<String, String>) -> Result<HashMap<String, String>, OpenStackError> {
        compute::update_server_metadata(client, id, metadata).await
    }

    async fn delete_server_metadata_item(&self, client: &ServiceClient, id: &str, key: &str) -> Result<(), OpenStackError> {
        compute::delete_server_metadata_item(client, id, key).await
    }

    async fn attach_volume(&self, client: &ServiceClient, server_id: &str, volume_id: &str, device: Option<&str>) -> Result<VolumeAttachment, OpenStackError> {
        compute::attach_volume(client, server_id, volume_id, device).await
    }

    async fn list_volume_attachments(&self, client: &ServiceClient, server_id: &str) -> Result<Vec<VolumeAttachment>, OpenStackError> {
        compute::list_volume_attachments(client, server_id).await
    }

    async fn detach_volume(&self, client: &ServiceClient, server_id: &str, volume_id: &str) -> Result<(), OpenStackError> {
        compute::detach_volume(client, server_id, volume_id).await
    }
}

#[async_trait::async_trait]
impl NetworkingFacade for OpenStackFacade {
    async fn list_subnets(&self, client: &ServiceClient, network_id: &str) -> Result<Vec<Subnet>, OpenStackError> {
        networking::list_subnets(client, network_id).await
    }

    async fn create_port(&self, client: &ServiceClient, opts: &CreatePortOpts) -> Result<Port, OpenStackError> {
        networking::create_port(client, opts).await
    }

    async fn list_ports(&self, client: &ServiceClient, opts: &PortListOpts) -> Result<Vec<Port>, OpenStackError> {
        networking::list_ports(client, opts).await
    }

    async fn delete_port(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
        networking::delete_port(client, id).await
    }

    async fn list_floating_ips(&self, client: &ServiceClient, floating_ip_address: &str) -> Result<Vec<FloatingIp>, OpenStackError> {
        networking::list_floating_ips(client, floating_ip_address).await
    }

    async fn associate_floating_ip(&self, client: &ServiceClient, floating_ip_id: &str, port_id: &str) -> Result<FloatingIp, OpenStackError> {
        networking::associate_floating_ip(client, floating_ip_id, port_id).await
    }

    async fn get_security_group(&self, client: &ServiceClient, id: &str) -> Result<Option<SecurityGroup>, OpenStackError> {
        networking::get_security_group(client, id).await
    }

    async fn list_security_groups(&self, client: &ServiceClient, name: &str) -> Result<Vec<SecurityGroup>, OpenStackError> {
        networking::list_security_groups(client, name).await
    }
}

#[async_trait::async_trait]
impl VolumeFacade for OpenStackFacade {
    async fn create_volume(&self, client: &ServiceClient, opts: &CreateVolumeOpts) -> Result<Volume, OpenStackError> {
        volume::create_volume(client, opts).await
    }

    async fn get_volume(&self, client: &ServiceClient, id: &str) -> Result<Volume, OpenStackError> {
        volume::get_volume(client, id).await
    }

    async fn delete_volume(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
        volume::delete_volume(client, id).await
    }

    async fn extend_volume(&self, client: &ServiceClient, id: &str, new_size: u64) -> Result<(), OpenStackError> {
        volume::extend_volume(client, id, new_size).await
    }

    async fn update_volume_metadata(&self, client: &ServiceClient, id: &str, metadata: &HashMap<String, String>) -> Result<HashMap<String, String>, OpenStackError> {
        volume::update_volume_metadata(client, id, metadata).await
    }

    async fn create_snapshot(&self, client: &ServiceClient, opts: &CreateSnapshotOpts) -> Result<Snapshot, OpenStackError> {
        volume::create_snapshot(client, opts).await
    }

    async fn get_snapshot(&self, client: &ServiceClient, id: &str) -> Result<Snapshot, OpenStackError> {
        volume::get_snapshot(client, id).await
    }

    async fn delete_snapshot(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
        volume::delete_snapshot(client, id).await
    }
}

#[async_trait::async_trait]
impl LoadbalancerFacade for OpenStackFacade {
    async fn list_pools(&self, client: &ServiceClient, name: &str) -> Result<Vec<Pool>, OpenStackError> {
        loadbalancer::list_pools(client, name).await
    }

    async fn get_pool(&self, client: &ServiceClient, id: &str) -> Result<Pool, OpenStackError> {
        loadbalancer::get_pool(client, id).await
    }

    async fn get_listener(&self, client: &ServiceClient, id: &str) -> Result<Listener, OpenStackError> {
        loadbalancer::get_listener(client, id).await
    }

    async fn get_load_balancer(&self, client: &ServiceClient, id: &str) -> Result<LoadBalancer, OpenStackError> {
        loadbalancer::get_load_balancer(client, id).await
    }

    async fn create_pool_member(&self, client: &ServiceClient, pool_id: &str, opts: &CreateMemberOpts) -> Result<Member, OpenStackError> {
        loadbalancer::create_pool_member(client, pool_id, opts).await
    }

    async fn list_pool_members(&self, client: &ServiceClient, pool_id: &str, opts: &MemberListOpts) -> Result<Vec<Member>, OpenStackError> {
        loadbalancer::list_pool_members(client, pool_id, opts).await
    }

    async fn delete_pool_member(&self, client: &ServiceClient, pool_id: &str, member_id: &str) -> Result<(), OpenStackError> {
        loadbalancer::delete_pool_member(client, pool_id, member_id).await
    }
}

#[async_trait::async_trait]
impl ImageFacade for OpenStackFacade {
    async fn get_image(&self, client: &ServiceClient, id: &str) -> Result<Image, OpenStackError> {
        image::get_image(client, id).await
    }

    async fn create_image(&self, client: &ServiceClient, opts: &CreateImageOpts) -> Result<Image, OpenStackError> {
        image::create_image(client, opts).await
    }

    async fn upload_image_data(&self, client: &ServiceClient, id: &str, path: &std::path::Path) -> Result<(), OpenStackError> {
        image::upload_image_data(client, id, path).await
    }

    async fn delete_image(&self, client: &ServiceClient, id: &str) -> Result<(), OpenStackError> {
        image::delete_image(client, id).await
    }
}
