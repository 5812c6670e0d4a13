//! OpenStack CPI core
//!
//! The resource lifecycle layer of the CPI. Each service drives one OpenStack
//! API through its facade and turns the asynchronous remote operations into
//! calls that return once the resource reached its target state.
//!
//! - [`compute`] - flavor resolution, boot volumes, agent user data and servers
//! - [`network`] - network classification, security groups, ports and VIPs
//! - [`volume`] - volumes and snapshots
//! - [`loadbalancer`] - pool memberships
//! - [`image`] - stemcell images
//!
//! Every service receives its [`PollingConfig`] at construction; waits never
//! read global state.

pub mod compute;
pub mod config;
pub mod error;
pub mod image;
pub mod loadbalancer;
pub mod network;
pub mod polling;
pub mod properties;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_utils;

pub use compute::{
    AvailabilityZoneProvider, ComputeService, CreateServerRequest, FlavorResolver, OS_OVERHEAD_GB,
    RandomAvailabilityZoneProvider,
};
pub use config::{AgentOptions, CpiConfig, OpenstackConfig};
pub use error::{CpiError, ResultExt};
pub use image::ImageService;
pub use loadbalancer::LoadbalancerService;
pub use network::{
    NamedNetwork, NetworkConfig, NetworkConfigBuilder, NetworkService,
    OpenStackSecurityGroupsResolver, SecurityGroupsResolver,
};
pub use polling::PollingConfig;
pub use properties::*;
pub use volume::VolumeService;
