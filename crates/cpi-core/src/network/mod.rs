//! Networking
//!
//! - `network_config.rs` - classification and validation of the director's networks
//! - `security_groups.rs` - security group names and IDs to IDs
//! - `service.rs` - ports, subnets and floating IPs

mod network_config;
mod security_groups;
mod service;

pub use network_config::{NamedNetwork, NetworkConfig, NetworkConfigBuilder};
pub use security_groups::{OpenStackSecurityGroupsResolver, SecurityGroupsResolver};
pub use service::NetworkService;
