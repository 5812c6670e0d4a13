//! OpenStack REST API Client
//!
//! A Rust client library for the OpenStack services used by the CPI: Nova,
//! Neutron, Cinder, Octavia and Glance. Provides Keystone v3 authentication,
//! type-safe models and one facade trait per service.
//!
//! # Example
//!
//! ```no_run
//! use openstack_client::{authenticate, AuthOptions, ComputeFacade, Interface, OpenStackFacade, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = AuthOptions {
//!     auth_url: "https://keystone:5000/v3".to_string(),
//!     username: "admin".to_string(),
//!     password: "secret".to_string(),
//!     domain: "Default".to_string(),
//!     project: "bosh".to_string(),
//!     region: None,
//!     interface: Interface::Public,
//!     request_timeout: Duration::from_secs(60),
//!     ssl_verify_peer: true,
//!     ca_cert: None,
//! };
//! let session = authenticate(&options).await?;
//! let compute = session.service_clients(&["compute"], RetryPolicy::default())?;
//!
//! // Reads go through the retryable client
//! let flavors = OpenStackFacade.list_flavors(&compute.retryable).await?;
//! println!("{} flavors", flavors.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Compute**: flavors, key pairs, servers, metadata, volume attachments
//! - **Networking**: subnets, ports, floating IPs, security groups
//! - **Block storage**: volumes and snapshots
//! - **Load balancing**: pools, listeners, members
//! - **Images**: create, upload, delete
//! - **Retry Logic**: Fibonacci backoff for transient failures
//! - **Mocking**: `MockOpenStack` behind the `test-util` feature

pub mod auth;
pub mod client;
pub mod common;
pub mod error;
pub mod facade;
pub mod models;
pub mod retry;
#[cfg(feature = "test-util")]
pub mod mock;

pub use auth::{authenticate, AuthOptions, Interface, Session};
pub use client::OpenStackFacade;
pub use common::{ServiceClient, ServiceClients};
pub use error::OpenStackError;
pub use facade::{ComputeFacade, ImageFacade, LoadbalancerFacade, NetworkingFacade, VolumeFacade};
pub use models::*;
pub use retry::{FibonacciBackoff, RetryPolicy};
#[cfg(feature = "test-util")]
pub use mock::{MockCall, MockOpenStack};
