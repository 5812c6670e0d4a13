//! Mock OpenStack for unit testing
//!
//! This module provides an in-memory implementation of every facade trait so
//! that services can be tested without a running cloud.
//!
//! The mock is organized into service-specific modules:
//! - `compute.rs` - flavors, key pairs, servers, metadata, volume attachments
//! - `networking.rs` - subnets, ports, floating IPs, security groups
//! - `volume.rs` - volumes and snapshots
//! - `loadbalancer.rs` - load balancers, pools, listeners, members
//! - `image.rs` - images
//!
//! Besides the stores, the mock supports scripted status sequences (each
//! `get_*` pops the next status), one-shot error injection per operation and
//! a call log that records whether the plain or retryable client was used.

mod compute;
mod image;
mod loadbalancer;
mod networking;
mod volume;

use crate::common::ServiceClient;
use crate::error::OpenStackError;
use crate::models::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded facade call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Facade method name, e.g. `create_server`
    pub operation: String,
    /// Whether the retryable client was passed
    pub retryable: bool,
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub(crate) flavors: Vec<Flavor>,
    pub(crate) key_pairs: HashMap<String, KeyPair>,
    pub(crate) servers: HashMap<String, Server>,
    pub(crate) server_statuses: HashMap<String, VecDeque<String>>,
    pub(crate) initial_server_status: Option<String>,
    pub(crate) failing_zones: HashSet<String>,
    pub(crate) server_requests: Vec<CreateServerOpts>,
    pub(crate) attachments: HashMap<String, Vec<VolumeAttachment>>,
    pub(crate) subnets: Vec<Subnet>,
    pub(crate) ports: HashMap<String, Port>,
    pub(crate) port_requests: Vec<CreatePortOpts>,
    pub(crate) floating_ips: HashMap<String, FloatingIp>,
    pub(crate) security_groups: Vec<SecurityGroup>,
    pub(crate) empty_security_group_ids: HashSet<String>,
    pub(crate) volumes: HashMap<String, Volume>,
    pub(crate) volume_statuses: HashMap<String, VecDeque<String>>,
    pub(crate) snapshots: HashMap<String, Snapshot>,
    pub(crate) snapshot_statuses: HashMap<String, VecDeque<String>>,
    pub(crate) load_balancers: HashMap<String, LoadBalancer>,
    pub(crate) load_balancer_statuses: HashMap<String, VecDeque<String>>,
    pub(crate) pools: HashMap<String, Pool>,
    pub(crate) listeners: HashMap<String, Listener>,
    pub(crate) members: HashMap<String, Vec<Member>>,
    pub(crate) images: HashMap<String, Image>,
    pub(crate) uploads: Vec<String>,
    pub(crate) errors: HashMap<String, VecDeque<OpenStackError>>,
    pub(crate) calls: Vec<MockCall>,
    pub(crate) next_id: u64,
}

/// Mock OpenStack cloud for testing
///
/// Cloning shares the underlying state, so one instance can back every
/// facade of a service graph while the test keeps a handle for assertions.
#[derive(Debug, Clone, Default)]
pub struct MockOpenStack {
    pub(crate) state: Arc<Mutex<MockState>>,
}

impl MockOpenStack {
    /// Create a new, empty mock cloud
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and return the injected error for it, if any
    pub(crate) fn begin(&self, operation: &str, client: &ServiceClient) -> Result<(), OpenStackError> {
        let mut state = self.lock();
        state.calls.push(MockCall {
            operation: operation.to_string(),
            retryable: client.is_retryable(),
        });
        match state.errors.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Generate next ID with a readable prefix
    pub(crate) fn next_id(&self, prefix: &str) -> String {
        let mut state = self.lock();
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }

    /// Make the next call of `operation` fail with `error`. Errors queue up.
    pub fn fail_next(&self, operation: &str, error: OpenStackError) {
        self.lock()
            .errors
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Number of calls of one operation
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Whether every call of `operation` used the retryable client
    pub fn always_retryable(&self, operation: &str) -> bool {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .all(|c| c.retryable)
    }

    // -----------------------------------------------------------------------
    // Compute setup and inspection
    // -----------------------------------------------------------------------

    /// Add a flavor to the catalog (for test setup)
    pub fn add_flavor(&self, flavor: Flavor) {
        self.lock().flavors.push(flavor);
    }

    /// Add a key pair (for test setup)
    pub fn add_key_pair(&self, name: &str) {
        self.lock().key_pairs.insert(
            name.to_string(),
            KeyPair {
                name: name.to_string(),
                fingerprint: None,
            },
        );
    }

    /// Add a server (for test setup)
    pub fn add_server(&self, server: Server) {
        self.lock().servers.insert(server.id.clone(), server);
    }

    /// Statuses returned by successive `get_server` calls before the stored one
    pub fn set_server_statuses(&self, id: &str, statuses: &[&str]) {
        self.lock()
            .server_statuses
            .insert(id.to_string(), statuses.iter().map(|s| (*s).to_string()).collect());
    }

    /// Status given to newly created servers (defaults to ACTIVE)
    pub fn set_initial_server_status(&self, status: &str) {
        self.lock().initial_server_status = Some(status.to_string());
    }

    /// Reject server creation in an availability zone
    pub fn fail_server_creation_in(&self, zone: &str) {
        self.lock().failing_zones.insert(zone.to_string());
    }

    /// Create requests received, including rejected ones
    pub fn server_requests(&self) -> Vec<CreateServerOpts> {
        self.lock().server_requests.clone()
    }

    /// Current server by ID
    pub fn server(&self, id: &str) -> Option<Server> {
        self.lock().servers.get(id).cloned()
    }

    /// All servers
    pub fn servers(&self) -> Vec<Server> {
        self.lock().servers.values().cloned().collect()
    }

    /// Volume attachments of a server
    pub fn attachments(&self, server_id: &str) -> Vec<VolumeAttachment> {
        self.lock()
            .attachments
            .get(server_id)
            .cloned()
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Networking setup and inspection
    // -----------------------------------------------------------------------

    /// Add a subnet (for test setup)
    pub fn add_subnet(&self, id: &str, network_id: &str, cidr: &str) {
        self.lock().subnets.push(Subnet {
            id: id.to_string(),
            network_id: network_id.to_string(),
            cidr: cidr.to_string(),
            name: id.to_string(),
            gateway_ip: None,
        });
    }

    /// Add a port (for test setup)
    pub fn add_port(&self, port: Port) {
        self.lock().ports.insert(port.id.clone(), port);
    }

    /// Current port by ID
    pub fn port(&self, id: &str) -> Option<Port> {
        self.lock().ports.get(id).cloned()
    }

    /// All ports
    pub fn ports(&self) -> Vec<Port> {
        self.lock().ports.values().cloned().collect()
    }

    /// Port create requests received, including rejected ones
    pub fn port_requests(&self) -> Vec<CreatePortOpts> {
        self.lock().port_requests.clone()
    }

    /// Add a floating IP (for test setup)
    pub fn add_floating_ip(&self, id: &str, address: &str) {
        self.lock().floating_ips.insert(
            id.to_string(),
            FloatingIp {
                id: id.to_string(),
                floating_ip_address: address.to_string(),
                floating_network_id: "public".to_string(),
                port_id: None,
            },
        );
    }

    /// Current floating IP by ID
    pub fn floating_ip(&self, id: &str) -> Option<FloatingIp> {
        self.lock().floating_ips.get(id).cloned()
    }

    /// Add a security group (for test setup)
    pub fn add_security_group(&self, id: &str, name: &str) {
        self.lock().security_groups.push(SecurityGroup {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Make `get_security_group(id)` succeed without a body
    pub fn answer_security_group_without_body(&self, id: &str) {
        self.lock().empty_security_group_ids.insert(id.to_string());
    }

    // -----------------------------------------------------------------------
    // Volume setup and inspection
    // -----------------------------------------------------------------------

    /// Add a volume (for test setup)
    pub fn add_volume(&self, volume: Volume) {
        self.lock().volumes.insert(volume.id.clone(), volume);
    }

    /// Statuses returned by successive `get_volume` calls before the stored one
    pub fn set_volume_statuses(&self, id: &str, statuses: &[&str]) {
        self.lock()
            .volume_statuses
            .insert(id.to_string(), statuses.iter().map(|s| (*s).to_string()).collect());
    }

    /// Current volume by ID
    pub fn volume(&self, id: &str) -> Option<Volume> {
        self.lock().volumes.get(id).cloned()
    }

    /// Add a snapshot (for test setup)
    pub fn add_snapshot(&self, snapshot: Snapshot) {
        self.lock().snapshots.insert(snapshot.id.clone(), snapshot);
    }

    /// Statuses returned by successive `get_snapshot` calls before the stored one
    pub fn set_snapshot_statuses(&self, id: &str, statuses: &[&str]) {
        self.lock()
            .snapshot_statuses
            .insert(id.to_string(), statuses.iter().map(|s| (*s).to_string()).collect());
    }

    /// Current snapshot by ID
    pub fn snapshot(&self, id: &str) -> Option<Snapshot> {
        self.lock().snapshots.get(id).cloned()
    }

    // -----------------------------------------------------------------------
    // Load balancer setup and inspection
    // -----------------------------------------------------------------------

    /// Add a load balancer with a provisioning status (for test setup)
    pub fn add_load_balancer(&self, id: &str, provisioning_status: &str) {
        self.lock().load_balancers.insert(
            id.to_string(),
            LoadBalancer {
                id: id.to_string(),
                name: id.to_string(),
                provisioning_status: provisioning_status.to_string(),
                operating_status: "ONLINE".to_string(),
            },
        );
    }

    /// Statuses returned by successive `get_load_balancer` calls before the stored one
    pub fn set_load_balancer_statuses(&self, id: &str, statuses: &[&str]) {
        self.lock()
            .load_balancer_statuses
            .insert(id.to_string(), statuses.iter().map(|s| (*s).to_string()).collect());
    }

    /// Add a pool (for test setup)
    pub fn add_pool(&self, pool: Pool) {
        self.lock().pools.insert(pool.id.clone(), pool);
    }

    /// Add a listener (for test setup)
    pub fn add_listener(&self, listener: Listener) {
        self.lock().listeners.insert(listener.id.clone(), listener);
    }

    /// Add a pool member (for test setup)
    pub fn add_member(&self, pool_id: &str, member: Member) {
        self.lock()
            .members
            .entry(pool_id.to_string())
            .or_default()
            .push(member);
    }

    /// Members of a pool
    pub fn members(&self, pool_id: &str) -> Vec<Member> {
        self.lock().members.get(pool_id).cloned().unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Image setup and inspection
    // -----------------------------------------------------------------------

    /// Add an image (for test setup)
    pub fn add_image(&self, id: &str, status: &str) {
        self.lock().images.insert(
            id.to_string(),
            Image {
                id: id.to_string(),
                name: Some(id.to_string()),
                status: status.to_string(),
                visibility: Some("private".to_string()),
            },
        );
    }

    /// Current image by ID
    pub fn image(&self, id: &str) -> Option<Image> {
        self.lock().images.get(id).cloned()
    }

    /// Image IDs that received data uploads
    pub fn uploads(&self) -> Vec<String> {
        self.lock().uploads.clone()
    }
}

/// Pop the next scripted status for `id`, if any
pub(crate) fn next_status(scripts: &mut HashMap<String, VecDeque<String>>, id: &str) -> Option<String> {
    scripts.get_mut(id).and_then(VecDeque::pop_front)
}
