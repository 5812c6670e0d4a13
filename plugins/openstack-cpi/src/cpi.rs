//! Service graph of one CPI invocation
//!
//! Authenticates once, resolves the catalog endpoints and wires every core
//! service onto the same facade.

use cpi_core::{
    AgentOptions, ComputeService, CpiConfig, CpiError, ImageService, LoadbalancerService, NetworkService,
    OpenStackSecurityGroupsResolver, OpenstackConfig, RandomAvailabilityZoneProvider, ResultExt,
    SecurityGroupsResolver, VolumeService,
};
use openstack_client::{
    ComputeFacade, ImageFacade, LoadbalancerFacade, NetworkingFacade, OpenStackFacade, ServiceClients,
    VolumeFacade, authenticate,
};
use std::sync::Arc;
use tracing::{debug, info};

const COMPUTE: &[&str] = &["compute"];
const NETWORK: &[&str] = &["network"];
const VOLUME: &[&str] = &["block-storage", "volumev3", "volumev2"];
const LOAD_BALANCER: &[&str] = &["load-balancer"];
const IMAGE: &[&str] = &["image"];

/// Client pairs per OpenStack service
#[derive(Debug, Clone)]
pub struct CpiClients {
    pub compute: ServiceClients,
    pub network: ServiceClients,
    pub volume: ServiceClients,
    /// Octavia is optional in the catalog
    pub loadbalancer: Option<ServiceClients>,
    pub image: ServiceClients,
}

/// Core services plus the configuration the methods consult directly
pub struct Cpi {
    pub config: OpenstackConfig,
    pub agent: AgentOptions,
    pub compute: ComputeService,
    pub network: NetworkService,
    pub security_groups: Arc<dyn SecurityGroupsResolver>,
    pub volumes: VolumeService,
    pub loadbalancer: Option<LoadbalancerService>,
    pub images: ImageService,
}

impl Cpi {
    /// Authenticate against Keystone and build the services on the real APIs
    pub async fn connect(config: &CpiConfig) -> Result<Self, CpiError> {
        let openstack = config.openstack();
        let session = authenticate(&openstack.auth_options()?)
            .await
            .with_context(|| format!("failed to authenticate against '{}'", openstack.auth_url))?;

        let policy = openstack.retry_policy();
        let clients_for = |service_types: &[&str]| {
            session
                .service_clients(service_types, policy.clone())
                .with_context(|| format!("failed to resolve endpoint for {:?}", service_types))
        };

        let loadbalancer = match clients_for(LOAD_BALANCER) {
            Ok(clients) => Some(clients),
            Err(e) => {
                debug!("Load balancer service unavailable: {}", e);
                None
            }
        };
        let clients = CpiClients {
            compute: clients_for(COMPUTE)?,
            network: clients_for(NETWORK)?,
            volume: clients_for(VOLUME)?,
            loadbalancer,
            image: clients_for(IMAGE)?,
        };
        info!("Connected to OpenStack at {}", openstack.auth_url);

        Ok(Self::new(Arc::new(OpenStackFacade), clients, config))
    }

    /// Wire the services onto `facade`
    pub fn new<F>(facade: Arc<F>, clients: CpiClients, config: &CpiConfig) -> Self
    where
        F: ComputeFacade + NetworkingFacade + VolumeFacade + LoadbalancerFacade + ImageFacade + 'static,
    {
        let openstack = config.openstack().clone();
        let agent = config.agent().clone();
        let polling = openstack.polling();

        let network = NetworkService::new(facade.clone(), clients.network.clone());
        let security_groups: Arc<dyn SecurityGroupsResolver> =
            Arc::new(OpenStackSecurityGroupsResolver::new(facade.clone(), clients.network));
        let compute = ComputeService::new(
            facade.clone(),
            clients.compute,
            Arc::new(RandomAvailabilityZoneProvider),
            network.clone(),
            openstack.clone(),
            agent.clone(),
            polling,
        );
        let volumes = VolumeService::new(facade.clone(), clients.volume, polling);
        let loadbalancer = clients
            .loadbalancer
            .map(|clients| LoadbalancerService::new(facade.clone(), clients, polling));
        let images = ImageService::new(facade, clients.image, polling);

        Self {
            config: openstack,
            agent,
            compute,
            network,
            security_groups,
            volumes,
            loadbalancer,
            images,
        }
    }

    /// Load balancer service, required once pools are requested
    pub fn loadbalancer(&self) -> Result<&LoadbalancerService, CpiError> {
        self.loadbalancer.as_ref().ok_or_else(|| {
            CpiError::Config("no load-balancer endpoint in the service catalog, cannot join pools".to_string())
        })
    }
}
