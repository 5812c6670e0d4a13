//! Loadbalancer service
//!
//! Pool memberships of VMs. Octavia rejects member changes while the owning
//! load balancer is not ACTIVE with HTTP 409, so every change waits for
//! ACTIVE first and retries on conflict until the polling timeout fires.

use crate::error::{CpiError, ResultExt};
use crate::polling::PollingConfig;
use openstack_client::{
    CreateMemberOpts, LoadBalancer, LoadbalancerFacade, Member, MemberListOpts, Pool, ServiceClients,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ACTIVE: &str = "ACTIVE";
const ERROR: &str = "ERROR";

/// Pool membership lifecycle on Octavia
#[derive(Clone)]
pub struct LoadbalancerService {
    facade: Arc<dyn LoadbalancerFacade>,
    clients: ServiceClients,
    polling: PollingConfig,
}

impl LoadbalancerService {
    /// Create a load balancer service
    pub fn new(facade: Arc<dyn LoadbalancerFacade>, clients: ServiceClients, polling: PollingConfig) -> Self {
        Self {
            facade,
            clients,
            polling,
        }
    }

    /// Look up the single pool called `name`
    pub async fn get_pool(&self, name: &str) -> Result<Pool, CpiError> {
        let mut pools = self
            .facade
            .list_pools(&self.clients.retryable, name)
            .await
            .with_context(|| format!("failed to list pools with name '{}'", name))?;

        match pools.len() {
            0 => Err(CpiError::NotFound(format!("load balancer pool '{}' does not exist", name))),
            1 => Ok(pools.remove(0)),
            n => Err(CpiError::Ambiguous(format!(
                "pool name '{}' is not unique, found {} pools: {}",
                name,
                n,
                pools.iter().map(|p| p.id.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// ID of the load balancer owning `pool`, directly or through its only listener
    pub async fn get_load_balancer_id(&self, pool: &Pool) -> Result<String, CpiError> {
        let load_balancers = if !pool.loadbalancers.is_empty() {
            pool.loadbalancers.clone()
        } else {
            let listener_id = match pool.listeners.as_slice() {
                [listener] => &listener.id,
                [] => {
                    return Err(CpiError::NotFound(format!(
                        "pool '{}' has no load balancer and no listener",
                        pool.id
                    )));
                }
                listeners => {
                    return Err(CpiError::Ambiguous(format!(
                        "pool '{}' has {} listeners, cannot determine its load balancer",
                        pool.id,
                        listeners.len()
                    )));
                }
            };
            self.facade
                .get_listener(&self.clients.retryable, listener_id)
                .await
                .with_context(|| format!("failed to get listener '{}' of pool '{}'", listener_id, pool.id))?
                .loadbalancers
        };

        match load_balancers.as_slice() {
            [load_balancer] => Ok(load_balancer.id.clone()),
            [] => Err(CpiError::NotFound(format!(
                "no load balancer is associated with pool '{}'",
                pool.id
            ))),
            many => Err(CpiError::Ambiguous(format!(
                "pool '{}' is associated with {} load balancers: {}",
                pool.id,
                many.len(),
                many.iter().map(|lb| lb.id.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Poll until the load balancer is ACTIVE; ERROR is fatal
    pub async fn wait_for_load_balancer_active(&self, id: &str) -> Result<LoadBalancer, CpiError> {
        let deadline = self.polling.deadline();
        loop {
            deadline.check(|| format!("load balancer '{}' to become {}", id, ACTIVE))?;

            let load_balancer = self
                .facade
                .get_load_balancer(&self.clients.retryable, id)
                .await
                .with_context(|| format!("failed to get load balancer '{}'", id))?;

            match load_balancer.provisioning_status.as_str() {
                ACTIVE => return Ok(load_balancer),
                ERROR => {
                    return Err(CpiError::ResourceState(format!(
                        "load balancer '{}' became {} while waiting for {}",
                        id, ERROR, ACTIVE
                    )));
                }
                status => debug!("Load balancer '{}' is {}, waiting for {}", id, status, ACTIVE),
            }
            self.polling.pause().await;
        }
    }

    /// Register a member in `pool`. A 409 with a matching existing member
    /// returns that member; a 409 without one is retried.
    pub async fn create_pool_member(&self, pool: &Pool, opts: &CreateMemberOpts) -> Result<Member, CpiError> {
        let load_balancer_id = self.get_load_balancer_id(pool).await?;
        let deadline = self.polling.deadline();
        let mut attempt = 0u32;

        loop {
            deadline.check(|| {
                format!(
                    "member {}:{} to be created in pool '{}'",
                    opts.address, opts.protocol_port, pool.id
                )
            })?;
            attempt += 1;

            self.wait_for_load_balancer_active(&load_balancer_id).await?;

            let err = match self.facade.create_pool_member(&self.clients.client, &pool.id, opts).await {
                Ok(member) => {
                    info!(
                        "Created member '{}' ({}:{}) in pool '{}'",
                        member.id, opts.address, opts.protocol_port, pool.id
                    );
                    return Ok(member);
                }
                Err(e) if e.is_conflict() => e,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "failed to create member {}:{} in pool '{}'",
                            opts.address, opts.protocol_port, pool.id
                        )
                    });
                }
            };

            if let Some(existing) = self.find_member(&pool.id, opts).await? {
                info!(
                    "Member {}:{} already exists in pool '{}' as '{}'",
                    opts.address, opts.protocol_port, pool.id, existing.id
                );
                return Ok(existing);
            }
            warn!(
                "Creating member {}:{} in pool '{}' conflicted (attempt {}): {}, retrying",
                opts.address, opts.protocol_port, pool.id, attempt, err
            );
            self.polling.pause().await;
        }
    }

    /// Remove a member from a pool; missing pools and members are skipped
    pub async fn delete_pool_member(&self, pool_id: &str, member_id: &str) -> Result<(), CpiError> {
        let pool = match self.facade.get_pool(&self.clients.retryable, pool_id).await {
            Ok(pool) => pool,
            Err(e) if e.is_not_found() => {
                info!("SKIPPING: pool '{}' not found, member '{}' is gone with it", pool_id, member_id);
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("failed to get pool '{}'", pool_id)),
        };
        let load_balancer_id = self.get_load_balancer_id(&pool).await?;
        let deadline = self.polling.deadline();
        let mut attempt = 0u32;

        loop {
            deadline.check(|| format!("member '{}' to be deleted from pool '{}'", member_id, pool_id))?;
            attempt += 1;

            self.wait_for_load_balancer_active(&load_balancer_id).await?;

            match self
                .facade
                .delete_pool_member(&self.clients.retryable, pool_id, member_id)
                .await
            {
                Ok(()) => {
                    info!("Deleted member '{}' from pool '{}'", member_id, pool_id);
                    return Ok(());
                }
                Err(e) if e.is_not_found() => {
                    info!("SKIPPING: member '{}' not found in pool '{}'", member_id, pool_id);
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {
                    warn!(
                        "Deleting member '{}' from pool '{}' conflicted (attempt {}): {}, retrying",
                        member_id, pool_id, attempt, e
                    );
                    self.polling.pause().await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("failed to delete member '{}' from pool '{}'", member_id, pool_id)
                    });
                }
            }
        }
    }

    async fn find_member(&self, pool_id: &str, opts: &CreateMemberOpts) -> Result<Option<Member>, CpiError> {
        let filter = MemberListOpts {
            address: opts.address.clone(),
            protocol_port: opts.protocol_port,
            subnet_id: opts.subnet_id.clone(),
            monitor_port: opts.monitor_port,
        };
        let members = self
            .facade
            .list_pool_members(&self.clients.retryable, pool_id, &filter)
            .await
            .with_context(|| format!("failed to list members of pool '{}'", pool_id))?;
        Ok(members.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{clients, expired_polling, fast_polling};
    use openstack_client::{IdRef, Listener, MockOpenStack, OpenStackError};
    use std::time::Duration;

    fn service(mock: &MockOpenStack) -> LoadbalancerService {
        LoadbalancerService::new(Arc::new(mock.clone()), clients(), fast_polling())
    }

    fn id_refs(ids: &[&str]) -> Vec<IdRef> {
        ids.iter().map(|id| IdRef { id: (*id).to_string() }).collect()
    }

    fn pool(id: &str, load_balancers: &[&str], listeners: &[&str]) -> Pool {
        Pool {
            id: id.to_string(),
            name: id.to_string(),
            loadbalancers: id_refs(load_balancers),
            listeners: id_refs(listeners),
        }
    }

    fn member_opts() -> CreateMemberOpts {
        CreateMemberOpts {
            name: "vm-1".to_string(),
            address: "10.0.0.5".to_string(),
            protocol_port: 8080,
            subnet_id: "subnet-1".to_string(),
            monitor_port: None,
        }
    }

    fn mock_with_pool() -> MockOpenStack {
        let mock = MockOpenStack::new();
        mock.add_load_balancer("lb-1", "ACTIVE");
        mock.add_pool(pool("pool-1", &["lb-1"], &[]));
        mock
    }

    #[tokio::test]
    async fn test_get_pool_requires_unique_name() {
        let mock = MockOpenStack::new();
        mock.add_pool(Pool {
            name: "web".to_string(),
            ..pool("pool-1", &[], &[])
        });
        mock.add_pool(Pool {
            name: "web".to_string(),
            ..pool("pool-2", &[], &[])
        });
        let service = service(&mock);

        let err = service.get_pool("web").await.unwrap_err();
        assert!(matches!(err, CpiError::Ambiguous(_)));
        assert!(err.to_string().contains("pool-1, pool-2"));

        let err = service.get_pool("api").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_load_balancer_id_falls_back_to_listener() {
        let mock = MockOpenStack::new();
        mock.add_listener(Listener {
            id: "listener-1".to_string(),
            name: "http".to_string(),
            loadbalancers: id_refs(&["lb-2"]),
        });
        let service = service(&mock);

        assert_eq!(
            service.get_load_balancer_id(&pool("pool-1", &["lb-1"], &["listener-1"])).await.unwrap(),
            "lb-1"
        );
        assert_eq!(
            service.get_load_balancer_id(&pool("pool-1", &[], &["listener-1"])).await.unwrap(),
            "lb-2"
        );
    }

    #[tokio::test]
    async fn test_load_balancer_id_must_be_unambiguous() {
        let service = service(&MockOpenStack::new());

        let err = service
            .get_load_balancer_id(&pool("pool-1", &[], &["listener-1", "listener-2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CpiError::Ambiguous(_)));

        let err = service
            .get_load_balancer_id(&pool("pool-1", &["lb-1", "lb-2"], &[]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("lb-1, lb-2"));

        let err = service.get_load_balancer_id(&pool("pool-1", &[], &[])).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_wait_for_active_fails_on_error() {
        let mock = mock_with_pool();
        mock.set_load_balancer_statuses("lb-1", &["PENDING_UPDATE", "ERROR"]);

        let err = service(&mock).wait_for_load_balancer_active("lb-1").await.unwrap_err();
        assert_eq!(err.to_string(), "load balancer 'lb-1' became ERROR while waiting for ACTIVE");
        assert_eq!(mock.call_count("get_load_balancer"), 2);
    }

    #[tokio::test]
    async fn test_create_member_waits_for_active() {
        let mock = mock_with_pool();
        mock.set_load_balancer_statuses("lb-1", &["PENDING_UPDATE", "ACTIVE"]);

        let member = service(&mock)
            .create_pool_member(&pool("pool-1", &["lb-1"], &[]), &member_opts())
            .await
            .unwrap();
        assert_eq!(member.address, "10.0.0.5");
        assert_eq!(mock.members("pool-1").len(), 1);
        assert!(!mock.always_retryable("create_pool_member"));
    }

    #[tokio::test]
    async fn test_create_member_conflict_returns_existing_member() {
        let mock = mock_with_pool();
        mock.add_member(
            "pool-1",
            Member {
                id: "member-existing".to_string(),
                address: "10.0.0.5".to_string(),
                protocol_port: 8080,
                subnet_id: Some("subnet-1".to_string()),
                monitor_port: None,
                provisioning_status: "ACTIVE".to_string(),
            },
        );

        let member = service(&mock)
            .create_pool_member(&pool("pool-1", &["lb-1"], &[]), &member_opts())
            .await
            .unwrap();
        assert_eq!(member.id, "member-existing");
        assert_eq!(mock.call_count("create_pool_member"), 1);
        assert_eq!(mock.call_count("list_pool_members"), 1);
    }

    #[tokio::test]
    async fn test_create_member_retries_conflict_without_match() {
        let mock = mock_with_pool();
        mock.fail_next("create_pool_member", OpenStackError::Conflict("pending update".to_string()));

        service(&mock)
            .create_pool_member(&pool("pool-1", &["lb-1"], &[]), &member_opts())
            .await
            .unwrap();
        assert_eq!(mock.call_count("create_pool_member"), 2);
        assert_eq!(mock.call_count("get_load_balancer"), 2);
    }

    #[tokio::test]
    async fn test_persistent_conflict_pauses_between_attempts() {
        let mock = mock_with_pool();
        for _ in 0..1000 {
            mock.fail_next("create_pool_member", OpenStackError::Conflict("pending update".to_string()));
            mock.fail_next("delete_pool_member", OpenStackError::Conflict("pending update".to_string()));
        }
        let polling = PollingConfig::new(Duration::from_millis(300), Duration::from_millis(100));
        let service = LoadbalancerService::new(Arc::new(mock.clone()), clients(), polling);

        let err = service
            .create_pool_member(&pool("pool-1", &["lb-1"], &[]), &member_opts())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(mock.call_count("create_pool_member") <= 4);

        let err = service.delete_pool_member("pool-1", "member-1").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(mock.call_count("delete_pool_member") <= 4);
    }

    #[tokio::test]
    async fn test_create_member_other_errors_are_fatal() {
        let mock = mock_with_pool();
        mock.fail_next(
            "create_pool_member",
            OpenStackError::Api {
                status: 400,
                message: "invalid subnet".to_string(),
            },
        );

        let err = service(&mock)
            .create_pool_member(&pool("pool-1", &["lb-1"], &[]), &member_opts())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to create member 10.0.0.5:8080 in pool 'pool-1'"));
        assert_eq!(mock.call_count("create_pool_member"), 1);
    }

    #[tokio::test]
    async fn test_create_member_zero_timeout() {
        let mock = mock_with_pool();
        let service = LoadbalancerService::new(Arc::new(mock.clone()), clients(), expired_polling());

        let err = service
            .create_pool_member(&pool("pool-1", &["lb-1"], &[]), &member_opts())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(mock.call_count("get_load_balancer"), 0);
        assert_eq!(mock.call_count("create_pool_member"), 0);
    }

    #[tokio::test]
    async fn test_delete_member() {
        let mock = mock_with_pool();
        let service = service(&mock);
        let member = service
            .create_pool_member(&pool("pool-1", &["lb-1"], &[]), &member_opts())
            .await
            .unwrap();

        mock.fail_next("delete_pool_member", OpenStackError::Conflict("pending update".to_string()));
        service.delete_pool_member("pool-1", &member.id).await.unwrap();
        assert!(mock.members("pool-1").is_empty());
        assert_eq!(mock.call_count("delete_pool_member"), 2);

        service.delete_pool_member("pool-1", &member.id).await.unwrap();
        service.delete_pool_member("pool-404", &member.id).await.unwrap();
    }
}
