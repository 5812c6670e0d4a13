//! Security group resolution

use crate::error::{CpiError, ResultExt};
use openstack_client::{NetworkingFacade, ServiceClients};
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns security group names or IDs into IDs
#[async_trait::async_trait]
pub trait SecurityGroupsResolver: Send + Sync {
    /// Resolved IDs in input order; fails on the first unresolvable entry
    async fn resolve(&self, names_or_ids: &[String]) -> Result<Vec<String>, CpiError>;
}

/// Resolver backed by Neutron
#[derive(Clone)]
pub struct OpenStackSecurityGroupsResolver {
    facade: Arc<dyn NetworkingFacade>,
    clients: ServiceClients,
}

impl OpenStackSecurityGroupsResolver {
    /// Create a resolver backed by Neutron
    pub fn new(facade: Arc<dyn NetworkingFacade>, clients: ServiceClients) -> Self {
        Self { facade, clients }
    }
}

#[async_trait::async_trait]
impl SecurityGroupsResolver for OpenStackSecurityGroupsResolver {
    async fn resolve(&self, names_or_ids: &[String]) -> Result<Vec<String>, CpiError> {
        let mut ids = Vec::with_capacity(names_or_ids.len());

        for token in names_or_ids {
            match self.facade.get_security_group(&self.clients.retryable, token).await {
                Ok(Some(group)) => {
                    debug!("Security group '{}' resolved by ID", token);
                    ids.push(group.id);
                }
                Ok(None) => {
                    return Err(CpiError::NotFound(format!(
                        "security group '{}' could not be resolved",
                        token
                    )));
                }
                Err(e) => {
                    warn!("Security group '{}' is not an ID ({}), looking it up by name", token, e);
                    let groups = self
                        .facade
                        .list_security_groups(&self.clients.retryable, token)
                        .await
                        .with_context(|| format!("failed to list security groups named '{}'", token))?;
                    let group = groups.into_iter().next().ok_or_else(|| {
                        CpiError::NotFound(format!("security group '{}' not found", token))
                    })?;
                    ids.push(group.id);
                }
            }
        }

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::clients;
    use openstack_client::MockOpenStack;

    fn resolver(mock: &MockOpenStack) -> OpenStackSecurityGroupsResolver {
        OpenStackSecurityGroupsResolver::new(Arc::new(mock.clone()), clients())
    }

    #[tokio::test]
    async fn test_resolves_ids_and_names_in_order() {
        let mock = MockOpenStack::new();
        mock.add_security_group("sg-1", "default");
        mock.add_security_group("sg-2", "bosh");

        let ids = resolver(&mock)
            .resolve(&["bosh".to_string(), "sg-1".to_string()])
            .await
            .unwrap();
        assert_eq!(ids, vec!["sg-2", "sg-1"]);
        assert!(mock.always_retryable("get_security_group"));
    }

    #[tokio::test]
    async fn test_unknown_name_fails() {
        let mock = MockOpenStack::new();
        mock.add_security_group("sg-1", "default");

        let err = resolver(&mock)
            .resolve(&["default".to_string(), "missing".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "security group 'missing' not found");
    }

    #[tokio::test]
    async fn test_lookup_without_body_is_unresolvable() {
        let mock = MockOpenStack::new();
        mock.add_security_group("sg-1", "default");
        mock.answer_security_group_without_body("sg-1");

        let err = resolver(&mock).resolve(&["sg-1".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("could not be resolved"));
        assert_eq!(mock.call_count("list_security_groups"), 0);
    }
}
