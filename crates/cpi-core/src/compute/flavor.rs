//! Flavor resolution
//!
//! The catalog is fetched on every call; flavors are never cached.

use crate::error::{CpiError, ResultExt};
use crate::properties::VmResources;
use openstack_client::{ComputeFacade, Flavor, ServiceClients};
use std::sync::Arc;
use tracing::debug;

/// Root disk space reserved for the operating system, in GiB
pub const OS_OVERHEAD_GB: u64 = 3;

/// Matches instance types and resource requirements against the flavor catalog
#[derive(Clone)]
pub struct FlavorResolver {
    facade: Arc<dyn ComputeFacade>,
    clients: ServiceClients,
}

impl FlavorResolver {
    /// Create a flavor resolver
    pub fn new(facade: Arc<dyn ComputeFacade>, clients: ServiceClients) -> Self {
        Self { facade, clients }
    }

    async fn list_flavors(&self) -> Result<Vec<Flavor>, CpiError> {
        self.facade
            .list_flavors(&self.clients.retryable)
            .await
            .context("failed to list flavors")
    }

    /// Flavor named `instance_type`. A flavor with an ephemeral disk must
    /// offer at least twice its RAM there: one RAM worth of swap plus data.
    pub async fn resolve_flavor_for_instance_type(&self, instance_type: &str) -> Result<Flavor, CpiError> {
        let flavor = self
            .list_flavors()
            .await?
            .into_iter()
            .find(|f| f.name == instance_type)
            .ok_or_else(|| CpiError::NotFound(format!("flavor for instance type '{}' not found", instance_type)))?;

        if flavor.ephemeral > 0 {
            let ram_gb = flavor.ram.div_ceil(1024);
            if flavor.ephemeral < 2 * ram_gb {
                return Err(CpiError::Validation(format!(
                    "flavor '{}' has an ephemeral disk of {} GiB, which must be at least twice the RAM ({} GiB)",
                    instance_type, flavor.ephemeral, ram_gb
                )));
            }
        }
        Ok(flavor)
    }

    /// Flavors large enough for `resources`; may be empty
    pub async fn resolve_flavor_for_requirements(
        &self,
        resources: &VmResources,
        boot_from_volume: bool,
    ) -> Result<Vec<Flavor>, CpiError> {
        let sufficient: Vec<Flavor> = self
            .list_flavors()
            .await?
            .into_iter()
            .filter(|f| f.ram >= resources.ram && f.vcpus >= resources.cpu)
            .collect();

        if boot_from_volume {
            return Ok(sufficient.into_iter().filter(|f| f.ephemeral == 0).collect());
        }

        let ephemeral_gb = resources.ephemeral_disk_size.div_ceil(1024);
        let with_ephemeral: Vec<Flavor> = sufficient
            .iter()
            .filter(|f| f.ephemeral >= ephemeral_gb && f.disk >= OS_OVERHEAD_GB)
            .cloned()
            .collect();
        if !with_ephemeral.is_empty() {
            return Ok(with_ephemeral);
        }

        debug!(
            "No flavor with {} GiB ephemeral disk, looking for a root disk of {} GiB",
            ephemeral_gb,
            ephemeral_gb + OS_OVERHEAD_GB
        );
        Ok(sufficient
            .into_iter()
            .filter(|f| f.ephemeral == 0 && f.disk >= ephemeral_gb + OS_OVERHEAD_GB)
            .collect())
    }

    /// Look up a flavor by ID
    pub async fn get_flavor_by_id(&self, id: &str) -> Result<Flavor, CpiError> {
        self.list_flavors()
            .await?
            .into_iter()
            .find(|f| f.id == id)
            .ok_or_else(|| CpiError::NotFound(format!("flavor '{}' not found", id)))
    }
}

/// Smallest candidate by (vCPUs, RAM, disk + ephemeral, disk).
///
/// Returns `None` for an empty candidate list; callers report which
/// requirements could not be met.
#[must_use]
pub fn get_closest_matched_flavor(candidates: &[Flavor]) -> Option<Flavor> {
    candidates
        .iter()
        .min_by(|a, b| {
            (a.vcpus, a.ram, a.disk + a.ephemeral, a.disk, &a.id)
                .cmp(&(b.vcpus, b.ram, b.disk + b.ephemeral, b.disk, &b.id))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{clients, flavor};
    use openstack_client::MockOpenStack;

    fn resolver(mock: &MockOpenStack) -> FlavorResolver {
        FlavorResolver::new(Arc::new(mock.clone()), clients())
    }

    #[tokio::test]
    async fn test_resolve_by_instance_type_is_idempotent() {
        let mock = MockOpenStack::new();
        mock.add_flavor(flavor("m1.small", 1, 2048, 20, 0));
        mock.add_flavor(flavor("m1.large", 4, 8192, 20, 16));
        let resolver = resolver(&mock);

        let first = resolver.resolve_flavor_for_instance_type("m1.large").await.unwrap();
        let second = resolver.resolve_flavor_for_instance_type("m1.large").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.call_count("list_flavors"), 2);
        assert!(mock.always_retryable("list_flavors"));

        let missing = resolver.resolve_flavor_for_instance_type("m1.huge").await.unwrap_err();
        let again = resolver.resolve_flavor_for_instance_type("m1.huge").await.unwrap_err();
        assert_eq!(missing.to_string(), again.to_string());
    }

    #[tokio::test]
    async fn test_undersized_ephemeral_disk_is_rejected() {
        let mock = MockOpenStack::new();
        mock.add_flavor(flavor("m1.tiny-eph", 1, 4096, 10, 4));
        let err = resolver(&mock)
            .resolve_flavor_for_instance_type("m1.tiny-eph")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least twice the RAM (4 GiB)"));
    }

    #[tokio::test]
    async fn test_requirements_prefer_ephemeral_flavors() {
        let mock = MockOpenStack::new();
        mock.add_flavor(flavor("too-small", 1, 1024, 20, 20));
        mock.add_flavor(flavor("eph", 2, 4096, 3, 10));
        mock.add_flavor(flavor("root-only", 2, 4096, 20, 0));
        let resources = VmResources {
            cpu: 2,
            ram: 4096,
            ephemeral_disk_size: 10 * 1024,
        };

        let candidates = resolver(&mock)
            .resolve_flavor_for_requirements(&resources, false)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "eph");
    }

    #[tokio::test]
    async fn test_requirements_fall_back_to_root_disk() {
        let mock = MockOpenStack::new();
        mock.add_flavor(flavor("small-root", 2, 4096, 12, 0));
        mock.add_flavor(flavor("root-only", 2, 4096, 13, 0));
        let resources = VmResources {
            cpu: 2,
            ram: 4096,
            ephemeral_disk_size: 10 * 1024,
        };

        let candidates = resolver(&mock)
            .resolve_flavor_for_requirements(&resources, false)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "root-only");
    }

    #[tokio::test]
    async fn test_requirements_boot_from_volume_excludes_ephemeral() {
        let mock = MockOpenStack::new();
        mock.add_flavor(flavor("eph", 2, 4096, 10, 10));
        mock.add_flavor(flavor("plain", 2, 4096, 0, 0));
        let resources = VmResources {
            cpu: 1,
            ram: 2048,
            ephemeral_disk_size: 0,
        };

        let candidates = resolver(&mock)
            .resolve_flavor_for_requirements(&resources, true)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "plain");
    }

    #[test]
    fn test_closest_flavor_tie_break_is_order_independent() {
        let a = flavor("eph-20", 1, 2048, 0, 20);
        let b = flavor("eph-10", 1, 2048, 10, 10);
        let c = flavor("bigger", 1, 2048, 20, 20);
        let d = flavor("more-cpu", 2, 1024, 0, 0);

        let forward = get_closest_matched_flavor(&[a.clone(), b.clone(), c.clone(), d.clone()]).unwrap();
        let backward = get_closest_matched_flavor(&[d, c, b, a]).unwrap();
        assert_eq!(forward.id, "eph-20");
        assert_eq!(backward.id, "eph-20");
    }

    #[test]
    fn test_closest_flavor_of_nothing() {
        assert!(get_closest_matched_flavor(&[]).is_none());
    }

    #[tokio::test]
    async fn test_get_flavor_by_id() {
        let mock = MockOpenStack::new();
        mock.add_flavor(flavor("f-1", 1, 512, 1, 0));
        let resolver = resolver(&mock);
        assert_eq!(resolver.get_flavor_by_id("f-1").await.unwrap().vcpus, 1);
        assert!(resolver.get_flavor_by_id("f-2").await.is_err());
    }
}
