//! Availability zone selection

use crate::properties::CreateVmCloudProperties;
use rand::seq::SliceRandom;

/// Candidate availability zones for placing a server, in attempt order
pub trait AvailabilityZoneProvider: Send + Sync {
    /// Zones to try for a server with `cloud_properties`
    fn get_availability_zones(&self, cloud_properties: &CreateVmCloudProperties) -> Vec<String>;
}

/// Shuffles `availability_zones` so retried VMs spread across zones.
/// Falls back to the single `availability_zone`, where an empty name lets
/// the cloud choose.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomAvailabilityZoneProvider;

impl AvailabilityZoneProvider for RandomAvailabilityZoneProvider {
    fn get_availability_zones(&self, cloud_properties: &CreateVmCloudProperties) -> Vec<String> {
        if cloud_properties.availability_zones.is_empty() {
            return vec![cloud_properties.availability_zone.clone()];
        }
        let mut zones = cloud_properties.availability_zones.clone();
        zones.shuffle(&mut rand::thread_rng());
        zones
    }
}
