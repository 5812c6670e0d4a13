//! Compute
//!
//! - `availability_zone.rs` - candidate zones for placement
//! - `flavor.rs` - flavor resolution
//! - `volume_configurator.rs` - boot volume decision and size
//! - `user_data.rs` - agent settings
//! - `service.rs` - server lifecycle

mod availability_zone;
mod flavor;
mod service;
mod user_data;
mod volume_configurator;

pub use availability_zone::{AvailabilityZoneProvider, RandomAvailabilityZoneProvider};
pub use flavor::{FlavorResolver, OS_OVERHEAD_GB, get_closest_matched_flavor};
pub use service::{ComputeService, CreateServerRequest};
pub use user_data::{UserData, UserDataSettings};
pub use volume_configurator::configure_volumes;
