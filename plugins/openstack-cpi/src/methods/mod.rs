//! CPI methods
//!
//! - `info.rs` - API version and stemcell formats
//! - `stemcell.rs` - heavy and light stemcells
//! - `vm.rs` - VM lifecycle, metadata and sizing
//! - `disk.rs` - persistent disks
//! - `snapshot.rs` - disk snapshots

pub mod disk;
pub mod info;
pub mod snapshot;
pub mod stemcell;
pub mod vm;

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Metadata as OpenStack stores it: string values only
pub fn stringify_metadata(metadata: &Map<String, Value>) -> HashMap<String, String> {
    metadata
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Disk size in whole GiB, rounding up from MiB
pub fn mib_to_gib(size_mb: u64) -> u64 {
    size_mb.div_ceil(1024)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::cpi::{Cpi, CpiClients};
    use cpi_core::CpiConfig;
    use openstack_client::{MockOpenStack, RetryPolicy, ServiceClient, ServiceClients};
    use std::sync::Arc;
    use std::time::Duration;

    pub fn config() -> CpiConfig {
        CpiConfig::from_json(
            &serde_json::json!({
                "cloud": {
                    "plugin": "openstack",
                    "properties": {
                        "openstack": {
                            "auth_url": "https://keystone.test:5000/v3",
                            "username": "admin",
                            "api_key": "secret",
                            "domain": "Default",
                            "project": "bosh",
                            "default_key_name": "default-key",
                            "default_security_groups": ["default"],
                            "human_readable_vm_names": true,
                            "state_timeout": 5,
                            "wait_resource_poll_interval": 0
                        },
                        "agent": { "mbus": "nats://nats.test:4222", "ntp": [] }
                    }
                }
            })
            .to_string(),
        )
        .unwrap()
    }

    fn clients() -> ServiceClients {
        let client = ServiceClient::new(reqwest::Client::new(), "http://openstack.test", "token");
        ServiceClients::new(client, RetryPolicy::new(1, Duration::ZERO, Duration::ZERO))
    }

    /// CPI backed by `mock`, with every service available
    pub fn cpi(mock: &MockOpenStack) -> Cpi {
        cpi_with(mock, &config())
    }

    pub fn cpi_with(mock: &MockOpenStack, config: &CpiConfig) -> Cpi {
        let clients = CpiClients {
            compute: clients(),
            network: clients(),
            volume: clients(),
            loadbalancer: Some(clients()),
            image: clients(),
        };
        Cpi::new(Arc::new(mock.clone()), clients, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_metadata() {
        let metadata = serde_json::json!({ "director": "bosh", "index": 0, "compiling": true, "empty": null });
        let metadata = stringify_metadata(metadata.as_object().unwrap());
        assert_eq!(metadata["director"], "bosh");
        assert_eq!(metadata["index"], "0");
        assert_eq!(metadata["compiling"], "true");
        assert_eq!(metadata["empty"], "");
    }

    #[test]
    fn test_mib_to_gib_rounds_up() {
        assert_eq!(mib_to_gib(1024), 1);
        assert_eq!(mib_to_gib(1025), 2);
        assert_eq!(mib_to_gib(1), 1);
    }
}
