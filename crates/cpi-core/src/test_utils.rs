//! Test utilities for unit testing the services
//!
//! This module provides helpers for creating test data backed by `MockOpenStack`.

use crate::config::OpenstackConfig;
use crate::polling::PollingConfig;
use openstack_client::{Flavor, RetryPolicy, ServiceClient, ServiceClients};
use std::time::Duration;

/// Minimal valid `openstack` section
pub fn openstack_config() -> OpenstackConfig {
    serde_json::from_value(serde_json::json!({
        "auth_url": "https://keystone.test:5000/v3",
        "username": "admin",
        "api_key": "secret",
        "domain": "Default",
        "project": "bosh",
        "default_key_name": "default-key",
    }))
    .unwrap()
}

/// Client pair that never reaches the network; the mock ignores the endpoint
pub fn clients() -> ServiceClients {
    let client = ServiceClient::new(reqwest::Client::new(), "http://openstack.test", "token");
    ServiceClients::new(client, RetryPolicy::new(1, Duration::ZERO, Duration::ZERO))
}

/// Polling without pauses and a generous timeout
pub fn fast_polling() -> PollingConfig {
    PollingConfig::new(Duration::from_secs(5), Duration::ZERO)
}

/// Polling that times out before the first read
pub fn expired_polling() -> PollingConfig {
    PollingConfig::new(Duration::ZERO, Duration::ZERO)
}

/// Helper to create a test flavor
pub fn flavor(id: &str, vcpus: u32, ram: u64, disk: u64, ephemeral: u64) -> Flavor {
    Flavor {
        id: id.to_string(),
        name: id.to_string(),
        vcpus,
        ram,
        disk,
        ephemeral,
    }
}
