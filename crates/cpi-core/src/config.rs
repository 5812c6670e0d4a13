//! CPI configuration
//!
//! The director hands the CPI a JSON file shaped as
//! `{ "cloud": { "plugin": "openstack", "properties": { "openstack": {...}, "agent": {...} } } }`.

use crate::error::CpiError;
use crate::polling::PollingConfig;
use openstack_client::{AuthOptions, Interface, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable consulted when `openstack.region` is not set
pub const REGION_ENV_VAR: &str = "OS_REGION_NAME";

/// Root of the CPI config file
#[derive(Debug, Clone, Deserialize)]
pub struct CpiConfig {
    /// Cloud section
    pub cloud: CloudConfig,
}

/// `cloud` section
#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    /// Plugin name, `openstack`
    #[serde(default)]
    pub plugin: String,
    /// Plugin properties
    pub properties: CloudProperties,
}

/// `cloud.properties` section
#[derive(Debug, Clone, Deserialize)]
pub struct CloudProperties {
    /// OpenStack connection and behaviour settings
    pub openstack: OpenstackConfig,
    /// Settings forwarded to the agent through user data
    #[serde(default)]
    pub agent: AgentOptions,
}

/// `openstack` section
#[derive(Debug, Clone, Deserialize)]
pub struct OpenstackConfig {
    pub auth_url: String,
    pub username: String,
    pub api_key: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    /// Falls back to `OS_REGION_NAME`
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_endpoint_type")]
    pub endpoint_type: String,
    /// Seconds to wait for any resource to reach its target state
    #[serde(default = "default_state_timeout")]
    pub state_timeout: u64,
    /// Seconds between two status reads
    #[serde(default = "default_poll_interval")]
    pub wait_resource_poll_interval: u64,
    #[serde(default)]
    pub boot_from_volume: bool,
    #[serde(default)]
    pub default_key_name: Option<String>,
    #[serde(default)]
    pub default_security_groups: Vec<String>,
    #[serde(default)]
    pub default_volume_type: Option<String>,
    /// `cdrom` or `disk`; no config drive when unset
    #[serde(default)]
    pub config_drive: Option<String>,
    #[serde(default = "default_true")]
    pub use_dhcp: bool,
    #[serde(default)]
    pub ignore_server_availability_zone: bool,
    #[serde(default)]
    pub human_readable_vm_names: bool,
    #[serde(default)]
    pub stemcell_public_visibility: bool,
    #[serde(default)]
    pub connection_options: ConnectionOptions,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// HTTP connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionOptions {
    #[serde(default = "default_true")]
    pub ssl_verify_peer: bool,
    /// PEM encoded CA certificate
    #[serde(default)]
    pub ca_cert: Option<String>,
    /// Seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            ssl_verify_peer: true,
            ca_cert: None,
            request_timeout: default_request_timeout(),
        }
    }
}

/// Transport retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Seconds
    #[serde(default = "default_min_delay")]
    pub min_delay: u64,
    /// Seconds
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
        }
    }
}

/// `agent` section, copied into the user data of every VM
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOptions {
    #[serde(default)]
    pub mbus: String,
    #[serde(default)]
    pub ntp: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blobstore: Option<serde_json::Value>,
}

fn default_endpoint_type() -> String {
    "public".to_string()
}

fn default_state_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    10
}

fn default_min_delay() -> u64 {
    1
}

fn default_max_delay() -> u64 {
    8
}

impl CpiConfig {
    /// Parse and validate a config document
    pub fn from_json(json: &str) -> Result<Self, CpiError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CpiError::Config(format!("cannot parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self, CpiError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// OpenStack settings
    #[must_use]
    pub fn openstack(&self) -> &OpenstackConfig {
        &self.cloud.properties.openstack
    }

    /// Agent settings
    #[must_use]
    pub fn agent(&self) -> &AgentOptions {
        &self.cloud.properties.agent
    }

    /// Check the settings that cannot be defaulted
    pub fn validate(&self) -> Result<(), CpiError> {
        let os = self.openstack();
        for (field, value) in [
            ("auth_url", &os.auth_url),
            ("username", &os.username),
            ("api_key", &os.api_key),
        ] {
            if value.trim().is_empty() {
                return Err(CpiError::Config(format!("openstack.{} must be set", field)));
            }
        }

        if os.is_keystone_v3() {
            let missing = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
            if missing(&os.domain) || missing(&os.project) {
                return Err(CpiError::Config(
                    "openstack.domain and openstack.project must be set for Keystone v3".to_string(),
                ));
            }
        }

        if let Some(drive) = &os.config_drive {
            if drive != "cdrom" && drive != "disk" {
                return Err(CpiError::Config(format!(
                    "openstack.config_drive must be 'cdrom' or 'disk', got '{}'",
                    drive
                )));
            }
        }

        Interface::parse(&os.endpoint_type)
            .map_err(|e| CpiError::Config(format!("openstack.endpoint_type: {}", e)))?;

        if os.state_timeout == 0 {
            return Err(CpiError::Config("openstack.state_timeout must be greater than 0".to_string()));
        }
        if os.retry.max_attempts == 0 {
            return Err(CpiError::Config(
                "openstack.retry.max_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl OpenstackConfig {
    /// Whether `auth_url` points at the Keystone v3 API
    #[must_use]
    pub fn is_keystone_v3(&self) -> bool {
        self.auth_url.trim_end_matches('/').ends_with("/v3")
    }

    /// Whether a config drive is attached to new servers
    #[must_use]
    pub fn config_drive_enabled(&self) -> bool {
        self.config_drive.is_some()
    }

    /// Region from the config, else from `value_of(OS_REGION_NAME)`
    pub fn region_with<F>(&self, value_of: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.region
            .clone()
            .filter(|r| !r.is_empty())
            .or_else(|| value_of(REGION_ENV_VAR).filter(|r| !r.is_empty()))
    }

    /// Region from the config, else from the process environment
    #[must_use]
    pub fn region(&self) -> Option<String> {
        self.region_with(|key| std::env::var(key).ok())
    }

    /// Timeout and interval for every wait of the services
    #[must_use]
    pub fn polling(&self) -> PollingConfig {
        PollingConfig::new(
            Duration::from_secs(self.state_timeout),
            Duration::from_secs(self.wait_resource_poll_interval),
        )
    }

    /// Transport retry policy for the retryable clients
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_secs(self.retry.min_delay),
            Duration::from_secs(self.retry.max_delay),
        )
    }

    /// Keystone credentials and connection settings
    pub fn auth_options(&self) -> Result<AuthOptions, CpiError> {
        Ok(AuthOptions {
            auth_url: self.auth_url.clone(),
            username: self.username.clone(),
            password: self.api_key.clone(),
            domain: self.domain.clone().unwrap_or_else(|| "Default".to_string()),
            project: self.project.clone().unwrap_or_default(),
            region: self.region(),
            interface: Interface::parse(&self.endpoint_type)
                .map_err(|e| CpiError::Config(format!("openstack.endpoint_type: {}", e)))?,
            request_timeout: Duration::from_secs(self.connection_options.request_timeout),
            ssl_verify_peer: self.connection_options.ssl_verify_peer,
            ca_cert: self.connection_options.ca_cert.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_json(openstack: serde_json::Value) -> String {
        serde_json::json!({
            "cloud": {
                "plugin": "openstack",
                "properties": {
                    "openstack": openstack,
                    "agent": { "mbus": "nats://nats:4222", "ntp": ["0.pool.ntp.org"] }
                }
            }
        })
        .to_string()
    }

    fn minimal() -> serde_json::Value {
        serde_json::json!({
            "auth_url": "https://keystone:5000/v3",
            "username": "admin",
            "api_key": "secret",
            "domain": "Default",
            "project": "bosh"
        })
    }

    #[test]
    fn test_defaults() {
        let config = CpiConfig::from_json(&config_json(minimal())).unwrap();
        let os = config.openstack();

        assert_eq!(os.state_timeout, 300);
        assert_eq!(os.wait_resource_poll_interval, 5);
        assert!(os.use_dhcp);
        assert!(!os.boot_from_volume);
        assert!(os.connection_options.ssl_verify_peer);
        assert_eq!(os.retry.max_attempts, 10);
        assert_eq!(config.agent().mbus, "nats://nats:4222");
        assert_eq!(os.polling().timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_rejects_missing_credentials() {
        let mut openstack = minimal();
        openstack["api_key"] = serde_json::json!("");
        let err = CpiConfig::from_json(&config_json(openstack)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration: openstack.api_key must be set");
    }

    #[test]
    fn test_rejects_v3_without_project() {
        let mut openstack = minimal();
        openstack.as_object_mut().unwrap().remove("project");
        let err = CpiConfig::from_json(&config_json(openstack)).unwrap_err();
        assert!(err.to_string().contains("Keystone v3"));
    }

    #[test]
    fn test_rejects_unknown_config_drive() {
        let mut openstack = minimal();
        openstack["config_drive"] = serde_json::json!("floppy");
        assert!(CpiConfig::from_json(&config_json(openstack)).is_err());
    }

    #[test]
    fn test_rejects_zero_timeout_and_attempts() {
        let mut openstack = minimal();
        openstack["state_timeout"] = serde_json::json!(0);
        assert!(CpiConfig::from_json(&config_json(openstack)).is_err());

        let mut openstack = minimal();
        openstack["retry"] = serde_json::json!({ "max_attempts": 0 });
        assert!(CpiConfig::from_json(&config_json(openstack)).is_err());
    }

    #[test]
    fn test_region_falls_back_to_env() {
        let config = CpiConfig::from_json(&config_json(minimal())).unwrap();
        let os = config.openstack();

        let region = os.region_with(|key| (key == REGION_ENV_VAR).then(|| "RegionTwo".to_string()));
        assert_eq!(region.as_deref(), Some("RegionTwo"));

        let mut explicit = os.clone();
        explicit.region = Some("RegionOne".to_string());
        assert_eq!(
            explicit.region_with(|_| Some("RegionTwo".to_string())).as_deref(),
            Some("RegionOne")
        );
    }
}
