//! Keystone v3 authentication and service catalog lookup
//!
//! Password authentication scoped to a project. The token returned in the
//! `X-Subject-Token` header is shared by every `ServiceClient` built from the
//! resulting `Session`.

use crate::common::{ServiceClient, ServiceClients};
use crate::error::OpenStackError;
use crate::retry::RetryPolicy;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Endpoint interface to pick from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interface {
    /// Public endpoints
    #[default]
    Public,
    /// Internal endpoints
    Internal,
    /// Admin endpoints
    Admin,
}

impl Interface {
    /// Parse the `endpoint_type` config value. Accepts `public`, `publicURL`, etc.
    pub fn parse(value: &str) -> Result<Self, OpenStackError> {
        match value.trim_end_matches("URL").to_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "internal" => Ok(Self::Internal),
            "admin" => Ok(Self::Admin),
            other => Err(OpenStackError::InvalidRequest(format!(
                "unknown endpoint type '{}'",
                other
            ))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Admin => "admin",
        }
    }
}

/// Credentials and connection settings for Keystone
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// Keystone URL, with or without the `/v3` suffix
    pub auth_url: String,
    /// User name
    pub username: String,
    /// Password
    pub password: String,
    /// User and project domain name
    pub domain: String,
    /// Project name
    pub project: String,
    /// Region to select endpoints from; any region when unset
    pub region: Option<String>,
    /// Endpoint interface
    pub interface: Interface,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Verify TLS certificates
    pub ssl_verify_peer: bool,
    /// Additional PEM encoded CA certificate
    pub ca_cert: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

/// One service of the Keystone catalog
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// Service type, e.g. `compute`
    #[serde(rename = "type")]
    pub service_type: String,
    /// Endpoints of this service
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// Endpoint of a catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    /// `public`, `internal` or `admin`
    pub interface: String,
    /// Region ID
    #[serde(default)]
    pub region_id: Option<String>,
    /// Region name (older deployments)
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint URL
    pub url: String,
}

/// Authenticated connection: one token plus the catalog it was issued with
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    token: String,
    catalog: Vec<CatalogEntry>,
    region: Option<String>,
    interface: Interface,
}

impl Session {
    /// Assemble a session from parts (used by tests and by `authenticate`)
    pub fn new(
        client: Client,
        token: impl Into<String>,
        catalog: Vec<CatalogEntry>,
        region: Option<String>,
        interface: Interface,
    ) -> Self {
        Self {
            client,
            token: token.into(),
            catalog,
            region,
            interface,
        }
    }

    /// Find the endpoint URL of the first matching service type
    pub fn endpoint(&self, service_types: &[&str]) -> Result<String, OpenStackError> {
        for service_type in service_types {
            let Some(entry) = self.catalog.iter().find(|e| e.service_type == *service_type) else {
                continue;
            };
            let endpoint = entry.endpoints.iter().find(|ep| {
                ep.interface == self.interface.as_str()
                    && self.region.as_ref().is_none_or(|region| {
                        ep.region_id.as_ref() == Some(region) || ep.region.as_ref() == Some(region)
                    })
            });
            if let Some(endpoint) = endpoint {
                debug!("Resolved {} endpoint: {}", service_type, endpoint.url);
                return Ok(endpoint.url.clone());
            }
        }

        Err(OpenStackError::Endpoint(format!(
            "no {} endpoint for service type(s) {:?} in region {}",
            self.interface.as_str(),
            service_types,
            self.region.as_deref().unwrap_or("<any>")
        )))
    }

    /// Plain and retryable clients for a service
    pub fn service_clients(
        &self,
        service_types: &[&str],
        policy: RetryPolicy,
    ) -> Result<ServiceClients, OpenStackError> {
        let endpoint = self.endpoint(service_types)?;
        let client = ServiceClient::new(self.client.clone(), endpoint, self.token.clone());
        Ok(ServiceClients::new(client, policy))
    }
}

/// Build the shared reqwest client from connection settings
pub fn build_http_client(options: &AuthOptions) -> Result<Client, OpenStackError> {
    let mut builder = Client::builder()
        .timeout(options.request_timeout)
        .danger_accept_invalid_certs(!options.ssl_verify_peer);

    if let Some(pem) = &options.ca_cert {
        let cert = reqwest::Certificate::from_pem(pem.as_bytes())?;
        builder = builder.add_root_certificate(cert);
    }

    Ok(builder.build()?)
}

/// Authenticate against Keystone v3 with a project-scoped password token
pub async fn authenticate(options: &AuthOptions) -> Result<Session, OpenStackError> {
    let client = build_http_client(options)?;
    let url = tokens_url(&options.auth_url);
    debug!("Authenticating user {} against {}", options.username, url);

    let body = serde_json::json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": options.username,
                        "domain": { "name": options.domain },
                        "password": options.password,
                    }
                }
            },
            "scope": {
                "project": {
                    "name": options.project,
                    "domain": { "name": options.domain },
                }
            }
        }
    });

    let response = client
        .post(&url)
        .header("Accept", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OpenStackError::Authentication(format!("{} - {}", status, body)));
    }

    let token = response
        .headers()
        .get("X-Subject-Token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| OpenStackError::Authentication("response carries no X-Subject-Token".to_string()))?;

    let text = response.text().await?;
    let parsed: TokenResponse = serde_json::from_str(&text)?;

    info!(
        "Authenticated against Keystone, catalog has {} services",
        parsed.token.catalog.len()
    );

    Ok(Session::new(
        client,
        token,
        parsed.token.catalog,
        options.region.clone(),
        options.interface,
    ))
}

fn tokens_url(auth_url: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with("/v3") {
        format!("{}/auth/tokens", base)
    } else {
        format!("{}/v3/auth/tokens", base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<CatalogEntry> {
        serde_json::from_value(serde_json::json!([
            {
                "type": "compute",
                "endpoints": [
                    { "interface": "public", "region_id": "RegionOne", "url": "https://nova.one/v2.1" },
                    { "interface": "internal", "region_id": "RegionOne", "url": "http://nova.internal/v2.1" },
                    { "interface": "public", "region_id": "RegionTwo", "url": "https://nova.two/v2.1" }
                ]
            },
            {
                "type": "volumev3",
                "endpoints": [
                    { "interface": "public", "region": "RegionOne", "url": "https://cinder.one/v3/p" }
                ]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_tokens_url() {
        assert_eq!(tokens_url("https://keystone:5000/v3/"), "https://keystone:5000/v3/auth/tokens");
        assert_eq!(tokens_url("https://keystone:5000"), "https://keystone:5000/v3/auth/tokens");
    }

    #[test]
    fn test_interface_parse() {
        assert_eq!(Interface::parse("publicURL").unwrap(), Interface::Public);
        assert_eq!(Interface::parse("internal").unwrap(), Interface::Internal);
        assert!(Interface::parse("private").is_err());
    }

    #[test]
    fn test_endpoint_selects_region_and_interface() {
        let session = Session::new(
            Client::new(),
            "t",
            catalog(),
            Some("RegionTwo".to_string()),
            Interface::Public,
        );
        assert_eq!(session.endpoint(&["compute"]).unwrap(), "https://nova.two/v2.1");

        let internal = Session::new(Client::new(), "t", catalog(), None, Interface::Internal);
        assert_eq!(internal.endpoint(&["compute"]).unwrap(), "http://nova.internal/v2.1");
    }

    #[test]
    fn test_endpoint_falls_through_service_types() {
        let session = Session::new(
            Client::new(),
            "t",
            catalog(),
            Some("RegionOne".to_string()),
            Interface::Public,
        );
        assert_eq!(
            session.endpoint(&["block-storage", "volumev3"]).unwrap(),
            "https://cinder.one/v3/p"
        );
        assert!(matches!(
            session.endpoint(&["load-balancer"]),
            Err(OpenStackError::Endpoint(_))
        ));
    }
}
