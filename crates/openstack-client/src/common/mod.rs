//! Common utilities for the OpenStack API client
//!
//! Provides the authenticated `ServiceClient` shared by every facade and the
//! plain/retryable `ServiceClients` pair.

use crate::error::OpenStackError;
use crate::retry::RetryPolicy;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, warn};

/// HTTP client bound to one service endpoint of the catalog
#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    endpoint: String,
    token: String,
    retry: Option<RetryPolicy>,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("endpoint", &self.endpoint)
            .field("retryable", &self.retry.is_some())
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    /// Create a new service client wrapper
    pub fn new(client: Client, endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
            retry: None,
        }
    }

    /// Decorate this client with a retry policy
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether transient failures are retried by this client
    pub fn is_retryable(&self) -> bool {
        self.retry.is_some()
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.endpoint, path)
        }
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, OpenStackError> {
        let response = self.send(Method::GET, path, None).await?;
        decode(response).await
    }

    /// Make a POST request and decode the response body
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, OpenStackError> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        decode(response).await
    }

    /// Make a POST request whose response carries no body (server/volume actions)
    pub async fn post_no_content(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<(), OpenStackError> {
        self.send(Method::POST, path, Some(body)).await?;
        Ok(())
    }

    /// Make a PUT request and decode the response body
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, OpenStackError> {
        let response = self.send(Method::PUT, path, Some(body)).await?;
        decode(response).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), OpenStackError> {
        self.send(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Stream a file as the request body of a PUT. Never retried, the body is consumed.
    pub async fn put_file(
        &self,
        path: &str,
        file: tokio::fs::File,
        content_type: &str,
    ) -> Result<(), OpenStackError> {
        let url = self.build_url(path);
        debug!("PUT {} (streamed {})", url, content_type);

        let response = self
            .client
            .put(&url)
            .header("X-Auth-Token", self.token.as_str())
            .header("Content-Type", content_type)
            .body(reqwest::Body::from(file))
            .send()
            .await?;

        check_status(&Method::PUT, &url, response).await?;
        Ok(())
    }

    /// Build query string from filters, skipping empty values
    pub fn build_query_string(filters: &[(&str, &str)]) -> String {
        let pairs: Vec<String> = filters
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();

        if pairs.is_empty() {
            String::new()
        } else {
            format!("?{}", pairs.join("&"))
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, OpenStackError> {
        let url = self.build_url(path);

        let Some(policy) = &self.retry else {
            return self.send_once(&method, &url, body).await;
        };

        let mut backoff = policy.backoff();
        let mut attempt = 1;
        loop {
            match self.send_once(&method, &url, body).await {
                Err(e) if e.is_transient() => {
                    if attempt >= policy.max_attempts() {
                        return Err(OpenStackError::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    let delay = backoff.next_backoff();
                    warn!(
                        "{} {} failed with a transient error (attempt {}/{}): {}, retrying in {:?}",
                        method,
                        url,
                        attempt,
                        policy.max_attempts(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, OpenStackError> {
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), url)
            .header("X-Auth-Token", self.token.as_str())
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        check_status(method, url, response).await
    }
}

/// Map non-success statuses onto `OpenStackError`
async fn check_status(
    method: &Method,
    url: &str,
    response: Response,
) -> Result<Response, OpenStackError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        404 => OpenStackError::NotFound(format!("{} {}: {}", method, url, body)),
        409 => OpenStackError::Conflict(format!("{} {}: {}", method, url, body)),
        401 | 403 => OpenStackError::Authentication(format!("{} {}: {} - {}", method, url, status, body)),
        code => OpenStackError::Api {
            status: code,
            message: format!("{} {} failed: {}", method, url, body),
        },
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, OpenStackError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        OpenStackError::InvalidRequest(format!(
            "error decoding response body: {} - Response (first 500 chars): {}",
            e,
            text.chars().take(500).collect::<String>()
        ))
    })
}

/// Plain and retry-decorated clients over the same authenticated connection
///
/// Reads and idempotent-safe calls go through `retryable`; mutations that must
/// not be replayed go through `client`.
#[derive(Debug, Clone)]
pub struct ServiceClients {
    /// Client without retry
    pub client: ServiceClient,
    /// Client that retries transient failures
    pub retryable: ServiceClient,
}

impl ServiceClients {
    /// Build the pair from a single service client
    pub fn new(client: ServiceClient, policy: RetryPolicy) -> Self {
        let retryable = client.clone().with_retry(policy);
        Self { client, retryable }
    }

    /// Pick the retryable client when `retryable` is set
    pub fn select(&self, retryable: bool) -> &ServiceClient {
        if retryable { &self.retryable } else { &self.client }
    }
}
