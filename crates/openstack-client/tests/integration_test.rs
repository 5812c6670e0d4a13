//! Integration tests for the OpenStack client
//!
//! These tests require a reachable OpenStack cloud.
//! Set OS_AUTH_URL, OS_USERNAME, OS_PASSWORD, OS_PROJECT_NAME and
//! OS_USER_DOMAIN_NAME to run them.

use openstack_client::{
    authenticate, AuthOptions, ComputeFacade, Interface, NetworkingFacade, OpenStackFacade,
    PortListOpts, RetryPolicy,
};
use std::time::Duration;

fn options_from_env() -> AuthOptions {
    let var = |name: &str| std::env::var(name).unwrap_or_else(|_| panic!("{} must be set", name));
    AuthOptions {
        auth_url: var("OS_AUTH_URL"),
        username: var("OS_USERNAME"),
        password: var("OS_PASSWORD"),
        domain: std::env::var("OS_USER_DOMAIN_NAME").unwrap_or_else(|_| "Default".to_string()),
        project: var("OS_PROJECT_NAME"),
        region: std::env::var("OS_REGION_NAME").ok(),
        interface: Interface::Public,
        request_timeout: Duration::from_secs(60),
        ssl_verify_peer: true,
        ca_cert: None,
    }
}

#[tokio::test]
#[ignore] // Requires a running OpenStack cloud
async fn test_authenticate_and_resolve_endpoints() {
    let session = authenticate(&options_from_env())
        .await
        .expect("Failed to authenticate");

    assert!(session.endpoint(&["compute"]).is_ok(), "No compute endpoint");
    assert!(session.endpoint(&["network"]).is_ok(), "No network endpoint");
}

#[tokio::test]
#[ignore]
async fn test_list_flavors() {
    let session = authenticate(&options_from_env())
        .await
        .expect("Failed to authenticate");
    let compute = session
        .service_clients(&["compute"], RetryPolicy::default())
        .expect("No compute endpoint");

    let flavors = OpenStackFacade
        .list_flavors(&compute.retryable)
        .await
        .expect("Failed to list flavors");

    println!("Found {} flavors", flavors.len());
}

#[tokio::test]
#[ignore]
async fn test_list_ports_with_unknown_device() {
    let session = authenticate(&options_from_env())
        .await
        .expect("Failed to authenticate");
    let network = session
        .service_clients(&["network"], RetryPolicy::default())
        .expect("No network endpoint");

    let ports = OpenStackFacade
        .list_ports(
            &network.retryable,
            &PortListOpts {
                device_id: Some("00000000-0000-0000-0000-000000000000".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list ports");

    assert!(ports.is_empty());
}
