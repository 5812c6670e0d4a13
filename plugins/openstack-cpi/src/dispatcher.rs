//! Method dispatch
//!
//! Parses the positional arguments of a request, runs the method and wraps
//! the outcome in a response envelope.

use crate::cpi::Cpi;
use crate::error::MethodError;
use crate::methods::{disk, info, snapshot, stemcell, vm};
use crate::rpc::{Request, Response};
use cpi_core::{CpiConfig, CreateVmCloudProperties, DiskCloudProperties, Networks, StemcellCloudProperties, VmResources};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::{error, info};

/// Answer a request, connecting to OpenStack only when the method needs it
pub async fn handle(request: &Request, config: &CpiConfig) -> Response {
    if request.method == "info" {
        return Response::ok(info::info());
    }
    match Cpi::connect(config).await {
        Ok(cpi) => dispatch(&cpi, request).await,
        Err(e) => {
            error!("Failed to connect to OpenStack: {}", e);
            MethodError::from(e).to_response()
        }
    }
}

/// Run a request against an already connected CPI
pub async fn dispatch(cpi: &Cpi, request: &Request) -> Response {
    info!(
        "Running '{}' (request {}, api version {})",
        request.method,
        request.request_id().unwrap_or("-"),
        request.api_version()
    );
    match run(cpi, request).await {
        Ok(result) => Response::ok(result),
        Err(e) => {
            error!("'{}' failed: {}", request.method, e);
            e.to_response()
        }
    }
}

async fn run(cpi: &Cpi, request: &Request) -> Result<Value, MethodError> {
    let args = Arguments(&request.arguments);
    match request.method.as_str() {
        "info" => Ok(info::info()),

        "create_stemcell" => {
            let image_path: String = args.required(0, "image_path")?;
            let properties: StemcellCloudProperties = args.required(1, "cloud_properties")?;
            let cid = stemcell::create_stemcell(cpi, Path::new(&image_path), &properties).await?;
            Ok(json!(cid))
        }
        "delete_stemcell" => {
            let cid: String = args.required(0, "stemcell_cid")?;
            stemcell::delete_stemcell(cpi, &cid).await?;
            Ok(Value::Null)
        }

        "create_vm" => {
            let request_args = vm::CreateVm {
                agent_id: args.required(0, "agent_id")?,
                stemcell_cid: args.required(1, "stemcell_cid")?,
                cloud_properties: args.optional::<CreateVmCloudProperties>(2, "cloud_properties")?,
                networks: args.optional::<Networks>(3, "networks")?,
                env: args.optional(5, "env")?,
            };
            let vm_cid = vm::create_vm(cpi, &request_args).await?;
            if request.api_version() >= 2 {
                Ok(json!([vm_cid, request_args.networks]))
            } else {
                Ok(json!(vm_cid))
            }
        }
        "delete_vm" => {
            let vm_cid: String = args.required(0, "vm_cid")?;
            vm::delete_vm(cpi, &vm_cid).await?;
            Ok(Value::Null)
        }
        "has_vm" => {
            let vm_cid: String = args.required(0, "vm_cid")?;
            Ok(json!(vm::has_vm(cpi, &vm_cid).await?))
        }
        "reboot_vm" => {
            let vm_cid: String = args.required(0, "vm_cid")?;
            vm::reboot_vm(cpi, &vm_cid).await?;
            Ok(Value::Null)
        }
        "set_vm_metadata" => {
            let vm_cid: String = args.required(0, "vm_cid")?;
            let metadata: Map<String, Value> = args.optional(1, "metadata")?;
            vm::set_vm_metadata(cpi, &vm_cid, &metadata).await?;
            Ok(Value::Null)
        }
        "calculate_vm_cloud_properties" => {
            let resources: VmResources = args.required(0, "vm_resources")?;
            vm::calculate_vm_cloud_properties(cpi, &resources).await
        }

        "create_disk" => {
            let size_mb: u64 = args.required(0, "size")?;
            let properties: DiskCloudProperties = args.optional(1, "cloud_properties")?;
            let vm_cid: Option<String> = args.optional(2, "vm_cid")?;
            Ok(json!(disk::create_disk(cpi, size_mb, &properties, vm_cid.as_deref()).await?))
        }
        "delete_disk" => {
            let disk_cid: String = args.required(0, "disk_cid")?;
            disk::delete_disk(cpi, &disk_cid).await?;
            Ok(Value::Null)
        }
        "has_disk" => {
            let disk_cid: String = args.required(0, "disk_cid")?;
            Ok(json!(disk::has_disk(cpi, &disk_cid).await?))
        }
        "attach_disk" => {
            let vm_cid: String = args.required(0, "vm_cid")?;
            let disk_cid: String = args.required(1, "disk_cid")?;
            Ok(json!(disk::attach_disk(cpi, &vm_cid, &disk_cid).await?))
        }
        "detach_disk" => {
            let vm_cid: String = args.required(0, "vm_cid")?;
            let disk_cid: String = args.required(1, "disk_cid")?;
            disk::detach_disk(cpi, &vm_cid, &disk_cid).await?;
            Ok(Value::Null)
        }
        "get_disks" => {
            let vm_cid: String = args.required(0, "vm_cid")?;
            Ok(json!(disk::get_disks(cpi, &vm_cid).await?))
        }
        "resize_disk" => {
            let disk_cid: String = args.required(0, "disk_cid")?;
            let new_size_mb: u64 = args.required(1, "new_size")?;
            disk::resize_disk(cpi, &disk_cid, new_size_mb).await?;
            Ok(Value::Null)
        }
        "set_disk_metadata" => {
            let disk_cid: String = args.required(0, "disk_cid")?;
            let metadata: Map<String, Value> = args.optional(1, "metadata")?;
            disk::set_disk_metadata(cpi, &disk_cid, &metadata).await?;
            Ok(Value::Null)
        }

        "snapshot_disk" => {
            let disk_cid: String = args.required(0, "disk_cid")?;
            let metadata: Map<String, Value> = args.optional(1, "metadata")?;
            Ok(json!(snapshot::snapshot_disk(cpi, &disk_cid, &metadata).await?))
        }
        "delete_snapshot" => {
            let snapshot_cid: String = args.required(0, "snapshot_cid")?;
            snapshot::delete_snapshot(cpi, &snapshot_cid).await?;
            Ok(Value::Null)
        }

        other => Err(MethodError::NotImplemented(other.to_string())),
    }
}

/// Positional request arguments
struct Arguments<'a>(&'a [Value]);

impl Arguments<'_> {
    fn required<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, MethodError> {
        let value = self.0.get(index).ok_or_else(|| {
            MethodError::InvalidArguments(format!("missing argument '{}' at position {}", name, index))
        })?;
        serde_json::from_value(value.clone())
            .map_err(|e| MethodError::InvalidArguments(format!("argument '{}': {}", name, e)))
    }

    /// Absent and `null` arguments yield the default
    fn optional<T: DeserializeOwned + Default>(&self, index: usize, name: &str) -> Result<T, MethodError> {
        match self.0.get(index) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(_) => self.required(index, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::test_support::cpi;
    use openstack_client::{MockOpenStack, Server};

    fn request(value: Value) -> Request {
        serde_json::from_value(value).unwrap()
    }

    fn error_type(response: &Response) -> &str {
        response.error.as_ref().map(|e| e.error_type.as_str()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_info() {
        let response = dispatch(&cpi(&MockOpenStack::new()), &request(json!({ "method": "info" }))).await;
        assert_eq!(response.result["api_version"], 2);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = dispatch(
            &cpi(&MockOpenStack::new()),
            &request(json!({ "method": "migrate_vm", "arguments": [] })),
        )
        .await;
        assert_eq!(error_type(&response), "Bosh::Clouds::NotImplemented");
        assert_eq!(response.result, Value::Null);
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let response = dispatch(&cpi(&MockOpenStack::new()), &request(json!({ "method": "has_vm" }))).await;
        assert_eq!(error_type(&response), "Bosh::Clouds::CpiError");
        assert_eq!(
            response.error.unwrap().message,
            "Invalid arguments: missing argument 'vm_cid' at position 0"
        );
    }

    #[tokio::test]
    async fn test_has_vm() {
        let mock = MockOpenStack::new();
        mock.add_server(Server {
            id: "vm-1".to_string(),
            status: "ACTIVE".to_string(),
            ..Default::default()
        });
        let cpi = cpi(&mock);

        let response = dispatch(&cpi, &request(json!({ "method": "has_vm", "arguments": ["vm-1"] }))).await;
        assert_eq!(response.result, json!(true));
        let response = dispatch(&cpi, &request(json!({ "method": "has_vm", "arguments": ["vm-2"] }))).await;
        assert_eq!(response.result, json!(false));
    }

    #[tokio::test]
    async fn test_create_disk_with_null_arguments() {
        let mock = MockOpenStack::new();
        let response = dispatch(
            &cpi(&mock),
            &request(json!({ "method": "create_disk", "arguments": [2048, null, null] })),
        )
        .await;
        let disk_cid = response.result.as_str().unwrap();
        assert_eq!(mock.volume(disk_cid).unwrap().size, 2);
    }

    #[tokio::test]
    async fn test_create_vm_result_depends_on_api_version() {
        let mock = MockOpenStack::new();
        mock.add_flavor(openstack_client::Flavor {
            id: "flavor-1".to_string(),
            name: "m1.small".to_string(),
            vcpus: 1,
            ram: 2048,
            disk: 20,
            ephemeral: 0,
        });
        mock.add_key_pair("default-key");
        mock.add_image("image-1", "active");
        mock.add_security_group("sg-1", "default");
        let cpi = cpi(&mock);
        let networks = json!({ "private": { "type": "dynamic", "cloud_properties": { "net_id": "net-1" } } });
        let arguments = json!(["agent-1", "image-1", { "instance_type": "m1.small" }, networks, [], {}]);

        let v1 = dispatch(&cpi, &request(json!({ "method": "create_vm", "arguments": arguments }))).await;
        assert!(v1.result.as_str().unwrap().starts_with("server-"));

        let v2 = dispatch(
            &cpi,
            &request(json!({ "method": "create_vm", "arguments": arguments, "api_version": 2 })),
        )
        .await;
        assert!(v2.result[0].as_str().unwrap().starts_with("server-"));
        assert_eq!(v2.result[1]["private"]["cloud_properties"]["net_id"], "net-1");
    }
}
