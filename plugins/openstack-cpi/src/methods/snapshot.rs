//! Snapshot methods

use super::disk::existing_volume;
use super::stringify_metadata;
use crate::cpi::Cpi;
use crate::error::MethodError;
use openstack_client::CreateSnapshotOpts;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Snapshot an attached or detached disk; returns the snapshot cid
pub async fn snapshot_disk(cpi: &Cpi, disk_cid: &str, metadata: &Map<String, Value>) -> Result<String, MethodError> {
    existing_volume(cpi, disk_cid).await?;
    let metadata = stringify_metadata(metadata);

    let opts = CreateSnapshotOpts {
        volume_id: disk_cid.to_string(),
        name: format!("snapshot-{}", Uuid::new_v4()),
        description: description(&metadata),
        force: true,
        metadata,
    };
    let snapshot = cpi.volumes.create_snapshot(&opts).await?;
    info!("Created snapshot '{}' of disk '{}'", snapshot.id, disk_cid);
    Ok(snapshot.id)
}

pub async fn delete_snapshot(cpi: &Cpi, snapshot_cid: &str) -> Result<(), MethodError> {
    cpi.volumes.delete_snapshot(snapshot_cid).await?;
    Ok(())
}

/// `deployment/job/index`, skipping the parts that are missing
fn description(metadata: &HashMap<String, String>) -> String {
    ["deployment", "job", "index"]
        .iter()
        .filter_map(|key| metadata.get(*key))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::test_support::cpi;
    use openstack_client::{MockOpenStack, Volume};
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_and_delete() {
        let mock = MockOpenStack::new();
        mock.add_volume(Volume {
            id: "volume-1".to_string(),
            status: "in-use".to_string(),
            size: 10,
            ..Default::default()
        });
        let cpi = cpi(&mock);
        let metadata = json!({ "deployment": "cf", "job": "database", "index": 0, "director_name": "bosh" });

        let snapshot_cid = snapshot_disk(&cpi, "volume-1", metadata.as_object().unwrap()).await.unwrap();
        let snapshot = mock.snapshot(&snapshot_cid).unwrap();
        assert_eq!(snapshot.volume_id, "volume-1");
        assert!(snapshot.name.unwrap().starts_with("snapshot-"));

        delete_snapshot(&cpi, &snapshot_cid).await.unwrap();
        assert!(mock.snapshot(&snapshot_cid).is_none());
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_disk() {
        let mock = MockOpenStack::new();
        let err = snapshot_disk(&cpi(&mock), "volume-404", &Map::new()).await.unwrap_err();
        assert_eq!(err.error_type(), "Bosh::Clouds::DiskNotFound");
        assert_eq!(mock.call_count("create_snapshot"), 0);
    }

    #[test]
    fn test_description() {
        let mut metadata = HashMap::new();
        metadata.insert("deployment".to_string(), "cf".to_string());
        metadata.insert("index".to_string(), "1".to_string());
        assert_eq!(description(&metadata), "cf/1");
        metadata.insert("job".to_string(), "router".to_string());
        assert_eq!(description(&metadata), "cf/router/1");
    }
}
