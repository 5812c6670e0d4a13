//! Persistent disk methods

use super::{mib_to_gib, stringify_metadata};
use crate::cpi::Cpi;
use crate::error::MethodError;
use cpi_core::volume::volume_status;
use cpi_core::{CpiError, DiskCloudProperties};
use openstack_client::{CreateVolumeOpts, Volume};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

pub async fn create_disk(
    cpi: &Cpi,
    size_mb: u64,
    properties: &DiskCloudProperties,
    vm_cid: Option<&str>,
) -> Result<String, MethodError> {
    if size_mb == 0 {
        return Err(CpiError::Validation("disk size must be greater than 0".to_string()).into());
    }

    // Keep the disk next to its VM unless zones are managed by the director
    let availability_zone = match vm_cid {
        Some(vm_cid) if !cpi.config.ignore_server_availability_zone => {
            cpi.compute.get_server(vm_cid).await?.availability_zone
        }
        _ => None,
    };

    let opts = CreateVolumeOpts {
        size: mib_to_gib(size_mb),
        name: format!("volume-{}", Uuid::new_v4()),
        availability_zone,
        volume_type: properties
            .volume_type
            .clone()
            .or_else(|| cpi.config.default_volume_type.clone()),
        ..Default::default()
    };
    let volume = cpi.volumes.create_volume(&opts).await?;
    info!("Created disk '{}' of {} GiB", volume.id, opts.size);
    Ok(volume.id)
}

pub async fn delete_disk(cpi: &Cpi, disk_cid: &str) -> Result<(), MethodError> {
    cpi.volumes.delete_volume(disk_cid).await?;
    Ok(())
}

pub async fn has_disk(cpi: &Cpi, disk_cid: &str) -> Result<bool, MethodError> {
    match cpi.volumes.get_volume(disk_cid).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Attach and return the device path Nova reported
pub async fn attach_disk(cpi: &Cpi, vm_cid: &str, disk_cid: &str) -> Result<String, MethodError> {
    ensure_vm(cpi, vm_cid).await?;
    existing_volume(cpi, disk_cid).await?;

    let attachments = cpi.compute.list_volume_attachments(vm_cid).await?;
    if let Some(attachment) = attachments.into_iter().find(|a| a.volume_id == disk_cid) {
        info!("SKIPPING: disk '{}' is already attached to VM '{}'", disk_cid, vm_cid);
        return Ok(attachment.device.unwrap_or_default());
    }

    let attachment = cpi.compute.attach_volume(vm_cid, disk_cid, None).await?;
    cpi.volumes
        .wait_for_volume_to_become_status(disk_cid, volume_status::IN_USE)
        .await?;
    info!("Attached disk '{}' to VM '{}'", disk_cid, vm_cid);
    Ok(attachment.device.unwrap_or_default())
}

pub async fn detach_disk(cpi: &Cpi, vm_cid: &str, disk_cid: &str) -> Result<(), MethodError> {
    ensure_vm(cpi, vm_cid).await?;
    cpi.compute.detach_volume(vm_cid, disk_cid).await?;
    cpi.volumes
        .wait_for_volume_to_become_status(disk_cid, volume_status::AVAILABLE)
        .await?;
    info!("Detached disk '{}' from VM '{}'", disk_cid, vm_cid);
    Ok(())
}

pub async fn get_disks(cpi: &Cpi, vm_cid: &str) -> Result<Vec<String>, MethodError> {
    let attachments = cpi.compute.list_volume_attachments(vm_cid).await?;
    Ok(attachments.into_iter().map(|a| a.volume_id).collect())
}

/// Grow a detached disk
pub async fn resize_disk(cpi: &Cpi, disk_cid: &str, new_size_mb: u64) -> Result<(), MethodError> {
    let new_size = mib_to_gib(new_size_mb);
    let volume = existing_volume(cpi, disk_cid).await?;

    if volume.size == new_size {
        info!("SKIPPING: disk '{}' already has {} GiB", disk_cid, new_size);
        return Ok(());
    }
    if new_size < volume.size {
        return Err(CpiError::Validation(format!(
            "cannot shrink disk '{}' from {} GiB to {} GiB",
            disk_cid, volume.size, new_size
        ))
        .into());
    }
    if !volume.attachments.is_empty() {
        return Err(CpiError::ResourceState(format!(
            "cannot resize disk '{}' while it is attached",
            disk_cid
        ))
        .into());
    }

    cpi.volumes.extend_volume(disk_cid, new_size).await?;
    info!("Resized disk '{}' to {} GiB", disk_cid, new_size);
    Ok(())
}

pub async fn set_disk_metadata(cpi: &Cpi, disk_cid: &str, metadata: &Map<String, Value>) -> Result<(), MethodError> {
    existing_volume(cpi, disk_cid).await?;
    cpi.volumes
        .update_volume_metadata(disk_cid, &stringify_metadata(metadata))
        .await?;
    Ok(())
}

async fn ensure_vm(cpi: &Cpi, vm_cid: &str) -> Result<(), MethodError> {
    if cpi.compute.has_server(vm_cid).await? {
        Ok(())
    } else {
        Err(MethodError::VmNotFound(vm_cid.to_string()))
    }
}

pub(crate) async fn existing_volume(cpi: &Cpi, disk_cid: &str) -> Result<Volume, MethodError> {
    match cpi.volumes.get_volume(disk_cid).await {
        Ok(volume) => Ok(volume),
        Err(e) if e.is_not_found() => Err(MethodError::DiskNotFound(disk_cid.to_string())),
        Err(e) => Err(e.into()),
    }
}
