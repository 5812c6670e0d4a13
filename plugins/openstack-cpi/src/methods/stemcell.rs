//! Stemcell methods
//!
//! A heavy stemcell uploads `root.img` from the stemcell's image tarball.
//! A light stemcell points at an image that already exists; its cid carries
//! a ` light` suffix so `delete_stemcell` leaves the image alone.

use crate::cpi::Cpi;
use crate::error::MethodError;
use cpi_core::{CpiError, StemcellCloudProperties};
use openstack_client::CreateImageOpts;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

const LIGHT_SUFFIX: &str = " light";

/// Image ID behind a stemcell cid
pub fn image_id(stemcell_cid: &str) -> &str {
    stemcell_cid.strip_suffix(LIGHT_SUFFIX).unwrap_or(stemcell_cid)
}

pub async fn create_stemcell(
    cpi: &Cpi,
    image_path: &Path,
    properties: &StemcellCloudProperties,
) -> Result<String, MethodError> {
    if let Some(image_id) = &properties.image_id {
        let image = cpi.images.get_image(image_id).await?;
        if image.status != "active" {
            return Err(CpiError::ResourceState(format!(
                "light stemcell image '{}' is {}, expected active",
                image_id, image.status
            ))
            .into());
        }
        info!("Using existing image '{}' as light stemcell", image_id);
        return Ok(format!("{}{}", image_id, LIGHT_SUFFIX));
    }

    let opts = image_opts(cpi, properties);
    let image = cpi.images.create_image_from_tarball(&opts, image_path).await?;
    info!("Created stemcell image '{}' ({})", image.id, opts.name);
    Ok(image.id)
}

fn image_opts(cpi: &Cpi, properties: &StemcellCloudProperties) -> CreateImageOpts {
    let mut image_properties = HashMap::from([("version".to_string(), properties.version.clone())]);
    let optional = [
        ("os_type", properties.os_type.clone()),
        ("os_distro", properties.os_distro.clone()),
        ("architecture", properties.architecture.clone()),
        ("hypervisor_type", properties.hypervisor.clone()),
        ("auto_disk_config", properties.auto_disk_config.map(|v| v.to_string())),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            image_properties.insert(key.to_string(), value);
        }
    }

    CreateImageOpts {
        name: format!("{}/{}", properties.name, properties.version),
        disk_format: properties.disk_format.clone(),
        container_format: properties.container_format.clone(),
        visibility: if cpi.config.stemcell_public_visibility {
            "public".to_string()
        } else {
            "private".to_string()
        },
        properties: image_properties,
    }
}

pub async fn delete_stemcell(cpi: &Cpi, stemcell_cid: &str) -> Result<(), MethodError> {
    if stemcell_cid.ends_with(LIGHT_SUFFIX) {
        info!("SKIPPING: light stemcell '{}' does not own its image", stemcell_cid);
        return Ok(());
    }
    cpi.images.delete_image(stemcell_cid).await?;
    Ok(())
}
