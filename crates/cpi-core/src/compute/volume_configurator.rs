//! Boot volume configuration

use crate::config::OpenstackConfig;
use crate::error::CpiError;
use crate::properties::CreateVmCloudProperties;
use openstack_client::{BlockDevice, Flavor};

/// Block devices for a server create request: empty when booting from the
/// image, else one boot volume created from the image.
pub fn configure_volumes(
    image_id: &str,
    config: &OpenstackConfig,
    cloud_properties: &CreateVmCloudProperties,
    flavor: &Flavor,
) -> Result<Vec<BlockDevice>, CpiError> {
    let size = boot_volume_size(cloud_properties, flavor)?;

    if !cloud_properties.boot_from_volume(config) {
        return Ok(Vec::new());
    }

    Ok(vec![BlockDevice {
        uuid: image_id.to_string(),
        source_type: "image".to_string(),
        destination_type: "volume".to_string(),
        boot_index: 0,
        delete_on_termination: true,
        volume_size: size,
    }])
}

fn boot_volume_size(cloud_properties: &CreateVmCloudProperties, flavor: &Flavor) -> Result<u64, CpiError> {
    if cloud_properties.root_disk.size > 0 {
        return Ok(cloud_properties.root_disk.size);
    }
    if flavor.disk > 0 {
        return Ok(flavor.disk);
    }
    Err(CpiError::Validation(format!(
        "flavor '{}' has a root disk size of 0, set 'root_disk.size' in the cloud properties",
        flavor.name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::RootDisk;
    use crate::test_utils::{flavor, openstack_config};

    #[test]
    fn test_boot_from_image_returns_no_devices() {
        let devices = configure_volumes(
            "image-1",
            &openstack_config(),
            &CreateVmCloudProperties::default(),
            &flavor("f", 1, 1024, 10, 0),
        )
        .unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn test_root_disk_overrides_flavor() {
        let props = CreateVmCloudProperties {
            boot_from_volume: Some(true),
            root_disk: RootDisk { size: 30 },
            ..Default::default()
        };
        let devices =
            configure_volumes("image-1", &openstack_config(), &props, &flavor("f", 1, 1024, 10, 0)).unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].volume_size, 30);
        assert_eq!(devices[0].uuid, "image-1");
        assert_eq!(devices[0].boot_index, 0);
        assert!(devices[0].delete_on_termination);
    }

    #[test]
    fn test_config_default_uses_flavor_disk() {
        let mut config = openstack_config();
        config.boot_from_volume = true;
        let devices = configure_volumes(
            "image-1",
            &config,
            &CreateVmCloudProperties::default(),
            &flavor("f", 1, 1024, 10, 0),
        )
        .unwrap();
        assert_eq!(devices[0].volume_size, 10);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let err = configure_volumes(
            "image-1",
            &openstack_config(),
            &CreateVmCloudProperties::default(),
            &flavor("f", 1, 1024, 0, 0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("root_disk.size"));
    }
}
