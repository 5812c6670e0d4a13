//! `info`

use serde_json::{Value, json};

/// Highest CPI API version this plugin speaks
pub const API_VERSION: u32 = 2;

/// Stemcell formats accepted by `create_stemcell`
pub const STEMCELL_FORMATS: &[&str] = &["openstack-raw", "openstack-qcow2", "openstack-light"];

pub fn info() -> Value {
    json!({
        "api_version": API_VERSION,
        "stemcell_formats": STEMCELL_FORMATS,
    })
}
