//! Device plugin configuration
//!
//! Tunables arrive as a YAML document under the `device-config.yaml` key of
//! a cluster config object. Loading happens exactly once at process start;
//! the resulting handle is threaded through to every consumer.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cluster::ConfigStore;
use crate::error::{SchedletError, SchedletResult};
use crate::unit::{CARD_RESOURCE_NAME, CORE_RESOURCE_NAME};

/// Key holding the YAML document inside the config object.
pub const DEVICE_CONFIG_KEY: &str = "device-config.yaml";
/// Config object consulted when the caller names none.
pub const DEFAULT_DEVICE_CONFIG_NAME: &str = "schedlet-device-config";

/// One slice shape of a multi-instance geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometrySlice {
    pub name: String,
    pub memory: i32,
    pub count: i32,
}

/// A full card partitioning: the slices it is cut into.
pub type Geometry = Vec<GeometrySlice>;

/// Geometries permitted for a set of card models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedGeometries {
    pub models: Vec<String>,
    #[serde(rename = "allowedGeometries")]
    pub geometries: Vec<Geometry>,
}

/// Allocator tunables for the accelerator resource family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    /// Resource counting physical cards on a node.
    pub resource_count_name: String,
    /// Resource carrying per-container core demand and node core capacity.
    pub resource_core_name: String,
    pub resource_memory_name: String,
    pub resource_memory_percentage_name: String,
    pub resource_priority_name: String,
    pub overwrite_env: bool,
    pub default_memory: i32,
    pub default_cores: i32,
    pub default_device_num: i32,
    pub device_split_count: u32,
    pub device_memory_scaling: f64,
    pub device_core_scaling: f64,
    pub disable_core_limit: bool,
    pub known_geometries: Vec<AllowedGeometries>,
    pub device_memory_factor: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            resource_count_name: CARD_RESOURCE_NAME.to_string(),
            resource_core_name: CORE_RESOURCE_NAME.to_string(),
            resource_memory_name: "accel.io/memory".to_string(),
            resource_memory_percentage_name: "accel.io/memory-percentage".to_string(),
            resource_priority_name: "accel.io/priority".to_string(),
            overwrite_env: false,
            default_memory: 0,
            default_cores: 0,
            default_device_num: 1,
            device_split_count: 10,
            device_memory_scaling: 1.0,
            device_core_scaling: 1.0,
            disable_core_limit: false,
            known_geometries: Vec::new(),
            device_memory_factor: 1,
        }
    }
}

impl DeviceConfig {
    /// Load from the cluster, falling back to the hardcoded defaults when
    /// the config object or key is absent or malformed. Called once by the
    /// owning process at startup.
    pub fn load(store: &dyn ConfigStore, name: &str) -> Self {
        let name = if name.is_empty() {
            DEFAULT_DEVICE_CONFIG_NAME
        } else {
            name
        };
        match Self::from_store(store, name) {
            Ok(config) => {
                info!(name = name, "Loaded device config");
                config
            }
            Err(e) => {
                warn!(name = name, error = %e, "Using default device config");
                Self::default()
            }
        }
    }

    fn from_store(store: &dyn ConfigStore, name: &str) -> SchedletResult<Self> {
        let data = store.get(name, DEVICE_CONFIG_KEY)?.ok_or_else(|| {
            SchedletError::Config(format!("{DEVICE_CONFIG_KEY} not found in {name}"))
        })?;
        Ok(serde_yaml::from_str(&data)?)
    }
}
