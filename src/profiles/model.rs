//! The profile document shape (§4.2, §6): one YAML file per profile.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::clusters::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allowlist<T> {
    pub allowlist: Vec<T>,
    pub default: T,
}

impl<T: PartialEq> Allowlist<T> {
    pub fn contains(&self, value: &T) -> bool {
        self.allowlist.iter().any(|v| v == value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfig {
    pub replicas: u32,
    pub instance_type: String,
    pub schedulable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkersConfig {
    pub replicas: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub instance_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeConfig {
    pub control_plane: ControlPlaneConfig,
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleConfig {
    pub max_ttl_hours: u32,
    pub default_ttl_hours: u32,
    pub allow_custom_ttl: bool,
    pub warn_before_destroy_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsConfig {
    #[serde(default)]
    pub required: BTreeMap<String, String>,
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    pub allow_user_tags: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesConfig {
    #[serde(default)]
    pub off_hours_scaling: bool,
    #[serde(default)]
    pub fips_mode: bool,
    #[serde(default)]
    pub private_cluster: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostControls {
    pub estimated_hourly_cost: f64,
    pub max_monthly_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub platform: Platform,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub openshift_versions: Allowlist<String>,
    pub regions: Allowlist<String>,
    pub base_domains: Allowlist<String>,
    pub compute: ComputeConfig,
    pub lifecycle: LifecycleConfig,
    pub tags: TagsConfig,
    pub features: FeaturesConfig,
    pub cost_controls: CostControls,
    /// Keyed by platform name (`"aws"`, `"ibmcloud"`); exactly the key
    /// matching `platform` must be present (§4.2 semantic validation).
    #[serde(default)]
    pub platform_config: HashMap<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}
