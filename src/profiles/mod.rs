//! The profile registry (§4.2): loads declarative profile documents from a
//! directory, validates them, and caches them by name.

mod model;

pub use model::{
    Allowlist, ComputeConfig, ControlPlaneConfig, CostControls, FeaturesConfig, LifecycleConfig,
    Profile, TagsConfig, WorkersConfig,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::clusters::Platform;
use crate::errors::{Error, Result};

/// Loads and validates every `*.yaml`/`*.yml` file in `dir`, in one pass.
/// One bad document fails the whole load — the registry never serves a
/// partially-loaded set (§4.2: "one bad profile fails the load").
pub fn load_all(dir: &Path) -> Result<HashMap<String, Arc<Profile>>> {
    let mut violations = Vec::new();
    let mut profiles = HashMap::new();

    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::Internal(format!("reading profile directory {}: {e}", dir.display())))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml")))
        .collect();
    paths.sort();

    for path in paths {
        let file_name = path.display().to_string();
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                violations.push(format!("{file_name}: failed to read: {e}"));
                continue;
            }
        };

        let profile: Profile = match serde_yaml::from_str(&contents) {
            Ok(p) => p,
            Err(e) => {
                violations.push(format!("{file_name}: parse error: {e}"));
                continue;
            }
        };

        match validate_semantics(&profile) {
            Ok(()) => {
                profiles.insert(profile.name.clone(), Arc::new(profile));
            }
            Err(errs) => {
                for err in errs {
                    violations.push(format!("{file_name}: {err}"));
                }
            }
        }
    }

    if !violations.is_empty() {
        return Err(Error::InvalidArgument(violations.join("; ")));
    }

    Ok(profiles)
}

/// Structural + semantic validation beyond what serde's required fields
/// already enforce (§4.2): odd control-plane replicas, defaults within
/// their own allowlists, the platform-config key matching the platform,
/// worker replica bounds.
fn validate_semantics(profile: &Profile) -> std::result::Result<(), Vec<String>> {
    let mut errs = Vec::new();

    if profile.compute.control_plane.replicas % 2 == 0 {
        errs.push(format!(
            "compute.controlPlane.replicas must be odd for quorum, got {}",
            profile.compute.control_plane.replicas
        ));
    }

    if !profile.openshift_versions.contains(&profile.openshift_versions.default) {
        errs.push("openshiftVersions.default is not in its own allowlist".to_string());
    }
    if !profile.regions.contains(&profile.regions.default) {
        errs.push("regions.default is not in its own allowlist".to_string());
    }
    if !profile.base_domains.contains(&profile.base_domains.default) {
        errs.push("baseDomains.default is not in its own allowlist".to_string());
    }

    let workers = &profile.compute.workers;
    if workers.min_replicas > workers.max_replicas {
        errs.push(format!(
            "compute.workers.minReplicas ({}) exceeds maxReplicas ({})",
            workers.min_replicas, workers.max_replicas
        ));
    } else if workers.replicas < workers.min_replicas || workers.replicas > workers.max_replicas {
        errs.push(format!(
            "compute.workers.replicas ({}) outside [{}, {}]",
            workers.replicas, workers.min_replicas, workers.max_replicas
        ));
    }

    if profile.lifecycle.default_ttl_hours > profile.lifecycle.max_ttl_hours {
        errs.push("lifecycle.defaultTTLHours exceeds lifecycle.maxTTLHours".to_string());
    }

    let expected_key = profile.platform.as_str();
    let present_keys: Vec<&str> = profile.platform_config.keys().map(String::as_str).collect();
    if !present_keys.contains(&expected_key) {
        errs.push(format!("platformConfig missing \"{expected_key}\" block for platform {expected_key}"));
    }
    for key in present_keys {
        if key != expected_key {
            errs.push(format!("platformConfig has unexpected \"{key}\" block for platform {expected_key}"));
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}

/// Read-mostly cache over the loaded profile set. Cheap to clone (an `Arc`
/// around the lock), so one instance is constructed at startup and shared
/// with the policy engine and the create/destroy handlers.
#[derive(Clone)]
pub struct ProfileRegistry {
    dir: PathBuf,
    profiles: Arc<RwLock<HashMap<String, Arc<Profile>>>>,
}

impl ProfileRegistry {
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let profiles = load_all(&dir)?;
        Ok(Self {
            dir,
            profiles: Arc::new(RwLock::new(profiles)),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Profile>> {
        self.profiles.read().unwrap().get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.profiles.read().unwrap().contains_key(name)
    }

    pub fn list(&self) -> Vec<Arc<Profile>> {
        let mut out: Vec<_> = self.profiles.read().unwrap().values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn list_by_platform(&self, platform: Platform) -> Vec<Arc<Profile>> {
        self.list().into_iter().filter(|p| p.platform == platform).collect()
    }

    /// Re-reads every file under `dir`, then atomically swaps the whole map
    /// in — readers never observe a partially-reloaded set. On failure the
    /// previously-loaded map is left untouched.
    pub fn reload(&self) -> Result<()> {
        let fresh = load_all(&self.dir)?;
        *self.profiles.write().unwrap() = fresh;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile(name: &str, cp_replicas: u32) -> Profile {
        Profile {
            name: name.to_string(),
            display_name: "Sample".to_string(),
            description: String::new(),
            platform: Platform::Aws,
            enabled: true,
            openshift_versions: Allowlist { allowlist: vec!["4.15".to_string()], default: "4.15".to_string() },
            regions: Allowlist { allowlist: vec!["us-east-1".to_string()], default: "us-east-1".to_string() },
            base_domains: Allowlist { allowlist: vec!["example.com".to_string()], default: "example.com".to_string() },
            compute: ComputeConfig {
                control_plane: ControlPlaneConfig { replicas: cp_replicas, instance_type: "m5.xlarge".to_string(), schedulable: false },
                workers: WorkersConfig { replicas: 3, min_replicas: 1, max_replicas: 10, instance_type: "m5.large".to_string() },
            },
            lifecycle: LifecycleConfig { max_ttl_hours: 72, default_ttl_hours: 24, allow_custom_ttl: true, warn_before_destroy_hours: 2 },
            tags: TagsConfig { required: Default::default(), defaults: Default::default(), allow_user_tags: true },
            features: FeaturesConfig { off_hours_scaling: false, fips_mode: false, private_cluster: false },
            cost_controls: CostControls { estimated_hourly_cost: 1.5, max_monthly_cost: 1000.0 },
            platform_config: HashMap::from([("aws".to_string(), serde_json::json!({"vpcId": "vpc-123"}))]),
        }
    }

    #[test]
    fn even_control_plane_replicas_rejected() {
        let profile = sample_profile("demo", 2);
        let errs = validate_semantics(&profile).unwrap_err();
        assert!(errs.iter().any(|e| e.contains("odd")));
    }

    #[test]
    fn valid_profile_passes() {
        let profile = sample_profile("demo", 3);
        assert!(validate_semantics(&profile).is_ok());
    }

    #[test]
    fn mismatched_platform_config_key_rejected() {
        let mut profile = sample_profile("demo", 3);
        profile.platform_config = HashMap::from([("ibmcloud".to_string(), serde_json::json!({}))]);
        let errs = validate_semantics(&profile).unwrap_err();
        assert!(errs.iter().any(|e| e.contains("platformConfig")));
    }
}
