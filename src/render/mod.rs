//! The install descriptor renderer (§4.4): turns a validated request,
//! profile, pull secret, and merged tags into a platform-specific
//! `install-config` document for the installer binary to consume.
//!
//! Deterministic: no timestamps, stable tag ordering (the `BTreeMap` the
//! policy engine hands back). One embedded `.yaml.tera` template per
//! platform, compiled once via `add_raw_template` rather than a directory
//! scan, since the template set never grows at runtime.

use serde::Serialize;
use tera::{Context, Tera};

use crate::clusters::Platform;
use crate::errors::{Error, Result};
use crate::profiles::Profile;

const AWS_TEMPLATE_NAME: &str = "install-config.aws.yaml.tera";
const AWS_TEMPLATE: &str = include_str!("templates/aws.yaml.tera");

const IBMCLOUD_TEMPLATE_NAME: &str = "install-config.ibmcloud.yaml.tera";
const IBMCLOUD_TEMPLATE: &str = include_str!("templates/ibmcloud.yaml.tera");

#[derive(Debug, Clone, Serialize)]
pub struct TagPair {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallDescriptorRequest {
    pub cluster_name: String,
    pub base_domain: String,
    pub region: String,
    pub version: String,
    pub ssh_public_key: Option<String>,
    pub pull_secret: String,
    /// Pre-sorted pairs straight from the policy engine's `BTreeMap`, so
    /// the rendered tag block has deterministic order regardless of how
    /// the template engine iterates.
    pub tags: Vec<TagPair>,
    pub control_plane_replicas: u32,
    pub control_plane_instance_type: String,
    pub worker_replicas: u32,
    pub worker_instance_type: String,
    /// Platform-specific extras straight from the profile document's
    /// `platformConfig` block (e.g. `vpcId`, `resourceGroup`).
    pub platform_config: serde_json::Value,
}

pub struct InstallDescriptorRenderer {
    tera: Tera,
}

impl InstallDescriptorRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(AWS_TEMPLATE_NAME, AWS_TEMPLATE)
            .map_err(|e| Error::Internal(format!("compiling {AWS_TEMPLATE_NAME}: {e}")))?;
        tera.add_raw_template(IBMCLOUD_TEMPLATE_NAME, IBMCLOUD_TEMPLATE)
            .map_err(|e| Error::Internal(format!("compiling {IBMCLOUD_TEMPLATE_NAME}: {e}")))?;
        Ok(Self { tera })
    }

    /// Renders `request` for `profile.platform`, then re-parses its own
    /// output as a structured YAML document to guarantee well-formedness.
    /// A parse failure here is a bug in the template, never a `Transient`
    /// or `Permanent` handler outcome — it can't be caused by anything the
    /// caller passed in once the request itself validated.
    pub fn render(&self, request: &InstallDescriptorRequest, profile: &Profile) -> Result<String> {
        let template_name = match profile.platform {
            Platform::Aws => AWS_TEMPLATE_NAME,
            Platform::IbmCloud => IBMCLOUD_TEMPLATE_NAME,
        };

        let context = Context::from_serialize(request)
            .map_err(|e| Error::Internal(format!("building template context: {e}")))?;

        let rendered = self
            .tera
            .render(template_name, &context)
            .map_err(|e| Error::Internal(format!("rendering {template_name}: {e}")))?;

        serde_yaml::from_str::<serde_yaml::Value>(&rendered)
            .map_err(|e| Error::Internal(format!("rendered install descriptor is not well-formed YAML: {e}")))?;

        Ok(rendered)
    }
}

impl Default for InstallDescriptorRenderer {
    fn default() -> Self {
        Self::new().expect("embedded install descriptor templates must compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::{
        Allowlist, ComputeConfig, ControlPlaneConfig, CostControls, FeaturesConfig,
        LifecycleConfig, TagsConfig, WorkersConfig,
    };
    use std::collections::{BTreeMap, HashMap};

    fn profile(platform: Platform) -> Profile {
        Profile {
            name: "standard".to_string(),
            display_name: "Standard".to_string(),
            description: String::new(),
            platform,
            enabled: true,
            openshift_versions: Allowlist { allowlist: vec!["4.15".to_string()], default: "4.15".to_string() },
            regions: Allowlist { allowlist: vec!["us-east-1".to_string()], default: "us-east-1".to_string() },
            base_domains: Allowlist { allowlist: vec!["example.com".to_string()], default: "example.com".to_string() },
            compute: ComputeConfig {
                control_plane: ControlPlaneConfig { replicas: 3, instance_type: "m5.xlarge".to_string(), schedulable: false },
                workers: WorkersConfig { replicas: 3, min_replicas: 1, max_replicas: 10, instance_type: "m5.large".to_string() },
            },
            lifecycle: LifecycleConfig { max_ttl_hours: 72, default_ttl_hours: 24, allow_custom_ttl: true, warn_before_destroy_hours: 2 },
            tags: TagsConfig { required: BTreeMap::new(), defaults: BTreeMap::new(), allow_user_tags: true },
            features: FeaturesConfig { off_hours_scaling: false, fips_mode: false, private_cluster: false },
            cost_controls: CostControls { estimated_hourly_cost: 1.5, max_monthly_cost: 1000.0 },
            platform_config: HashMap::new(),
        }
    }

    fn request() -> InstallDescriptorRequest {
        InstallDescriptorRequest {
            cluster_name: "demo-cluster".to_string(),
            base_domain: "example.com".to_string(),
            region: "us-east-1".to_string(),
            version: "4.15".to_string(),
            ssh_public_key: Some("ssh-ed25519 AAAA...".to_string()),
            pull_secret: "{\"auths\":{}}".to_string(),
            tags: vec![
                TagPair { key: "ClusterName".to_string(), value: "demo-cluster".to_string() },
                TagPair { key: "Owner".to_string(), value: "alice".to_string() },
            ],
            control_plane_replicas: 3,
            control_plane_instance_type: "m5.xlarge".to_string(),
            worker_replicas: 3,
            worker_instance_type: "m5.large".to_string(),
            platform_config: serde_json::json!({"vpcId": "vpc-123"}),
        }
    }

    #[test]
    fn aws_descriptor_renders_well_formed_yaml() {
        let renderer = InstallDescriptorRenderer::new().unwrap();
        let rendered = renderer.render(&request(), &profile(Platform::Aws)).unwrap();
        assert!(rendered.contains("demo-cluster"));
        let parsed: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        assert!(parsed.get("metadata").is_some());
    }

    #[test]
    fn ibmcloud_descriptor_renders_well_formed_yaml() {
        let renderer = InstallDescriptorRenderer::new().unwrap();
        let rendered = renderer.render(&request(), &profile(Platform::IbmCloud)).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        assert!(parsed.get("metadata").is_some());
    }

    #[test]
    fn rendering_is_deterministic() {
        let renderer = InstallDescriptorRenderer::new().unwrap();
        let a = renderer.render(&request(), &profile(Platform::Aws)).unwrap();
        let b = renderer.render(&request(), &profile(Platform::Aws)).unwrap();
        assert_eq!(a, b);
    }
}
