//! The policy engine (§4.3): a pure validator over a request and a profile.
//!
//! `validate` never reads the clock or the database — `now` and `profile`
//! are both passed in, so it is callable from tests with no time mocking
//! and no fixtures beyond a [`Profile`] value.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::clusters::Platform;
use crate::common::ClusterId;
use crate::profiles::Profile;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").unwrap())
}

/// Tag keys the engine always stamps itself; rejected outright if a caller
/// attempts to set them (§4.3).
pub const RESERVED_TAG_KEYS: &[&str] = &[
    "ManagedBy",
    "ClusterId",
    "ClusterName",
    "Owner",
    "Team",
    "CostCenter",
    "Environment",
    "TTLExpiry",
    "RequestId",
    "Profile",
    "Platform",
];

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub name: String,
    pub platform: Platform,
    pub version: String,
    pub region: String,
    pub base_domain: String,
    pub owner: String,
    pub team: Option<String>,
    pub cost_center: Option<String>,
    pub requested_by: String,
    pub request_id: String,
    /// `None` means "use the profile default".
    pub ttl_hours: Option<i32>,
    pub offhours_opt_in: bool,
    pub user_tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self { field: field.to_string(), message: message.into() }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyResult {
    pub ok: bool,
    pub violations: Vec<Violation>,
    pub merged_tags: BTreeMap<String, String>,
    pub destroy_at: Option<DateTime<Utc>>,
}

/// Validates `request` against `profile` as of `now`. Never short-circuits:
/// every check in §4.3 runs, so callers get the full violation list in one
/// pass rather than one-at-a-time.
pub fn validate(
    request: &ProvisionRequest,
    profile: &Profile,
    cluster_id: ClusterId,
    now: DateTime<Utc>,
) -> PolicyResult {
    let mut violations = Vec::new();

    if !name_pattern().is_match(&request.name) {
        violations.push(Violation::new(
            "name",
            "must be DNS-compatible: lowercase alphanumerics and hyphens, 1-63 chars, no leading/trailing hyphen",
        ));
    }

    if request.platform != profile.platform {
        violations.push(Violation::new(
            "platform",
            format!("request platform {} does not match profile platform {}", request.platform, profile.platform),
        ));
    }

    if !profile.openshift_versions.contains(&request.version) {
        violations.push(Violation::new("version", format!("{} is not in the profile's version allowlist", request.version)));
    }

    if !profile.regions.contains(&request.region) {
        violations.push(Violation::new("region", format!("{} is not in the profile's region allowlist", request.region)));
    }

    if !profile.base_domains.contains(&request.base_domain) {
        violations.push(Violation::new("base_domain", format!("{} is not in the profile's base domain allowlist", request.base_domain)));
    }

    let ttl_hours = request.ttl_hours.unwrap_or(profile.lifecycle.default_ttl_hours as i32);
    if ttl_hours <= 0 || ttl_hours > profile.lifecycle.max_ttl_hours as i32 {
        violations.push(Violation::new(
            "ttl_hours",
            format!("must be in (0, {}], got {ttl_hours}", profile.lifecycle.max_ttl_hours),
        ));
    } else if request.ttl_hours.is_some()
        && !profile.lifecycle.allow_custom_ttl
        && ttl_hours != profile.lifecycle.default_ttl_hours as i32
    {
        violations.push(Violation::new(
            "ttl_hours",
            format!("profile forbids a custom TTL; must equal the default of {}", profile.lifecycle.default_ttl_hours),
        ));
    }

    if request.offhours_opt_in && !profile.features.off_hours_scaling {
        violations.push(Violation::new("offhours_opt_in", "profile does not enable off-hours scaling"));
    }

    if !request.user_tags.is_empty() && !profile.tags.allow_user_tags {
        violations.push(Violation::new("user_tags", "profile does not allow user-supplied tags"));
    }
    for key in request.user_tags.keys() {
        if RESERVED_TAG_KEYS.contains(&key.as_str()) {
            violations.push(Violation::new("user_tags", format!("\"{key}\" is a reserved tag key")));
        }
    }

    if !violations.is_empty() {
        return PolicyResult { ok: false, violations, merged_tags: BTreeMap::new(), destroy_at: None };
    }

    // Merge order (§4.3): profile defaults -> profile required (override
    // defaults) -> user extras (non-reserved only) -> system-stamped
    // reserved keys (override all).
    let mut merged_tags = BTreeMap::new();
    merged_tags.extend(profile.tags.defaults.clone());
    merged_tags.extend(profile.tags.required.clone());
    if profile.tags.allow_user_tags {
        for (key, value) in &request.user_tags {
            if !RESERVED_TAG_KEYS.contains(&key.as_str()) {
                merged_tags.insert(key.clone(), value.clone());
            }
        }
    }

    let destroy_at = now + chrono::Duration::hours(ttl_hours as i64);

    merged_tags.insert("ManagedBy".to_string(), "cluster-control-plane".to_string());
    merged_tags.insert("ClusterId".to_string(), cluster_id.to_string());
    merged_tags.insert("ClusterName".to_string(), request.name.clone());
    merged_tags.insert("Owner".to_string(), request.owner.clone());
    // Stamped unconditionally (§8 "effective_tags ... contains all reserved
    // keys"): an absent team/cost center still gets the reserved key, empty
    // rather than omitted.
    merged_tags.insert("Team".to_string(), request.team.clone().unwrap_or_default());
    merged_tags.insert("CostCenter".to_string(), request.cost_center.clone().unwrap_or_default());
    merged_tags.insert("Environment".to_string(), profile.name.clone());
    merged_tags.insert("TTLExpiry".to_string(), destroy_at.to_rfc3339());
    merged_tags.insert("RequestId".to_string(), request.request_id.clone());
    merged_tags.insert("Profile".to_string(), profile.name.clone());
    merged_tags.insert("Platform".to_string(), request.platform.as_str().to_string());

    PolicyResult { ok: true, violations, merged_tags, destroy_at: Some(destroy_at) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::{
        Allowlist, ComputeConfig, ControlPlaneConfig, CostControls, FeaturesConfig,
        LifecycleConfig, TagsConfig, WorkersConfig,
    };
    use std::collections::HashMap;

    fn profile() -> Profile {
        Profile {
            name: "standard-aws".to_string(),
            display_name: "Standard AWS".to_string(),
            description: String::new(),
            platform: Platform::Aws,
            enabled: true,
            openshift_versions: Allowlist { allowlist: vec!["4.15".to_string()], default: "4.15".to_string() },
            regions: Allowlist { allowlist: vec!["us-east-1".to_string()], default: "us-east-1".to_string() },
            base_domains: Allowlist { allowlist: vec!["example.com".to_string()], default: "example.com".to_string() },
            compute: ComputeConfig {
                control_plane: ControlPlaneConfig { replicas: 3, instance_type: "m5.xlarge".to_string(), schedulable: false },
                workers: WorkersConfig { replicas: 3, min_replicas: 1, max_replicas: 10, instance_type: "m5.large".to_string() },
            },
            lifecycle: LifecycleConfig { max_ttl_hours: 72, default_ttl_hours: 24, allow_custom_ttl: true, warn_before_destroy_hours: 2 },
            tags: TagsConfig {
                required: BTreeMap::from([("team-tier".to_string(), "gold".to_string())]),
                defaults: BTreeMap::from([("backup".to_string(), "daily".to_string())]),
                allow_user_tags: true,
            },
            features: FeaturesConfig { off_hours_scaling: true, fips_mode: false, private_cluster: false },
            cost_controls: CostControls { estimated_hourly_cost: 1.5, max_monthly_cost: 1000.0 },
            platform_config: HashMap::from([("aws".to_string(), serde_json::json!({"vpcId": "vpc-123"}))]),
        }
    }

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            name: "demo-cluster".to_string(),
            platform: Platform::Aws,
            version: "4.15".to_string(),
            region: "us-east-1".to_string(),
            base_domain: "example.com".to_string(),
            owner: "alice".to_string(),
            team: Some("platform".to_string()),
            cost_center: None,
            requested_by: "alice".to_string(),
            request_id: "req-1".to_string(),
            ttl_hours: None,
            offhours_opt_in: false,
            user_tags: BTreeMap::new(),
        }
    }

    #[test]
    fn valid_request_merges_tags_and_computes_destroy_at() {
        let now = Utc::now();
        let result = validate(&request(), &profile(), ClusterId::new(), now);
        assert!(result.ok, "{:?}", result.violations);
        assert_eq!(result.merged_tags.get("backup").map(String::as_str), Some("daily"));
        assert_eq!(result.merged_tags.get("team-tier").map(String::as_str), Some("gold"));
        assert_eq!(result.merged_tags.get("Owner").map(String::as_str), Some("alice"));
        assert_eq!(result.destroy_at, Some(now + chrono::Duration::hours(24)));
    }

    #[test]
    fn reserved_tag_key_is_rejected() {
        let mut req = request();
        req.user_tags.insert("Owner".to_string(), "mallory".to_string());
        let result = validate(&req, &profile(), ClusterId::new(), Utc::now());
        assert!(!result.ok);
        assert!(result.violations.iter().any(|v| v.field == "user_tags"));
    }

    #[test]
    fn invalid_name_is_rejected() {
        let mut req = request();
        req.name = "Not_Valid!".to_string();
        let result = validate(&req, &profile(), ClusterId::new(), Utc::now());
        assert!(!result.ok);
        assert!(result.violations.iter().any(|v| v.field == "name"));
    }

    #[test]
    fn custom_ttl_rejected_when_profile_forbids_override() {
        let mut p = profile();
        p.lifecycle.allow_custom_ttl = false;
        let mut req = request();
        req.ttl_hours = Some(48);
        let result = validate(&req, &p, ClusterId::new(), Utc::now());
        assert!(!result.ok);
        assert!(result.violations.iter().any(|v| v.field == "ttl_hours"));
    }

    #[test]
    fn ttl_exceeding_max_is_rejected() {
        let mut req = request();
        req.ttl_hours = Some(999);
        let result = validate(&req, &profile(), ClusterId::new(), Utc::now());
        assert!(!result.ok);
        assert!(result.violations.iter().any(|v| v.field == "ttl_hours"));
    }

    #[test]
    fn offhours_opt_in_requires_feature_enabled() {
        let mut p = profile();
        p.features.off_hours_scaling = false;
        let mut req = request();
        req.offhours_opt_in = true;
        let result = validate(&req, &p, ClusterId::new(), Utc::now());
        assert!(!result.ok);
        assert!(result.violations.iter().any(|v| v.field == "offhours_opt_in"));
    }
}
