use crate::capability::{
    CapabilityType, Permission, PermissionCheckResult, PermissionSet, UnlistedPolicy,
};
use regex::Regex;
use serde_json::Value;

/// A resource-matching rule. Returns `Some(matched)` when the rule applies
/// to this pattern, `None` to fall through to the next rule.
type Matcher = fn(pattern: &str, resource: &str) -> Option<bool>;

/// Ordered matching rules: exact equality, then wildcard, then prefix.
/// The first applicable rule decides. A pattern is only treated as a
/// wildcard when it contains `*`, and only as a prefix when it lacks `*`
/// and ends in `/`.
const MATCHERS: [Matcher; 3] = [match_exact, match_wildcard, match_prefix];

fn match_exact(pattern: &str, resource: &str) -> Option<bool> {
    if pattern == resource {
        Some(true)
    } else {
        None
    }
}

fn match_wildcard(pattern: &str, resource: &str) -> Option<bool> {
    if !pattern.contains('*') {
        return None;
    }
    // Escape everything, then turn the escaped `*` back into `.*` and
    // anchor for a full-string match.
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    match Regex::new(&format!("^{}$", escaped)) {
        Ok(re) => Some(re.is_match(resource)),
        Err(_) => Some(false),
    }
}

fn match_prefix(pattern: &str, resource: &str) -> Option<bool> {
    if pattern.ends_with('/') {
        Some(resource.starts_with(pattern))
    } else {
        None
    }
}

fn resource_matches(pattern: &str, resource: &str) -> bool {
    for matcher in MATCHERS {
        if let Some(matched) = matcher(pattern, resource) {
            return matched;
        }
    }
    false
}

/// Evaluates capability requests against an immutable [`PermissionSet`].
///
/// Stateless aside from the set it was built with; `check` never errors —
/// a missing grant is a reportable outcome, not a failure.
#[derive(Debug, Clone)]
pub struct PermissionChecker {
    set: PermissionSet,
}

impl PermissionChecker {
    pub fn new(set: PermissionSet) -> Self {
        Self { set }
    }

    /// Build a checker from a named preset (`minimal`, `standard`,
    /// `unrestricted`).
    pub fn from_preset(name: &str) -> Option<Self> {
        PermissionSet::preset(name).map(Self::new)
    }

    pub fn permission_set(&self) -> &PermissionSet {
        &self.set
    }

    /// Check whether `capability` (optionally narrowed to `resource`) is
    /// authorized.
    ///
    /// Grants without a resource pattern match any request. Grants with a
    /// pattern require the request to carry a resource and to satisfy the
    /// pattern under the ordered matching rules.
    pub fn check(
        &self,
        capability: CapabilityType,
        resource: Option<&str>,
    ) -> PermissionCheckResult {
        for permission in &self.set.permissions {
            if permission.capability != capability {
                continue;
            }
            let matched = match (&permission.resource, resource) {
                (None, _) => true,
                (Some(pattern), Some(requested)) => resource_matches(pattern, requested),
                (Some(_), None) => false,
            };
            if matched {
                return PermissionCheckResult {
                    granted: true,
                    reason: permission.reason.clone(),
                    permission: Some(permission.clone()),
                };
            }
        }

        if self.set.unlisted == UnlistedPolicy::AllowAll {
            return PermissionCheckResult {
                granted: true,
                reason: Some("allowed via unlisted flag".to_string()),
                permission: Some(
                    Permission::new(capability).with_reason("allowed via unlisted flag"),
                ),
            };
        }

        let reason = match resource {
            Some(r) => format!("no permission grants {} for resource '{}'", capability, r),
            None => format!("no permission grants {}", capability),
        };
        PermissionCheckResult {
            granted: false,
            reason: Some(reason),
            permission: None,
        }
    }

    /// Check a batch of requests, preserving order.
    pub fn check_multiple(
        &self,
        requests: &[(CapabilityType, Option<&str>)],
    ) -> Vec<PermissionCheckResult> {
        requests
            .iter()
            .map(|(capability, resource)| self.check(*capability, *resource))
            .collect()
    }

    /// True iff every request in the batch is granted.
    pub fn check_all(&self, requests: &[(CapabilityType, Option<&str>)]) -> bool {
        requests
            .iter()
            .all(|(capability, resource)| self.check(*capability, *resource).granted)
    }

    /// True iff at least one request in the batch is granted.
    pub fn check_any(&self, requests: &[(CapabilityType, Option<&str>)]) -> bool {
        requests
            .iter()
            .any(|(capability, resource)| self.check(*capability, *resource).granted)
    }
}

/// Result of validating a raw permission-set document.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Structural validation of permission-set documents before they are
/// deserialized into the typed model.
///
/// Advisory: callers decide whether to reject construction on an invalid
/// document; [`PermissionChecker`] itself assumes validated input.
pub struct PermissionValidator;

impl PermissionValidator {
    pub fn validate(doc: &Value) -> ValidationReport {
        let mut errors = Vec::new();

        let Some(permissions) = doc.get("permissions").and_then(Value::as_array) else {
            return ValidationReport {
                valid: false,
                errors: vec!["permissions must be an array".to_string()],
            };
        };

        for (index, entry) in permissions.iter().enumerate() {
            match entry.get("type").and_then(Value::as_str) {
                None | Some("") => {
                    errors.push(format!("Permission at index {} missing type", index));
                }
                Some(name) => {
                    if CapabilityType::parse(name).is_none() {
                        errors.push(format!(
                            "Permission at index {} has invalid type: {}",
                            index, name
                        ));
                    }
                }
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checker_with(permissions: Vec<Permission>) -> PermissionChecker {
        PermissionChecker::new(PermissionSet::new(permissions))
    }

    #[test]
    fn denies_by_default() {
        let checker = checker_with(vec![Permission::new(CapabilityType::SysTime)]);
        let result = checker.check(CapabilityType::FsRead, Some("/etc/passwd"));
        assert!(!result.granted);
        let reason = result.reason.unwrap();
        assert!(reason.contains("fs:read"));
        assert!(reason.contains("/etc/passwd"));
        assert!(result.permission.is_none());
    }

    #[test]
    fn resourceless_grant_matches_any_resource() {
        let checker = checker_with(vec![Permission::new(CapabilityType::KvRead)]);
        assert!(checker.check(CapabilityType::KvRead, None).granted);
        assert!(checker.check(CapabilityType::KvRead, Some("anything")).granted);
    }

    #[test]
    fn resourced_grant_requires_a_resource() {
        let checker = checker_with(vec![
            Permission::new(CapabilityType::FsRead).with_resource("/app/data/"),
        ]);
        assert!(!checker.check(CapabilityType::FsRead, None).granted);
    }

    #[test]
    fn exact_resource_match() {
        let checker = checker_with(vec![
            Permission::new(CapabilityType::FsRead).with_resource("/app/config.json"),
        ]);
        assert!(checker.check(CapabilityType::FsRead, Some("/app/config.json")).granted);
        assert!(!checker.check(CapabilityType::FsRead, Some("/app/config.yaml")).granted);
    }

    #[test]
    fn wildcard_matches_subdomains_but_not_bare_domain() {
        let checker = checker_with(vec![
            Permission::new(CapabilityType::NetHttps).with_resource("*.example.com"),
        ]);
        assert!(checker.check(CapabilityType::NetHttps, Some("api.example.com")).granted);
        assert!(checker.check(CapabilityType::NetHttps, Some("cdn.example.com")).granted);
        assert!(!checker.check(CapabilityType::NetHttps, Some("example.com")).granted);
        assert!(!checker.check(CapabilityType::NetHttps, Some("example.org")).granted);
    }

    #[test]
    fn wildcard_escapes_regex_metacharacters() {
        let checker = checker_with(vec![
            Permission::new(CapabilityType::NetHttps).with_resource("*.example.com"),
        ]);
        // The dot in the pattern is literal, not "any character".
        assert!(!checker.check(CapabilityType::NetHttps, Some("apiXexampleXcom")).granted);
    }

    #[test]
    fn prefix_matches_nested_paths() {
        let checker = checker_with(vec![
            Permission::new(CapabilityType::FsRead).with_resource("/app/data/"),
        ]);
        assert!(checker.check(CapabilityType::FsRead, Some("/app/data/config.json")).granted);
        assert!(
            checker
                .check(CapabilityType::FsRead, Some("/app/data/secrets/key.txt"))
                .granted
        );
        assert!(!checker.check(CapabilityType::FsRead, Some("/etc/passwd")).granted);
    }

    #[test]
    fn wildcard_rule_decides_even_when_pattern_ends_in_slash() {
        // Contains `*` so the wildcard rule applies and the prefix rule is
        // never consulted.
        let checker = checker_with(vec![
            Permission::new(CapabilityType::FsRead).with_resource("/app/*/"),
        ]);
        assert!(checker.check(CapabilityType::FsRead, Some("/app/data/")).granted);
        assert!(!checker.check(CapabilityType::FsRead, Some("/app/data/file")).granted);
    }

    #[test]
    fn unlisted_allow_all_grants_everything() {
        let checker = PermissionChecker::new(PermissionSet::unrestricted());
        for capability in CapabilityType::ALL {
            let result = checker.check(capability, Some("anything"));
            assert!(result.granted, "{} should be granted", capability);
        }
        let result = checker.check(CapabilityType::SysProcess, None);
        assert_eq!(result.reason.as_deref(), Some("allowed via unlisted flag"));
        assert!(result.permission.is_some());
    }

    #[test]
    fn check_all_and_check_any() {
        let checker = checker_with(vec![
            Permission::new(CapabilityType::SysTime),
            Permission::new(CapabilityType::KvRead),
        ]);
        assert!(checker.check_all(&[
            (CapabilityType::SysTime, None),
            (CapabilityType::KvRead, None),
        ]));
        assert!(!checker.check_all(&[
            (CapabilityType::SysTime, None),
            (CapabilityType::FsWrite, None),
        ]));
        assert!(checker.check_any(&[
            (CapabilityType::FsWrite, None),
            (CapabilityType::KvRead, None),
        ]));
        assert!(!checker.check_any(&[
            (CapabilityType::FsWrite, None),
            (CapabilityType::EnvWrite, None),
        ]));
    }

    #[test]
    fn check_multiple_preserves_order() {
        let checker = checker_with(vec![Permission::new(CapabilityType::SysTime)]);
        let results = checker.check_multiple(&[
            (CapabilityType::SysTime, None),
            (CapabilityType::FsRead, None),
            (CapabilityType::SysTime, None),
        ]);
        assert_eq!(results.len(), 3);
        assert!(results[0].granted);
        assert!(!results[1].granted);
        assert!(results[2].granted);
    }

    #[test]
    fn preset_minimal() {
        let checker = PermissionChecker::from_preset("minimal").unwrap();
        assert!(checker.check(CapabilityType::SysTime, None).granted);
        assert!(checker.check(CapabilityType::SysRandom, None).granted);
        assert!(!checker.check(CapabilityType::KvRead, None).granted);
    }

    #[test]
    fn preset_standard() {
        let checker = PermissionChecker::from_preset("standard").unwrap();
        assert!(checker.check(CapabilityType::KvRead, None).granted);
        assert!(checker.check(CapabilityType::KvWrite, None).granted);
        assert!(checker.check(CapabilityType::NetHttps, Some("api.example.com")).granted);
        assert!(!checker.check(CapabilityType::FsWrite, None).granted);
    }

    #[test]
    fn validator_rejects_non_array_permissions() {
        let report = PermissionValidator::validate(&json!({ "permissions": "all" }));
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["permissions must be an array"]);

        let report = PermissionValidator::validate(&json!({}));
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["permissions must be an array"]);
    }

    #[test]
    fn validator_flags_missing_and_invalid_types() {
        let report = PermissionValidator::validate(&json!({
            "permissions": [
                {},
                { "type": "kv:read" },
                { "type": "fs:chmod" },
                { "type": "" }
            ],
            "allowUnlisted": false
        }));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[0].contains("index 0 missing type"));
        assert!(report.errors[1].contains("index 2 has invalid type: fs:chmod"));
        assert!(report.errors[2].contains("index 3 missing type"));
    }

    #[test]
    fn validator_accepts_well_formed_set() {
        let report = PermissionValidator::validate(&json!({
            "permissions": [
                { "type": "sys:time" },
                { "type": "net:https", "resource": "*.example.com" }
            ]
        }));
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }
}
