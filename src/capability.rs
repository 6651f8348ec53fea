use serde::{Deserialize, Serialize};

/// A class of sensitive action that guest code may be granted.
///
/// The enumeration is closed on purpose: every gating site matches it
/// exhaustively, so adding a capability forces each one to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityType {
    #[serde(rename = "fs:read")]
    FsRead,
    #[serde(rename = "fs:write")]
    FsWrite,
    #[serde(rename = "fs:delete")]
    FsDelete,
    #[serde(rename = "fs:list")]
    FsList,
    #[serde(rename = "net:http")]
    NetHttp,
    #[serde(rename = "net:https")]
    NetHttps,
    #[serde(rename = "net:websocket")]
    NetWebsocket,
    #[serde(rename = "net:any")]
    NetAny,
    #[serde(rename = "env:read")]
    EnvRead,
    #[serde(rename = "env:write")]
    EnvWrite,
    #[serde(rename = "memory:read")]
    MemoryRead,
    #[serde(rename = "memory:write")]
    MemoryWrite,
    #[serde(rename = "kv:read")]
    KvRead,
    #[serde(rename = "kv:write")]
    KvWrite,
    #[serde(rename = "sys:time")]
    SysTime,
    #[serde(rename = "sys:random")]
    SysRandom,
    #[serde(rename = "sys:process")]
    SysProcess,
    #[serde(rename = "ai:model-call")]
    AiModelCall,
    #[serde(rename = "ai:embedding")]
    AiEmbedding,
    #[serde(rename = "external:api")]
    ExternalApi,
    #[serde(rename = "external:webhook")]
    ExternalWebhook,
}

impl CapabilityType {
    /// All capabilities, in declaration order.
    pub const ALL: [CapabilityType; 21] = [
        Self::FsRead,
        Self::FsWrite,
        Self::FsDelete,
        Self::FsList,
        Self::NetHttp,
        Self::NetHttps,
        Self::NetWebsocket,
        Self::NetAny,
        Self::EnvRead,
        Self::EnvWrite,
        Self::MemoryRead,
        Self::MemoryWrite,
        Self::KvRead,
        Self::KvWrite,
        Self::SysTime,
        Self::SysRandom,
        Self::SysProcess,
        Self::AiModelCall,
        Self::AiEmbedding,
        Self::ExternalApi,
        Self::ExternalWebhook,
    ];

    /// The string name used in permission-set documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FsRead => "fs:read",
            Self::FsWrite => "fs:write",
            Self::FsDelete => "fs:delete",
            Self::FsList => "fs:list",
            Self::NetHttp => "net:http",
            Self::NetHttps => "net:https",
            Self::NetWebsocket => "net:websocket",
            Self::NetAny => "net:any",
            Self::EnvRead => "env:read",
            Self::EnvWrite => "env:write",
            Self::MemoryRead => "memory:read",
            Self::MemoryWrite => "memory:write",
            Self::KvRead => "kv:read",
            Self::KvWrite => "kv:write",
            Self::SysTime => "sys:time",
            Self::SysRandom => "sys:random",
            Self::SysProcess => "sys:process",
            Self::AiModelCall => "ai:model-call",
            Self::AiEmbedding => "ai:embedding",
            Self::ExternalApi => "external:api",
            Self::ExternalWebhook => "external:webhook",
        }
    }

    /// Parse a capability from its document name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declarative grant of a capability, optionally narrowed to a
/// resource pattern (exact string, `*` wildcard, or `/`-terminated prefix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "type")]
    pub capability: CapabilityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

impl Permission {
    pub fn new(capability: CapabilityType) -> Self {
        Self {
            capability,
            resource: None,
            reason: None,
            optional: false,
        }
    }

    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = Some(resource.to_string());
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Policy for capability requests that match no declared permission.
///
/// A deliberate escape hatch with a loud name: `AllowAll` turns every check
/// into a grant and must never be the silent default. Only the
/// `unrestricted` preset sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum UnlistedPolicy {
    #[default]
    Deny,
    AllowAll,
}

impl From<bool> for UnlistedPolicy {
    fn from(allow: bool) -> Self {
        if allow {
            Self::AllowAll
        } else {
            Self::Deny
        }
    }
}

impl From<UnlistedPolicy> for bool {
    fn from(policy: UnlistedPolicy) -> bool {
        policy == UnlistedPolicy::AllowAll
    }
}

/// The full authority of one sandbox: an ordered list of grants plus the
/// unlisted-request policy. Immutable once handed to a checker; changing a
/// sandbox's authority means constructing a new sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(rename = "allowUnlisted", default)]
    pub unlisted: UnlistedPolicy,
}

impl PermissionSet {
    pub fn new(permissions: Vec<Permission>) -> Self {
        Self {
            permissions,
            unlisted: UnlistedPolicy::Deny,
        }
    }

    /// Preset: system time and randomness only.
    pub fn minimal() -> Self {
        Self::new(vec![
            Permission::new(CapabilityType::SysTime),
            Permission::new(CapabilityType::SysRandom),
        ])
    }

    /// Preset: time, randomness, the key-value store, and https.
    pub fn standard() -> Self {
        Self::new(vec![
            Permission::new(CapabilityType::SysTime),
            Permission::new(CapabilityType::SysRandom),
            Permission::new(CapabilityType::KvRead),
            Permission::new(CapabilityType::KvWrite),
            Permission::new(CapabilityType::NetHttps),
        ])
    }

    /// Preset: no explicit grants, every request allowed via the unlisted
    /// policy. For trusted first-party modules only.
    pub fn unrestricted() -> Self {
        Self {
            permissions: Vec::new(),
            unlisted: UnlistedPolicy::AllowAll,
        }
    }

    /// Resolve a preset by name: `minimal`, `standard` or `unrestricted`.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "minimal" => Some(Self::minimal()),
            "standard" => Some(Self::standard()),
            "unrestricted" => Some(Self::unrestricted()),
            _ => None,
        }
    }
}

/// Outcome of a single permission check. Absence of a grant is a normal,
/// reportable outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionCheckResult {
    pub granted: bool,
    pub reason: Option<String>,
    /// The permission that matched, or the synthesized grant when the
    /// unlisted policy allowed the request. `None` on denial.
    pub permission: Option<Permission>,
}

/// Identity of the plugin a sandbox hosts. Set once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxMetadata {
    #[serde(rename = "pluginId")]
    pub plugin_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SandboxMetadata {
    pub fn new(plugin_id: &str, name: &str) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            name: name.to_string(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_names_round_trip() {
        for cap in CapabilityType::ALL {
            assert_eq!(CapabilityType::parse(cap.as_str()), Some(cap));
        }
        assert_eq!(CapabilityType::parse("fs:chmod"), None);
    }

    #[test]
    fn permission_set_deserializes_document_form() {
        let set: PermissionSet = serde_json::from_str(
            r#"{
                "permissions": [
                    {"type": "kv:read"},
                    {"type": "net:https", "resource": "*.example.com"}
                ],
                "allowUnlisted": false
            }"#,
        )
        .unwrap();
        assert_eq!(set.permissions.len(), 2);
        assert_eq!(set.permissions[0].capability, CapabilityType::KvRead);
        assert_eq!(
            set.permissions[1].resource.as_deref(),
            Some("*.example.com")
        );
        assert_eq!(set.unlisted, UnlistedPolicy::Deny);
    }

    #[test]
    fn unlisted_policy_defaults_to_deny() {
        let set: PermissionSet = serde_json::from_str(r#"{"permissions": []}"#).unwrap();
        assert_eq!(set.unlisted, UnlistedPolicy::Deny);
        assert_eq!(PermissionSet::default().unlisted, UnlistedPolicy::Deny);
    }

    #[test]
    fn presets_resolve_by_name() {
        assert_eq!(PermissionSet::preset("minimal"), Some(PermissionSet::minimal()));
        assert_eq!(PermissionSet::preset("standard"), Some(PermissionSet::standard()));
        assert_eq!(
            PermissionSet::preset("unrestricted"),
            Some(PermissionSet::unrestricted())
        );
        assert_eq!(PermissionSet::preset("everything"), None);
    }
}
