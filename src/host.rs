use crate::capability::{CapabilityType, SandboxMetadata};
use crate::checker::PermissionChecker;
use crate::error::{SandboxError, SandboxResult};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Key prefix that partitions the scratch-memory namespace inside the
/// same physical map as the plain key-value namespace.
const SCRATCH_PREFIX: &str = "__mem:";

/// Hard cap on a single random-bytes request (1 MiB). Enforced before any
/// bytes are generated.
pub const MAX_RANDOM_BYTES: usize = 1024 * 1024;

/// The key-value store owned by exactly one sandbox. Cleared on reset,
/// dropped on dispose.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        self.entries.lock().unwrap().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The host-call table handed to the execution engine: the only channel
/// through which guest code touches host resources.
///
/// Every sensitive function consults the permission checker as its first
/// action and raises [`SandboxError::PermissionDenied`] on refusal — a
/// denied read is never reported as an empty value. Logging is always
/// allowed.
pub struct HostFunctions {
    checker: Arc<PermissionChecker>,
    store: KeyValueStore,
    metadata: SandboxMetadata,
}

impl HostFunctions {
    pub fn new(checker: Arc<PermissionChecker>, metadata: SandboxMetadata) -> Self {
        Self {
            checker,
            store: KeyValueStore::new(),
            metadata,
        }
    }

    pub fn metadata(&self) -> &SandboxMetadata {
        &self.metadata
    }

    /// Permission check as the first act of every gated function.
    fn gate(&self, capability: CapabilityType, resource: Option<&str>) -> SandboxResult<()> {
        let result = self.checker.check(capability, resource);
        if result.granted {
            return Ok(());
        }
        let reason = result
            .reason
            .unwrap_or_else(|| format!("no permission grants {}", capability));
        debug!(
            sandbox = %self.metadata.name,
            capability = %capability,
            resource = resource.unwrap_or("-"),
            "host call denied"
        );
        Err(SandboxError::PermissionDenied {
            capability: capability.to_string(),
            resource: resource.map(str::to_string),
            reason,
        })
    }

    /// Read stored bytes for `key`; empty bytes when the key is absent.
    pub fn kv_read(&self, key: &str) -> SandboxResult<Vec<u8>> {
        self.gate(CapabilityType::KvRead, Some(key))?;
        Ok(self.store.get(key).unwrap_or_default())
    }

    /// Store bytes under `key`, overwriting any previous value.
    pub fn kv_write(&self, key: &str, value: Vec<u8>) -> SandboxResult<()> {
        self.gate(CapabilityType::KvWrite, Some(key))?;
        self.store.set(key, value);
        Ok(())
    }

    /// Remove `key` if present.
    pub fn kv_delete(&self, key: &str) -> SandboxResult<()> {
        self.gate(CapabilityType::KvWrite, Some(key))?;
        self.store.remove(key);
        Ok(())
    }

    /// Single-byte boolean flag: 1 when the key exists, 0 otherwise.
    pub fn kv_exists(&self, key: &str) -> SandboxResult<Vec<u8>> {
        self.gate(CapabilityType::KvRead, Some(key))?;
        Ok(vec![self.store.contains(key) as u8])
    }

    /// Read from the scratch-memory partition of the store.
    pub fn scratch_read(&self, key: &str) -> SandboxResult<Vec<u8>> {
        self.gate(CapabilityType::MemoryRead, Some(key))?;
        let scoped = format!("{}{}", SCRATCH_PREFIX, key);
        Ok(self.store.get(&scoped).unwrap_or_default())
    }

    /// Write to the scratch-memory partition of the store.
    pub fn scratch_write(&self, key: &str, value: Vec<u8>) -> SandboxResult<()> {
        self.gate(CapabilityType::MemoryWrite, Some(key))?;
        let scoped = format!("{}{}", SCRATCH_PREFIX, key);
        self.store.set(&scoped, value);
        Ok(())
    }

    /// Current epoch time in milliseconds.
    pub fn time_now(&self) -> SandboxResult<i64> {
        self.gate(CapabilityType::SysTime, None)?;
        Ok(chrono::Utc::now().timestamp_millis())
    }

    /// `length` cryptographically random bytes, capped at
    /// [`MAX_RANDOM_BYTES`]. The cap is checked before any generation.
    pub fn random_bytes(&self, length: usize) -> SandboxResult<Vec<u8>> {
        self.gate(CapabilityType::SysRandom, None)?;
        if length > MAX_RANDOM_BYTES {
            return Err(SandboxError::LimitExceeded(format!(
                "random-bytes request of {} exceeds the {} byte cap",
                length, MAX_RANDOM_BYTES
            )));
        }
        let mut bytes = vec![0u8; length];
        OsRng.fill_bytes(&mut bytes);
        Ok(bytes)
    }

    /// Process environment value for `key`, or the empty string.
    pub fn env_get(&self, key: &str) -> SandboxResult<String> {
        self.gate(CapabilityType::EnvRead, Some(key))?;
        Ok(std::env::var(key).unwrap_or_default())
    }

    /// Mutate the process environment. This affects the whole host
    /// process, not just this sandbox; grant `env:write` accordingly.
    pub fn env_set(&self, key: &str, value: &str) -> SandboxResult<()> {
        self.gate(CapabilityType::EnvWrite, Some(key))?;
        std::env::set_var(key, value);
        Ok(())
    }

    pub fn log_info(&self, message: &str) {
        info!(sandbox = %self.metadata.name, "{}", message);
    }

    pub fn log_warn(&self, message: &str) {
        warn!(sandbox = %self.metadata.name, "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(sandbox = %self.metadata.name, "{}", message);
    }

    pub fn log_debug(&self, message: &str) {
        debug!(sandbox = %self.metadata.name, "{}", message);
    }

    /// Outbound HTTP fetch. The permission is checked against the URL's
    /// host (net:https or net:http depending on scheme), but the effect
    /// layer is an open stub: no network proxying is provided yet, so a
    /// granted request still fails with [`SandboxError::Unsupported`].
    pub fn http_get(&self, url: &str) -> SandboxResult<Vec<u8>> {
        let (capability, rest) = if let Some(rest) = url.strip_prefix("https://") {
            (CapabilityType::NetHttps, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (CapabilityType::NetHttp, rest)
        } else {
            return Err(SandboxError::Unsupported(format!(
                "http-get: unsupported URL scheme in '{}'",
                url
            )));
        };
        let host = rest
            .split('/')
            .next()
            .and_then(|authority| authority.split(':').next())
            .unwrap_or(rest);
        self.gate(capability, Some(host))?;
        Err(SandboxError::Unsupported(
            "http-get: outbound HTTP is not implemented".to_string(),
        ))
    }

    /// Clear the entire store, both namespaces.
    pub(crate) fn clear_store(&self) {
        self.store.clear();
    }

    pub(crate) fn store_len(&self) -> usize {
        self.store.len()
    }
}
