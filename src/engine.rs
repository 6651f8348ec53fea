//! `ExecutionEngine` trait — abstraction over the module runtime.
//!
//! The engine that actually loads and runs untrusted guest bytecode is an
//! external collaborator. The sandbox hands it a module source and the
//! host-function table and gets back a callable module; memory isolation
//! inside the guest is the engine's responsibility, not ours.

use crate::error::SandboxResult;
use crate::host::HostFunctions;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a module's code comes from. Exactly one of the three forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    Url(String),
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl ModuleSource {
    /// Short description for logs; byte sources report their length
    /// rather than their content.
    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => format!("url:{}", url),
            Self::Path(path) => format!("path:{}", path.display()),
            Self::Bytes(bytes) => format!("bytes:{}", bytes.len()),
        }
    }
}

/// Engine options passed through at load time.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Expose WASI-style system interfaces to the guest.
    pub enable_wasi: bool,
    /// Engine-specific key/value configuration.
    pub config: HashMap<String, String>,
}

/// A loaded, callable guest module.
#[async_trait]
pub trait LoadedModule: Send + Sync {
    /// Invoke the named exported function with the given input bytes.
    async fn call(&self, function: &str, input: &[u8]) -> SandboxResult<Vec<u8>>;

    /// Reset guest-side global state without reloading the module.
    async fn reset(&self) -> SandboxResult<()>;

    /// Release the module's resources. The module must not be called
    /// afterwards.
    async fn close(&self) -> SandboxResult<()>;
}

/// Abstraction over the external module runtime.
///
/// Implementations receive the host-function table so every sensitive
/// operation the guest performs flows back through the permission gate.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn load(
        &self,
        source: &ModuleSource,
        host: Arc<HostFunctions>,
        options: &LoadOptions,
    ) -> SandboxResult<Box<dyn LoadedModule>>;
}
