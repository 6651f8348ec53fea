//! Plugin Sandbox - Capability Firewall for Untrusted Plugins
//!
//! A capability-sandboxing runtime: untrusted plugin modules run inside the
//! host process while a declarative permission model decides which host
//! resources they may touch.
//!
//! # Features
//!
//! - **Declarative Permissions**: a closed capability enumeration, grants
//!   optionally narrowed by exact/wildcard/prefix resource patterns
//! - **Permission Checking**: every host call is re-checked against an
//!   immutable permission set; denial is loud, never a silent default
//! - **Gated Host Functions**: key-value store, scratch memory, time,
//!   randomness, environment, and logging exposed to guest code
//! - **Sandbox Lifecycle**: initialize/execute/reset/dispose with a
//!   per-call timeout budget and an isolated key-value store per instance
//!
//! # Quick Start
//!
//! ```rust
//! use plugin_sandbox::{CapabilityType, PermissionChecker, PermissionSet};
//!
//! let checker = PermissionChecker::new(PermissionSet::standard());
//! let result = checker.check(CapabilityType::NetHttps, Some("api.example.com"));
//! assert!(result.granted);
//! ```

pub mod capability;
pub mod checker;
pub mod engine;
pub mod error;
pub mod host;
pub mod sandbox;

// Re-export main types
pub use capability::{
    CapabilityType, Permission, PermissionCheckResult, PermissionSet, SandboxMetadata,
    UnlistedPolicy,
};
pub use checker::{PermissionChecker, PermissionValidator, ValidationReport};
pub use engine::{ExecutionEngine, LoadOptions, LoadedModule, ModuleSource};
pub use error::{SandboxError, SandboxResult};
pub use host::{HostFunctions, KeyValueStore, MAX_RANDOM_BYTES};
pub use sandbox::{
    ExecutionResult, JsonExecutionResult, Sandbox, SandboxState, SandboxStatus,
    TextExecutionResult,
};
