use crate::capability::{PermissionSet, SandboxMetadata};
use crate::checker::PermissionChecker;
use crate::engine::{ExecutionEngine, LoadOptions, LoadedModule, ModuleSource};
use crate::error::{SandboxError, SandboxResult};
use crate::host::HostFunctions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle state of a sandbox. `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxState {
    Uninitialized,
    Initialized,
    Disposed,
}

/// Outcome of one guest call. Execution failures, including timeouts, are
/// reported here rather than raised; `execute` only raises on lifecycle
/// misuse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: Vec<u8>,
    pub execution_time_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// [`ExecutionResult`] with the output decoded as text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextExecutionResult {
    pub output: String,
    pub execution_time_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// [`ExecutionResult`] with the output parsed as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonExecutionResult {
    pub output: serde_json::Value,
    pub execution_time_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Point-in-time snapshot of a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxStatus {
    pub id: String,
    pub plugin_id: String,
    pub name: String,
    pub state: SandboxState,
    pub store_entries: usize,
    pub timeout_ms: Option<u64>,
}

/// One loaded guest module bound to a permission checker, an isolated
/// key-value store, and an execution budget.
///
/// Lifecycle: `Uninitialized → Initialized → Disposed` (terminal). The
/// permission set is fixed at construction; changing a plugin's authority
/// means building a new sandbox. `execute` takes `&mut self`, so two guest
/// calls can never be in flight on one instance.
pub struct Sandbox {
    id: String,
    metadata: SandboxMetadata,
    source: ModuleSource,
    engine: Arc<dyn ExecutionEngine>,
    checker: Arc<PermissionChecker>,
    options: LoadOptions,
    timeout: Option<Duration>,
    host: Option<Arc<HostFunctions>>,
    module: Option<Box<dyn LoadedModule>>,
    state: SandboxState,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .field("source", &self.source)
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        source: ModuleSource,
        metadata: SandboxMetadata,
        permissions: PermissionSet,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            metadata,
            source,
            engine,
            checker: Arc::new(PermissionChecker::new(permissions)),
            options: LoadOptions::default(),
            timeout: None,
            host: None,
            module: None,
            state: SandboxState::Uninitialized,
        }
    }

    /// Budget for a single `execute` call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_load_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Build a sandbox from a named permission preset and initialize it
    /// immediately. Fails on an unknown preset name or on load failure.
    pub async fn from_preset(
        engine: Arc<dyn ExecutionEngine>,
        source: ModuleSource,
        metadata: SandboxMetadata,
        preset: &str,
    ) -> SandboxResult<Self> {
        let permissions = PermissionSet::preset(preset).ok_or_else(|| {
            SandboxError::InvalidPermissionSet(format!("unknown preset '{}'", preset))
        })?;
        let mut sandbox = Self::new(engine, source, metadata, permissions);
        sandbox.initialize().await?;
        Ok(sandbox)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub fn metadata(&self) -> &SandboxMetadata {
        &self.metadata
    }

    pub fn checker(&self) -> &PermissionChecker {
        &self.checker
    }

    pub fn status(&self) -> SandboxStatus {
        SandboxStatus {
            id: self.id.clone(),
            plugin_id: self.metadata.plugin_id.clone(),
            name: self.metadata.name.clone(),
            state: self.state,
            store_entries: self.host.as_ref().map(|h| h.store_len()).unwrap_or(0),
            timeout_ms: self.timeout.map(|t| t.as_millis() as u64),
        }
    }

    /// Bind the host-function table to a fresh key-value store and load
    /// the module through the execution engine.
    ///
    /// Idempotent once initialized. On failure the sandbox stays
    /// `Uninitialized` and the call may be retried.
    pub async fn initialize(&mut self) -> SandboxResult<()> {
        match self.state {
            SandboxState::Disposed => return Err(SandboxError::Disposed),
            SandboxState::Initialized => {
                debug!(sandbox = %self.metadata.name, "already initialized, skipping load");
                return Ok(());
            }
            SandboxState::Uninitialized => {}
        }

        let host = Arc::new(HostFunctions::new(
            self.checker.clone(),
            self.metadata.clone(),
        ));
        let module = self
            .engine
            .load(&self.source, host.clone(), &self.options)
            .await?;

        self.host = Some(host);
        self.module = Some(module);
        self.state = SandboxState::Initialized;
        info!(
            sandbox = %self.metadata.name,
            source = %self.source.describe(),
            "sandbox initialized"
        );
        Ok(())
    }

    /// Invoke the named exported guest function.
    ///
    /// Raises only on lifecycle misuse (`NotInitialized` / `Disposed`);
    /// every execution failure, including timeout, is reported through the
    /// returned [`ExecutionResult`]. The timeout is a race against a
    /// timer, not a cancellation: a guest call that loses the race may
    /// keep running, and its eventual result is discarded.
    pub async fn execute(
        &mut self,
        function: &str,
        input: Option<&[u8]>,
    ) -> SandboxResult<ExecutionResult> {
        let module = match self.state {
            SandboxState::Disposed => return Err(SandboxError::Disposed),
            SandboxState::Uninitialized => return Err(SandboxError::NotInitialized),
            SandboxState::Initialized => {
                self.module.as_ref().ok_or(SandboxError::NotInitialized)?
            }
        };

        let started = Instant::now();
        let input = input.unwrap_or_default();

        let outcome = match self.timeout {
            Some(budget) => match tokio::time::timeout(budget, module.call(function, input)).await
            {
                Ok(inner) => inner,
                Err(_) => Err(SandboxError::Timeout(budget.as_millis() as u64)),
            },
            None => module.call(function, input).await,
        };

        let execution_time_ms = started.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(output) => ExecutionResult {
                output,
                execution_time_ms,
                success: true,
                error: None,
            },
            Err(err) => {
                debug!(
                    sandbox = %self.metadata.name,
                    function,
                    error = %err,
                    "guest call failed"
                );
                ExecutionResult {
                    output: Vec::new(),
                    execution_time_ms,
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        };
        Ok(result)
    }

    /// `execute` with text input/output.
    pub async fn execute_text(
        &mut self,
        function: &str,
        input: Option<&str>,
    ) -> SandboxResult<TextExecutionResult> {
        let result = self
            .execute(function, input.map(str::as_bytes))
            .await?;
        Ok(TextExecutionResult {
            output: String::from_utf8_lossy(&result.output).into_owned(),
            execution_time_ms: result.execution_time_ms,
            success: result.success,
            error: result.error,
        })
    }

    /// `execute` with JSON input/output. A guest reply that is not valid
    /// JSON raises a serialization error, distinct from engine failures.
    pub async fn execute_json(
        &mut self,
        function: &str,
        input: &serde_json::Value,
    ) -> SandboxResult<JsonExecutionResult> {
        let encoded = serde_json::to_vec(input)?;
        let result = self.execute(function, Some(&encoded)).await?;
        let output = if result.success {
            serde_json::from_slice(&result.output)?
        } else {
            serde_json::Value::Null
        };
        Ok(JsonExecutionResult {
            output,
            execution_time_ms: result.execution_time_ms,
            success: result.success,
            error: result.error,
        })
    }

    /// Clear the key-value store (both namespaces) and reset guest-side
    /// global state. Permissions, metadata, and the loaded module are
    /// untouched.
    pub async fn reset(&mut self) -> SandboxResult<()> {
        let module = match self.state {
            SandboxState::Disposed => return Err(SandboxError::Disposed),
            SandboxState::Uninitialized => return Err(SandboxError::NotInitialized),
            SandboxState::Initialized => {
                self.module.as_ref().ok_or(SandboxError::NotInitialized)?
            }
        };
        if let Some(host) = &self.host {
            host.clear_store();
        }
        module.reset().await?;
        debug!(sandbox = %self.metadata.name, "sandbox reset");
        Ok(())
    }

    /// Release the loaded module and the store. Idempotent; once disposed
    /// every `execute`/`reset` fails with a disposed error.
    pub async fn dispose(&mut self) -> SandboxResult<()> {
        if self.state == SandboxState::Disposed {
            return Ok(());
        }
        if let Some(module) = self.module.take() {
            module.close().await?;
        }
        if let Some(host) = self.host.take() {
            host.clear_store();
        }
        self.state = SandboxState::Disposed;
        info!(sandbox = %self.metadata.name, "sandbox disposed");
        Ok(())
    }
}
