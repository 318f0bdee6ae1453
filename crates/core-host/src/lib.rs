//! Scripting host: owns a Gza VM, enforces the sandbox, and mediates every
//! plugin-visible effect.
//!
//! Plugins influence the editor through exactly one channel: builtins
//! enqueue [`PluginAction`]s on the per-invocation context, and the host
//! drains them into the caller's [`ActionSink`] only after the VM run
//! succeeds. A failed script therefore has no observable effect beyond its
//! error and the accounting in [`ExecStats`].

use std::time::Duration;

use core_script::ScriptError;
use thiserror::Error;

pub mod builtins;
pub mod context;
pub mod glob;
pub mod host;

pub use context::{
    ActionSink, EditorQuery, EditorSnapshot, HostCallContext, NoEditor, PluginAction,
};
pub use host::{CompiledPlugin, ScriptHost};

/// Default sandbox knobs.
pub const DEFAULT_MAX_EXECUTION_MS: u64 = 5_000;
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_MAX_FILE_OPS: u32 = 100;
pub const DEFAULT_MAX_NETWORK_OPS: u32 = 0;
/// Size cap for `init.gza`.
pub const CONFIG_SIZE_CAP: u64 = 16 * 1024 * 1024;

/// Host-surfaced failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// Script failed to parse, or a builtin was misused (wrong arity/types).
    #[error("invalid script: {0}")]
    InvalidScript(String),
    /// Configuration could not be read; partial state was discarded.
    #[error("configuration not loaded: {0}")]
    ConfigNotLoaded(String),
    #[error("execution timed out")]
    ExecutionTimeout,
    #[error("memory limit exceeded")]
    MemoryLimitExceeded,
    #[error("unauthorized file access: {0}")]
    UnauthorizedFileAccess(String),
    #[error("unauthorized network access")]
    UnauthorizedNetworkAccess,
    #[error("sandbox violation: {0}")]
    SandboxViolation(String),
    /// Line index past the end of the buffer in an editor builtin.
    #[error("bad position: line {0}")]
    BadPosition(usize),
    /// Runtime script failure (type errors, undefined names, …).
    #[error(transparent)]
    Script(ScriptError),
}

impl HostError {
    /// Lift a VM error, folding resource faults into their host-level
    /// variants and parse failures into `InvalidScript`.
    pub(crate) fn from_script(err: ScriptError) -> Self {
        match err {
            ScriptError::Parse { .. } => HostError::InvalidScript(err.to_string()),
            ScriptError::ExecutionTimeout => HostError::ExecutionTimeout,
            ScriptError::MemoryLimitExceeded => HostError::MemoryLimitExceeded,
            other => HostError::Script(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;

/// Sandbox policy for one host.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub max_execution_ms: u64,
    pub max_memory_bytes: usize,
    pub max_file_ops: u32,
    pub max_network_ops: u32,
    /// Trailing-`*` globs; checked before the allow list.
    pub blocked_paths: Vec<String>,
    /// When non-empty, a path must match one of these.
    pub allowed_paths: Vec<String>,
    pub enable_filesystem_access: bool,
    pub enable_network_access: bool,
    pub enable_syscalls: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_execution_ms: DEFAULT_MAX_EXECUTION_MS,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            max_file_ops: DEFAULT_MAX_FILE_OPS,
            max_network_ops: DEFAULT_MAX_NETWORK_OPS,
            blocked_paths: Vec::new(),
            allowed_paths: Vec::new(),
            enable_filesystem_access: false,
            enable_network_access: false,
            enable_syscalls: false,
        }
    }
}

impl SandboxConfig {
    pub fn execution_deadline(&self) -> Duration {
        Duration::from_millis(self.max_execution_ms)
    }
}

/// Accumulated execution statistics. Guaranteed consistent whether runs
/// succeed or fail.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecStats {
    pub invocations: u64,
    pub total_wall: Duration,
    pub peak_memory: usize,
    pub violations: u64,
}
