//! Asynchronous-feeling LSP client subsystem on a synchronous cooperative
//! loop.
//!
//! Split mirrors the classic client decomposition: `framing` (the
//! `Content-Length` wire codec), `jsonrpc` (message shapes and id
//! allocation), `transport` (per-server reader thread bridging the child's
//! stdout into a bounded channel), `client` (pending-request map,
//! capability gating, `poll()` dispatch), and `server` (child process
//! lifecycle and filetype routing).
//!
//! Concurrency: reads block only on the reader threads; `poll()` and
//! `poll_all()` drain channels with `try_recv` and return promptly. All
//! client state lives on the event-loop thread.

use thiserror::Error;

pub mod client;
pub mod diagnostics;
pub mod documents;
pub mod framing;
pub mod jsonrpc;
pub mod server;
pub mod transport;

pub use client::{Client, LifecycleState, ResponseOutcome};
pub use diagnostics::{Diagnostic, DiagnosticsStore, Severity};
pub use documents::DocumentTracker;
pub use server::{ServerManager, ServerState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LspError {
    /// Framing or JSON decode failure; the connection is torn down.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    /// The server process exited (or its pipe broke) outside shutdown.
    #[error("server '{0}' crashed")]
    ServerCrashed(String),
    /// A request deadline passed; the request was auto-cancelled.
    #[error("request {0} timed out")]
    Timeout(u32),
    /// Child process could not be started.
    #[error("failed to spawn '{0}': {1}")]
    SpawnFailed(String, String),
    /// The server did not advertise the capability this request needs.
    #[error("server does not support '{0}'")]
    UnsupportedFeature(String),
    /// Client is not in a state that allows the operation.
    #[error("client not ready: {0}")]
    NotReady(&'static str),
}

pub type Result<T> = std::result::Result<T, LspError>;
