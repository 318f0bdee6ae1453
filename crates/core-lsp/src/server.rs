//! Language-server process management: spawning, filetype routing,
//! round-robin polling, and bounded-wait shutdown.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::rc::Rc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::client::{Client, LifecycleState};
use crate::diagnostics::DiagnosticsStore;
use crate::documents::DocumentTracker;
use crate::transport;
use crate::{LspError, Result};

/// How long `shutdown` waits for a child to exit before killing it.
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Crashed,
    Terminated,
}

/// Static registration: which binary serves which file extensions.
#[derive(Debug, Clone)]
pub struct ServerRegistration {
    pub name: String,
    pub argv: Vec<String>,
    pub filetypes: Vec<String>,
    pub language_id: String,
}

pub struct ServerProcess {
    pub name: String,
    child: Child,
    pub client: Client,
    pub filetypes: Vec<String>,
    pub state: ServerState,
    /// Open-document bookkeeping for this server instance.
    pub documents: DocumentTracker,
}

impl std::fmt::Debug for ServerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProcess")
            .field("name", &self.name)
            .field("filetypes", &self.filetypes)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

pub struct ServerManager {
    workspace_uri: String,
    registrations: Vec<ServerRegistration>,
    servers: IndexMap<String, ServerProcess>,
    /// extension → registration index, derived from `registrations`.
    by_extension: HashMap<String, usize>,
    /// Shared across servers: diagnostics replace per uri, whichever server
    /// published last.
    diagnostics: Rc<RefCell<DiagnosticsStore>>,
}

impl ServerManager {
    pub fn new(workspace_uri: impl Into<String>) -> Self {
        Self {
            workspace_uri: workspace_uri.into(),
            registrations: Vec::new(),
            servers: IndexMap::new(),
            by_extension: HashMap::new(),
            diagnostics: Rc::new(RefCell::new(DiagnosticsStore::new())),
        }
    }

    pub fn diagnostics(&self) -> Rc<RefCell<DiagnosticsStore>> {
        Rc::clone(&self.diagnostics)
    }

    pub fn register(&mut self, registration: ServerRegistration) {
        let idx = self.registrations.len();
        for ext in &registration.filetypes {
            self.by_extension.insert(ext.clone(), idx);
        }
        self.registrations.push(registration);
    }

    pub fn registrations(&self) -> &[ServerRegistration] {
        &self.registrations
    }

    pub fn server(&mut self, name: &str) -> Option<&mut ServerProcess> {
        self.servers.get_mut(name)
    }

    /// Fork the configured child with piped stdio, wire the transport, and
    /// kick off the `initialize` handshake.
    pub fn spawn(&mut self, name: &str) -> Result<&mut ServerProcess> {
        let registration = self
            .registrations
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| {
                LspError::SpawnFailed(name.to_string(), "no such registration".to_string())
            })?;
        let (program, args) = registration
            .argv
            .split_first()
            .ok_or_else(|| LspError::SpawnFailed(name.to_string(), "empty argv".to_string()))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LspError::SpawnFailed(name.to_string(), e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::SpawnFailed(name.to_string(), "no stdout pipe".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::SpawnFailed(name.to_string(), "no stdin pipe".to_string()))?;
        let (inbound, _reader) = transport::spawn_reader(name.to_string(), stdout);
        let mut client = Client::new(name, Box::new(stdin), inbound);
        let diagnostics = Rc::clone(&self.diagnostics);
        client.set_notification_handler(Box::new(move |method, params| {
            if method == "textDocument/publishDiagnostics" {
                diagnostics.borrow_mut().apply_publish(params);
            }
            // Log messages and progress tokens pass through untouched; the
            // front-end subscribes where it cares.
        }));
        client.initialize(&self.workspace_uri)?;

        info!(target: "lsp.server", server = %name, "server_spawned");
        let process = ServerProcess {
            name: name.to_string(),
            child,
            client,
            filetypes: registration.filetypes.clone(),
            state: ServerState::Running,
            documents: DocumentTracker::new(),
        };
        self.servers.insert(name.to_string(), process);
        Ok(self.servers.get_mut(name).expect("just inserted"))
    }

    /// Registration serving `path`'s extension, if any.
    pub fn registration_for_file(&self, path: &Path) -> Option<&ServerRegistration> {
        let ext = path.extension()?.to_str()?;
        self.by_extension
            .get(ext)
            .map(|&idx| &self.registrations[idx])
    }

    /// Server responsible for `path`, spawning it on first use. `Ok(None)`
    /// when no server is registered for the extension.
    pub fn server_for_file(&mut self, path: &Path) -> Result<Option<&mut ServerProcess>> {
        let Some(name) = self.registration_for_file(path).map(|r| r.name.clone()) else {
            return Ok(None);
        };
        if !self.servers.contains_key(&name)
            || self.servers[&name].state != ServerState::Running
        {
            self.spawn(&name)?;
        }
        Ok(self.servers.get_mut(&name))
    }

    /// Round-robin poll: drain each running server's available input once.
    /// Fair by construction; a chatty server cannot starve the others.
    pub fn poll_all(&mut self) {
        for process in self.servers.values_mut() {
            if process.state != ServerState::Running {
                continue;
            }
            match process.client.poll() {
                Ok(()) => {
                    if process.client.state() == LifecycleState::Terminated {
                        warn!(target: "lsp.server", server = %process.name, "server_exited_unexpectedly");
                        process.state = ServerState::Crashed;
                        process.documents.reset();
                    }
                }
                Err(err) => {
                    warn!(target: "lsp.server", server = %process.name, error = %err, "connection_torn_down");
                    process.state = ServerState::Crashed;
                    process.documents.reset();
                    let _ = process.child.kill();
                }
            }
        }
    }

    /// Graceful shutdown with a bounded wait, then kill.
    pub fn shutdown(&mut self, name: &str) -> Result<()> {
        let Some(process) = self.servers.get_mut(name) else {
            return Ok(());
        };
        let _ = process.client.shutdown();
        let deadline = Instant::now() + SHUTDOWN_WAIT;
        loop {
            match process.child.try_wait() {
                Ok(Some(status)) => {
                    info!(target: "lsp.server", server = %name, status = %status, "server_exited");
                    break;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Ok(None) => {
                    warn!(target: "lsp.server", server = %name, "shutdown_timeout_killing");
                    let _ = process.child.kill();
                    let _ = process.child.wait();
                    break;
                }
                Err(err) => {
                    warn!(target: "lsp.server", server = %name, error = %err, "wait_failed");
                    break;
                }
            }
        }
        process.state = ServerState::Terminated;
        Ok(())
    }

    pub fn shutdown_all(&mut self) {
        let names: Vec<String> = self.servers.keys().cloned().collect();
        for name in names {
            let _ = self.shutdown(&name);
        }
    }
}
