//! LSP client: request-id allocation, the pending-response map, capability
//! gating, cancellation, and non-blocking `poll()` dispatch.

use std::collections::HashMap;
use std::io::Write;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use serde_json::{Value, json};
use tracing::{debug, info, trace, warn};

use crate::jsonrpc::{self, METHOD_NOT_FOUND, Message, Notification, Request, ResponseError};
use crate::transport::Inbound;
use crate::{LspError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Spawning,
    Initializing,
    Ready,
    ShuttingDown,
    Terminated,
}

/// Terminal outcome delivered to a request's continuation, exactly once.
#[derive(Debug)]
pub enum ResponseOutcome {
    /// Successful result payload (may be `null`).
    Result(Value),
    /// Protocol-level error, passed through unchanged.
    Error(ResponseError),
    /// Deadline passed; the request was auto-cancelled.
    Timeout,
    /// The server went away before answering.
    ServerCrashed,
}

pub type Continuation = Box<dyn FnOnce(ResponseOutcome)>;
pub type NotificationHandler = Box<dyn FnMut(&str, &Value)>;

struct Pending {
    method: &'static str,
    continuation: Option<Continuation>,
    deadline: Option<Instant>,
}

pub struct Client {
    name: String,
    writer: Box<dyn Write + Send>,
    inbound: Receiver<Inbound>,
    next_id: u32,
    pending: HashMap<u32, Pending>,
    state: LifecycleState,
    capabilities: Option<Value>,
    init_id: Option<u32>,
    on_notification: Option<NotificationHandler>,
}

impl Client {
    pub fn new(
        name: impl Into<String>,
        writer: Box<dyn Write + Send>,
        inbound: Receiver<Inbound>,
    ) -> Self {
        Self {
            name: name.into(),
            writer,
            inbound,
            next_id: 0,
            pending: HashMap::new(),
            state: LifecycleState::Spawning,
            capabilities: None,
            init_id: None,
            on_notification: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn capabilities(&self) -> Option<&Value> {
        self.capabilities.as_ref()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Handler for server notifications (diagnostics, logs, progress).
    /// Invoked in arrival order from `poll()`.
    pub fn set_notification_handler(&mut self, handler: NotificationHandler) {
        self.on_notification = Some(handler);
    }

    // ------------------------------------------------------------ lifecycle

    /// Send the `initialize` request. The handshake completes inside
    /// `poll()` when the response arrives: capabilities are retained, the
    /// `initialized` notification goes out, and the client becomes ready.
    pub fn initialize(&mut self, workspace_uri: &str) -> Result<u32> {
        if self.state != LifecycleState::Spawning {
            return Err(LspError::NotReady("initialize already sent"));
        }
        let params = json!({
            "processId": std::process::id(),
            "rootUri": workspace_uri,
            "capabilities": {
                "textDocument": {
                    "synchronization": { "didSave": true },
                    "publishDiagnostics": {}
                }
            },
        });
        let id = self.allocate_id();
        self.send_body(&serde_json::to_string(&Request::new(id, "initialize", params)).expect("serializable"))?;
        self.pending.insert(
            id,
            Pending {
                method: "initialize",
                continuation: None,
                deadline: None,
            },
        );
        self.init_id = Some(id);
        self.state = LifecycleState::Initializing;
        info!(target: "lsp.client", server = %self.name, id, "initialize_sent");
        Ok(id)
    }

    /// Send `shutdown` then `exit` and stop accepting work.
    pub fn shutdown(&mut self) -> Result<()> {
        if matches!(
            self.state,
            LifecycleState::ShuttingDown | LifecycleState::Terminated
        ) {
            return Ok(());
        }
        let id = self.allocate_id();
        let body = serde_json::to_string(&Request::new(id, "shutdown", Value::Null))
            .expect("serializable");
        self.send_body(&body)?;
        let exit = serde_json::to_string(&Notification::new("exit", Value::Null))
            .expect("serializable");
        self.send_body(&exit)?;
        self.state = LifecycleState::ShuttingDown;
        info!(target: "lsp.client", server = %self.name, "shutdown_sent");
        Ok(())
    }

    // ------------------------------------------------------------ documents

    pub fn open_document(
        &mut self,
        uri: &str,
        language_id: &str,
        version: i64,
        text: &str,
    ) -> Result<()> {
        self.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": language_id,
                    "version": version,
                    "text": text,
                }
            }),
        )
    }

    /// `changes` follows the wire shape of `contentChanges` (full or
    /// incremental, as negotiated by the caller).
    pub fn change_document(&mut self, uri: &str, version: i64, changes: Value) -> Result<()> {
        self.notify(
            "textDocument/didChange",
            json!({
                "textDocument": { "uri": uri, "version": version },
                "contentChanges": changes,
            }),
        )
    }

    pub fn save_document(&mut self, uri: &str, text: Option<&str>) -> Result<()> {
        let mut params = json!({ "textDocument": { "uri": uri } });
        if let Some(text) = text {
            params["text"] = Value::String(text.to_string());
        }
        self.notify("textDocument/didSave", params)
    }

    pub fn close_document(&mut self, uri: &str) -> Result<()> {
        self.notify(
            "textDocument/didClose",
            json!({ "textDocument": { "uri": uri } }),
        )
    }

    // ------------------------------------------------------------ requests

    pub fn hover(&mut self, uri: &str, line: u32, character: u32, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        self.position_request("textDocument/hover", uri, line, character, continuation, timeout)
    }

    pub fn definition(&mut self, uri: &str, line: u32, character: u32, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        self.position_request("textDocument/definition", uri, line, character, continuation, timeout)
    }

    pub fn references(&mut self, uri: &str, line: u32, character: u32, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        let params = json!({
            "textDocument": { "uri": uri },
            "position": { "line": line, "character": character },
            "context": { "includeDeclaration": true },
        });
        self.request("textDocument/references", params, continuation, timeout)
    }

    pub fn completion(&mut self, uri: &str, line: u32, character: u32, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        self.position_request("textDocument/completion", uri, line, character, continuation, timeout)
    }

    pub fn signature_help(&mut self, uri: &str, line: u32, character: u32, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        self.position_request("textDocument/signatureHelp", uri, line, character, continuation, timeout)
    }

    pub fn code_action(&mut self, uri: &str, range: Value, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        let params = json!({
            "textDocument": { "uri": uri },
            "range": range,
            "context": { "diagnostics": [] },
        });
        self.request("textDocument/codeAction", params, continuation, timeout)
    }

    pub fn rename(&mut self, uri: &str, line: u32, character: u32, new_name: &str, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        let params = json!({
            "textDocument": { "uri": uri },
            "position": { "line": line, "character": character },
            "newName": new_name,
        });
        self.request("textDocument/rename", params, continuation, timeout)
    }

    pub fn prepare_rename(&mut self, uri: &str, line: u32, character: u32, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        self.position_request("textDocument/prepareRename", uri, line, character, continuation, timeout)
    }

    pub fn format_document(&mut self, uri: &str, tab_size: u32, insert_spaces: bool, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        let params = json!({
            "textDocument": { "uri": uri },
            "options": { "tabSize": tab_size, "insertSpaces": insert_spaces },
        });
        self.request("textDocument/formatting", params, continuation, timeout)
    }

    pub fn document_symbols(&mut self, uri: &str, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        self.document_request("textDocument/documentSymbol", uri, continuation, timeout)
    }

    pub fn selection_range(&mut self, uri: &str, positions: Value, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        let params = json!({
            "textDocument": { "uri": uri },
            "positions": positions,
        });
        self.request("textDocument/selectionRange", params, continuation, timeout)
    }

    pub fn inlay_hint(&mut self, uri: &str, range: Value, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        let params = json!({
            "textDocument": { "uri": uri },
            "range": range,
        });
        self.request("textDocument/inlayHint", params, continuation, timeout)
    }

    pub fn semantic_tokens_full(&mut self, uri: &str, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        self.document_request("textDocument/semanticTokens/full", uri, continuation, timeout)
    }

    pub fn document_highlight(&mut self, uri: &str, line: u32, character: u32, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        self.position_request("textDocument/documentHighlight", uri, line, character, continuation, timeout)
    }

    pub fn folding_range(&mut self, uri: &str, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        self.document_request("textDocument/foldingRange", uri, continuation, timeout)
    }

    /// Cancel a pending request: `$/cancelRequest` goes out, the pending
    /// entry is dropped, and any late result for the id is discarded.
    pub fn cancel(&mut self, id: u32) -> Result<()> {
        if self.pending.remove(&id).is_some() {
            debug!(target: "lsp.client", server = %self.name, id, "request_cancelled");
            let body = serde_json::to_string(&Notification::new(
                "$/cancelRequest",
                json!({ "id": id }),
            ))
            .expect("serializable");
            self.send_body(&body)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------ polling

    /// Drain whatever complete messages are available, dispatch them, and
    /// fire overdue deadlines. Never blocks; with no input it only scans
    /// deadlines and leaves pending state untouched.
    pub fn poll(&mut self) -> Result<()> {
        if self.state == LifecycleState::Terminated {
            return Ok(());
        }
        loop {
            match self.inbound.try_recv() {
                Ok(Inbound::Message(body)) => self.dispatch(&body)?,
                Ok(Inbound::Closed) | Err(TryRecvError::Disconnected) => {
                    self.on_stream_end();
                    break;
                }
                Ok(Inbound::Malformed(detail)) => {
                    self.fail_all_pending(|| ResponseOutcome::ServerCrashed);
                    self.state = LifecycleState::Terminated;
                    return Err(LspError::MalformedMessage(detail));
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        self.expire_deadlines();
        Ok(())
    }

    fn dispatch(&mut self, body: &str) -> Result<()> {
        let message = match jsonrpc::classify(body) {
            Ok(m) => m,
            Err(detail) => {
                self.fail_all_pending(|| ResponseOutcome::ServerCrashed);
                self.state = LifecycleState::Terminated;
                return Err(LspError::MalformedMessage(detail));
            }
        };
        match message {
            Message::Response { id, result, error } => {
                let Some(entry) = self.pending.remove(&id) else {
                    trace!(target: "lsp.client", server = %self.name, id, "late_response_discarded");
                    return Ok(());
                };
                if self.init_id == Some(id) {
                    self.finish_initialize(result);
                    return Ok(());
                }
                if let Some(continuation) = entry.continuation {
                    let outcome = match error {
                        Some(err) => ResponseOutcome::Error(err),
                        None => ResponseOutcome::Result(result.unwrap_or(Value::Null)),
                    };
                    continuation(outcome);
                }
            }
            Message::Notification { method, params } => {
                trace!(target: "lsp.client", server = %self.name, method = %method, "notification");
                if let Some(handler) = self.on_notification.as_mut() {
                    handler(&method, &params);
                }
            }
            Message::ServerRequest { id, method, .. } => {
                // We implement no server→client requests; answer with
                // MethodNotFound so the server is not left waiting.
                warn!(target: "lsp.client", server = %self.name, method = %method, "server_request_rejected");
                let reply = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": METHOD_NOT_FOUND, "message": format!("unsupported: {method}") },
                });
                self.send_body(&reply.to_string())?;
            }
        }
        Ok(())
    }

    fn finish_initialize(&mut self, result: Option<Value>) {
        self.capabilities = result
            .as_ref()
            .and_then(|r| r.get("capabilities"))
            .cloned();
        self.init_id = None;
        let body = serde_json::to_string(&Notification::new("initialized", json!({})))
            .expect("serializable");
        if self.send_body(&body).is_ok() {
            self.state = LifecycleState::Ready;
            info!(target: "lsp.client", server = %self.name, "server_ready");
        }
    }

    fn on_stream_end(&mut self) {
        if self.state == LifecycleState::ShuttingDown {
            self.state = LifecycleState::Terminated;
            return;
        }
        warn!(target: "lsp.client", server = %self.name, "server_stream_ended");
        self.state = LifecycleState::Terminated;
        self.fail_all_pending(|| ResponseOutcome::ServerCrashed);
    }

    fn expire_deadlines(&mut self) {
        let now = Instant::now();
        let overdue: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| *id)
            .collect();
        for id in overdue {
            let entry = self.pending.remove(&id).expect("collected above");
            debug!(target: "lsp.client", server = %self.name, id, method = entry.method, "request_deadline");
            let body = serde_json::to_string(&Notification::new(
                "$/cancelRequest",
                json!({ "id": id }),
            ))
            .expect("serializable");
            let _ = self.send_body(&body);
            if let Some(continuation) = entry.continuation {
                continuation(ResponseOutcome::Timeout);
            }
        }
    }

    // ------------------------------------------------------------ internals

    fn position_request(&mut self, method: &'static str, uri: &str, line: u32, character: u32, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        let params = json!({
            "textDocument": { "uri": uri },
            "position": { "line": line, "character": character },
        });
        self.request(method, params, continuation, timeout)
    }

    fn document_request(&mut self, method: &'static str, uri: &str, continuation: Option<Continuation>, timeout: Option<Duration>) -> Result<u32> {
        let params = json!({ "textDocument": { "uri": uri } });
        self.request(method, params, continuation, timeout)
    }

    /// Allocate an id, enforce readiness and capability, and send.
    pub fn request(
        &mut self,
        method: &'static str,
        params: Value,
        continuation: Option<Continuation>,
        timeout: Option<Duration>,
    ) -> Result<u32> {
        if self.state != LifecycleState::Ready {
            return Err(LspError::NotReady("server is not ready"));
        }
        if !self.supports(method) {
            return Err(LspError::UnsupportedFeature(method.to_string()));
        }
        let id = self.allocate_id();
        let body = serde_json::to_string(&Request::new(id, method, params))
            .expect("serializable");
        self.send_body(&body)?;
        self.pending.insert(
            id,
            Pending {
                method,
                continuation,
                deadline: timeout.map(|t| Instant::now() + t),
            },
        );
        trace!(target: "lsp.client", server = %self.name, id, method, "request_sent");
        Ok(id)
    }

    fn notify(&mut self, method: &str, params: Value) -> Result<()> {
        if !matches!(self.state, LifecycleState::Ready) {
            return Err(LspError::NotReady("server is not ready"));
        }
        let body = serde_json::to_string(&Notification::new(method, params))
            .expect("serializable");
        self.send_body(&body)
    }

    /// Whether the server advertised the capability backing `method`.
    /// Requests for unadvertised features must not be sent.
    pub fn supports(&self, method: &str) -> bool {
        let key = match method {
            "textDocument/hover" => "hoverProvider",
            "textDocument/definition" => "definitionProvider",
            "textDocument/references" => "referencesProvider",
            "textDocument/completion" => "completionProvider",
            "textDocument/signatureHelp" => "signatureHelpProvider",
            "textDocument/codeAction" => "codeActionProvider",
            "textDocument/rename" | "textDocument/prepareRename" => "renameProvider",
            "textDocument/formatting" => "documentFormattingProvider",
            "textDocument/documentSymbol" => "documentSymbolProvider",
            "textDocument/selectionRange" => "selectionRangeProvider",
            "textDocument/inlayHint" => "inlayHintProvider",
            "textDocument/semanticTokens/full" => "semanticTokensProvider",
            "textDocument/documentHighlight" => "documentHighlightProvider",
            "textDocument/foldingRange" => "foldingRangeProvider",
            _ => return true, // non-gated methods
        };
        match self.capabilities.as_ref().and_then(|c| c.get(key)) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(_) => true,
        }
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn send_body(&mut self, body: &str) -> Result<()> {
        if let Err(err) = crate::framing::write_message(&mut self.writer, body) {
            warn!(target: "lsp.client", server = %self.name, error = %err, "write_failed");
            self.state = LifecycleState::Terminated;
            self.fail_all_pending(|| ResponseOutcome::ServerCrashed);
            return Err(LspError::ServerCrashed(self.name.clone()));
        }
        Ok(())
    }

    fn fail_all_pending(&mut self, outcome: impl Fn() -> ResponseOutcome) {
        for (_, entry) in self.pending.drain() {
            if let Some(continuation) = entry.continuation {
                continuation(outcome());
            }
        }
    }
}
