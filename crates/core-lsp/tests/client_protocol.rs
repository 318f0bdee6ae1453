//! Client protocol behavior over an in-memory transport: handshake,
//! at-most-once dispatch, cancellation, timeouts, crash delivery.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use core_lsp::transport::Inbound;
use core_lsp::{Client, LifecycleState, LspError, ResponseOutcome};
use crossbeam_channel::{Sender, unbounded};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct WireLog(Arc<Mutex<Vec<u8>>>);

impl Write for WireLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl WireLog {
    /// Decode every framed JSON body written so far.
    fn bodies(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        let mut reader = std::io::BufReader::new(std::io::Cursor::new(bytes));
        let mut out = Vec::new();
        while let Ok(Some(body)) = core_lsp::framing::read_message(&mut reader) {
            out.push(serde_json::from_str(&body).unwrap());
        }
        out
    }

    fn methods(&self) -> Vec<String> {
        self.bodies()
            .iter()
            .filter_map(|b| b.get("method").and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

fn ready_client() -> (Client, WireLog, Sender<Inbound>) {
    let wire = WireLog::default();
    let (tx, rx) = unbounded();
    let mut client = Client::new("test-server", Box::new(wire.clone()), rx);
    let init_id = client.initialize("file:///workspace").unwrap();
    let capabilities = json!({
        "hoverProvider": true,
        "definitionProvider": true,
        "renameProvider": { "prepareProvider": true },
        "documentSymbolProvider": true,
    });
    tx.send(Inbound::Message(
        json!({
            "jsonrpc": "2.0",
            "id": init_id,
            "result": { "capabilities": capabilities },
        })
        .to_string(),
    ))
    .unwrap();
    client.poll().unwrap();
    assert_eq!(client.state(), LifecycleState::Ready);
    (client, wire, tx)
}

fn respond(tx: &Sender<Inbound>, id: u32, result: Value) {
    tx.send(Inbound::Message(
        json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string(),
    ))
    .unwrap();
}

#[test]
fn handshake_sends_initialized_and_retains_capabilities() {
    let (client, wire, _tx) = ready_client();
    let methods = wire.methods();
    assert_eq!(methods, vec!["initialize", "initialized"]);
    assert!(client.supports("textDocument/hover"));
    assert!(!client.supports("textDocument/completion"));
}

#[test]
fn unadvertised_feature_is_refused_locally() {
    let (mut client, wire, _tx) = ready_client();
    let err = client
        .completion("file:///a.rs", 0, 0, None, None)
        .unwrap_err();
    assert!(matches!(err, LspError::UnsupportedFeature(_)));
    assert!(
        !wire.methods().contains(&"textDocument/completion".to_string()),
        "refused request must not reach the wire"
    );
}

#[test]
fn response_dispatches_to_continuation_exactly_once() {
    let (mut client, _wire, tx) = ready_client();
    let seen: Rc<RefCell<Vec<String>>> = Rc::default();
    let seen2 = Rc::clone(&seen);
    let id = client
        .hover(
            "file:///a.rs",
            1,
            2,
            Some(Box::new(move |outcome| {
                seen2.borrow_mut().push(format!("{outcome:?}"));
            })),
            None,
        )
        .unwrap();
    respond(&tx, id, json!({ "contents": "docs" }));
    // A duplicate response for the same id must be discarded.
    respond(&tx, id, json!({ "contents": "dupe" }));
    client.poll().unwrap();
    assert_eq!(seen.borrow().len(), 1);
    assert!(seen.borrow()[0].contains("docs"));
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn ids_are_monotonically_increasing() {
    let (mut client, _wire, _tx) = ready_client();
    let a = client.hover("file:///a.rs", 0, 0, None, None).unwrap();
    let b = client.definition("file:///a.rs", 0, 0, None, None).unwrap();
    let c = client.document_symbols("file:///a.rs", None, None).unwrap();
    assert!(a < b && b < c);
}

#[test]
fn protocol_error_passes_through_unchanged() {
    let (mut client, _wire, tx) = ready_client();
    let seen: Rc<RefCell<Option<ResponseOutcome>>> = Rc::default();
    let seen2 = Rc::clone(&seen);
    let id = client
        .rename(
            "file:///a.rs",
            3,
            4,
            "newName",
            Some(Box::new(move |o| *seen2.borrow_mut() = Some(o))),
            None,
        )
        .unwrap();
    tx.send(Inbound::Message(
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32602, "message": "bad params", "data": {"k": 1} },
        })
        .to_string(),
    ))
    .unwrap();
    client.poll().unwrap();
    match seen.borrow().as_ref().unwrap() {
        ResponseOutcome::Error(err) => {
            assert_eq!(err.code, -32602);
            assert_eq!(err.message, "bad params");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn cancel_drops_pending_and_discards_late_result() {
    let (mut client, wire, tx) = ready_client();
    let delivered = Rc::new(RefCell::new(0u32));
    let delivered2 = Rc::clone(&delivered);
    let id = client
        .hover(
            "file:///a.rs",
            0,
            0,
            Some(Box::new(move |_| *delivered2.borrow_mut() += 1)),
            None,
        )
        .unwrap();
    client.cancel(id).unwrap();
    assert_eq!(client.pending_count(), 0);
    let methods = wire.methods();
    assert!(methods.contains(&"$/cancelRequest".to_string()));
    respond(&tx, id, json!(null));
    client.poll().unwrap();
    assert_eq!(*delivered.borrow(), 0, "cancelled request gets no delivery");
}

#[test]
fn deadline_auto_cancels_with_single_timeout() {
    let (mut client, wire, _tx) = ready_client();
    let outcomes: Rc<RefCell<Vec<String>>> = Rc::default();
    let outcomes2 = Rc::clone(&outcomes);
    client
        .hover(
            "file:///a.rs",
            0,
            0,
            Some(Box::new(move |o| outcomes2.borrow_mut().push(format!("{o:?}")))),
            Some(Duration::from_millis(5)),
        )
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    client.poll().unwrap();
    client.poll().unwrap();
    assert_eq!(outcomes.borrow().len(), 1);
    assert!(outcomes.borrow()[0].contains("Timeout"));
    assert!(wire.methods().contains(&"$/cancelRequest".to_string()));
}

#[test]
fn poll_without_input_is_prompt_and_pure() {
    let (mut client, _wire, _tx) = ready_client();
    client.hover("file:///a.rs", 0, 0, None, None).unwrap();
    let before = client.pending_count();
    let started = std::time::Instant::now();
    client.poll().unwrap();
    assert!(started.elapsed() < Duration::from_millis(50));
    assert_eq!(client.pending_count(), before);
}

#[test]
fn notifications_dispatch_in_arrival_order() {
    let (mut client, _wire, tx) = ready_client();
    let order: Rc<RefCell<Vec<String>>> = Rc::default();
    let order2 = Rc::clone(&order);
    client.set_notification_handler(Box::new(move |method, params| {
        order2
            .borrow_mut()
            .push(format!("{method}:{}", params["n"]));
    }));
    for n in 0..3 {
        tx.send(Inbound::Message(
            json!({
                "jsonrpc": "2.0",
                "method": "textDocument/publishDiagnostics",
                "params": { "n": n },
            })
            .to_string(),
        ))
        .unwrap();
    }
    client.poll().unwrap();
    assert_eq!(
        order.borrow().as_slice(),
        &[
            "textDocument/publishDiagnostics:0",
            "textDocument/publishDiagnostics:1",
            "textDocument/publishDiagnostics:2"
        ]
    );
}

#[test]
fn stream_end_fails_pending_with_server_crashed() {
    let (mut client, _wire, tx) = ready_client();
    let outcome: Rc<RefCell<Option<String>>> = Rc::default();
    let outcome2 = Rc::clone(&outcome);
    client
        .hover(
            "file:///a.rs",
            0,
            0,
            Some(Box::new(move |o| {
                *outcome2.borrow_mut() = Some(format!("{o:?}"));
            })),
            None,
        )
        .unwrap();
    tx.send(Inbound::Closed).unwrap();
    client.poll().unwrap();
    assert_eq!(client.state(), LifecycleState::Terminated);
    assert!(outcome.borrow().as_ref().unwrap().contains("ServerCrashed"));
}

#[test]
fn malformed_stream_tears_down_with_error() {
    let (mut client, _wire, tx) = ready_client();
    tx.send(Inbound::Malformed("missing Content-Length".to_string()))
        .unwrap();
    let err = client.poll().unwrap_err();
    assert!(matches!(err, LspError::MalformedMessage(_)));
    assert_eq!(client.state(), LifecycleState::Terminated);
}

#[test]
fn document_lifecycle_notifications_have_no_pending_entries() {
    let (mut client, wire, _tx) = ready_client();
    client
        .open_document("file:///a.rs", "rust", 1, "fn main() {}")
        .unwrap();
    client
        .change_document("file:///a.rs", 2, json!([{ "text": "fn main() { }" }]))
        .unwrap();
    client.save_document("file:///a.rs", None).unwrap();
    client.close_document("file:///a.rs").unwrap();
    assert_eq!(client.pending_count(), 0);
    let methods = wire.methods();
    assert!(methods.contains(&"textDocument/didOpen".to_string()));
    assert!(methods.contains(&"textDocument/didClose".to_string()));
}

#[test]
fn document_tracker_opens_once_and_versions_changes() {
    let (mut client, wire, _tx) = ready_client();
    let mut tracker = core_lsp::DocumentTracker::new();
    tracker
        .ensure_open(&mut client, "file:///a.rs", "rust", "fn main() {}")
        .unwrap();
    tracker
        .ensure_open(&mut client, "file:///a.rs", "rust", "fn main() {}")
        .unwrap();
    tracker
        .change_full(&mut client, "file:///a.rs", "fn main() { }")
        .unwrap();
    tracker
        .change_full(&mut client, "file:///a.rs", "fn main() {  }")
        .unwrap();
    tracker.close(&mut client, "file:///a.rs").unwrap();

    let bodies = wire.bodies();
    let opens = bodies
        .iter()
        .filter(|b| b["method"] == "textDocument/didOpen")
        .count();
    assert_eq!(opens, 1, "second ensure_open is a no-op");
    let versions: Vec<i64> = bodies
        .iter()
        .filter(|b| b["method"] == "textDocument/didChange")
        .map(|b| b["params"]["textDocument"]["version"].as_i64().unwrap())
        .collect();
    assert_eq!(versions, vec![2, 3]);
    assert!(!tracker.is_open("file:///a.rs"));
    // Changes to a closed document are silently dropped.
    tracker
        .change_full(&mut client, "file:///a.rs", "x")
        .unwrap();
    let changes_after = wire
        .bodies()
        .iter()
        .filter(|b| b["method"] == "textDocument/didChange")
        .count();
    assert_eq!(changes_after, 2);
}

#[test]
fn diagnostics_store_fed_by_notification_handler() {
    let (mut client, _wire, tx) = ready_client();
    let store = std::rc::Rc::new(std::cell::RefCell::new(core_lsp::DiagnosticsStore::new()));
    let sink = std::rc::Rc::clone(&store);
    client.set_notification_handler(Box::new(move |method, params| {
        if method == "textDocument/publishDiagnostics" {
            sink.borrow_mut().apply_publish(params);
        }
    }));
    tx.send(Inbound::Message(
        json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": "file:///a.rs",
                "diagnostics": [{
                    "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 3 } },
                    "severity": 1,
                    "message": "oh no",
                }],
            },
        })
        .to_string(),
    ))
    .unwrap();
    client.poll().unwrap();
    let store = store.borrow();
    let diags = store.for_uri("file:///a.rs");
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].message, "oh no");
    assert_eq!(diags[0].severity, core_lsp::Severity::Error);
}

#[test]
fn shutdown_sends_request_then_exit() {
    let (mut client, wire, _tx) = ready_client();
    client.shutdown().unwrap();
    assert_eq!(client.state(), LifecycleState::ShuttingDown);
    let methods = wire.methods();
    let shutdown_pos = methods.iter().position(|m| m == "shutdown");
    let exit_pos = methods.iter().position(|m| m == "exit");
    assert!(shutdown_pos.is_some() && exit_pos.is_some());
    assert!(shutdown_pos < exit_pos);
}
