//! Transport bridge: one reader thread per server turning the child's
//! stdout into framed messages on a bounded channel.
//!
//! This is how "non-blocking reads" are realized on plain pipes: the
//! blocking read lives on the reader thread, and the event loop's `poll()`
//! only ever does `try_recv`, so it returns promptly whether or not a
//! complete message has arrived.

use std::io::{BufReader, Read};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, warn};

use crate::framing;

/// Channel capacity per server; a chatty server parks its reader thread
/// rather than ballooning memory.
pub const TRANSPORT_CHANNEL_CAP: usize = 256;

/// What the reader thread delivers.
#[derive(Debug)]
pub enum Inbound {
    Message(String),
    /// Framing violation; connection must be torn down.
    Malformed(String),
    /// EOF: the server closed its end.
    Closed,
}

/// Spawn the reader thread over a server's stdout.
pub fn spawn_reader(
    server: String,
    stream: impl Read + Send + 'static,
) -> (Receiver<Inbound>, JoinHandle<()>) {
    let (tx, rx) = bounded(TRANSPORT_CHANNEL_CAP);
    let handle = std::thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        loop {
            match framing::read_message(&mut reader) {
                Ok(Some(body)) => {
                    debug!(target: "lsp.transport", server = %server, bytes = body.len(), "message_in");
                    if tx.send(Inbound::Message(body)).is_err() {
                        break; // client dropped
                    }
                }
                Ok(None) => {
                    let _ = tx.send(Inbound::Closed);
                    break;
                }
                Err(err) => {
                    warn!(target: "lsp.transport", server = %server, error = %err, "malformed_frame");
                    let _ = tx.send(Inbound::Malformed(err.to_string()));
                    break;
                }
            }
        }
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reader_delivers_then_closes() {
        let mut wire = Vec::new();
        framing::write_message(&mut wire, "{\"n\":1}").unwrap();
        framing::write_message(&mut wire, "{\"n\":2}").unwrap();
        let (rx, handle) = spawn_reader("test".to_string(), Cursor::new(wire));
        assert!(matches!(rx.recv().unwrap(), Inbound::Message(m) if m == "{\"n\":1}"));
        assert!(matches!(rx.recv().unwrap(), Inbound::Message(m) if m == "{\"n\":2}"));
        assert!(matches!(rx.recv().unwrap(), Inbound::Closed));
        handle.join().unwrap();
    }

    #[test]
    fn malformed_stream_reports_and_stops() {
        let wire = b"Oops: no length\r\n\r\n{}".to_vec();
        let (rx, handle) = spawn_reader("test".to_string(), Cursor::new(wire));
        assert!(matches!(rx.recv().unwrap(), Inbound::Malformed(_)));
        handle.join().unwrap();
    }
}
