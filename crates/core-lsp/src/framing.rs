//! Base-protocol framing: a UTF-8 header block (`Content-Length` required,
//! unknown headers ignored), an empty line, then exactly N body bytes.

use std::io::{BufRead, Write};

use crate::{LspError, Result};

/// Write one framed message. No `Content-Type` header is emitted; the
/// default (utf-8 JSON) is what we always send.
pub fn write_message(out: &mut dyn Write, body: &str) -> std::io::Result<()> {
    write!(out, "Content-Length: {}\r\n\r\n", body.len())?;
    out.write_all(body.as_bytes())?;
    out.flush()
}

/// Read one framed message, blocking until it is complete.
///
/// Returns `Ok(None)` on a clean EOF at a message boundary. Any framing
/// defect (missing `Content-Length`, truncated body, non-UTF-8 payload) is
/// `MalformedMessage`; the caller tears the connection down.
pub fn read_message(reader: &mut dyn BufRead) -> Result<Option<String>> {
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut saw_header = false;
    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| LspError::MalformedMessage(e.to_string()))?;
        if n == 0 {
            return if saw_header {
                Err(LspError::MalformedMessage(
                    "connection closed mid-headers".to_string(),
                ))
            } else {
                Ok(None)
            };
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break; // end of headers
        }
        saw_header = true;
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let parsed = value.trim().parse::<usize>().map_err(|_| {
                    LspError::MalformedMessage(format!("bad Content-Length '{}'", value.trim()))
                })?;
                content_length = Some(parsed);
            }
            // Unknown headers (Content-Type and friends) are ignored.
        } else {
            return Err(LspError::MalformedMessage(format!(
                "header without ':': '{trimmed}'"
            )));
        }
    }
    let len =
        content_length.ok_or_else(|| LspError::MalformedMessage("missing Content-Length".to_string()))?;
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .map_err(|e| LspError::MalformedMessage(format!("truncated body: {e}")))?;
    let text = String::from_utf8(body)
        .map_err(|_| LspError::MalformedMessage("body is not UTF-8".to_string()))?;
    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    fn round_trip(body: &str) -> String {
        let mut wire = Vec::new();
        write_message(&mut wire, body).unwrap();
        let mut reader = BufReader::new(Cursor::new(wire));
        read_message(&mut reader).unwrap().unwrap()
    }

    #[test]
    fn encode_then_decode_is_identity() {
        for body in [
            "{}",
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "{\"text\":\"multi\\nline – ünïcode\"}",
        ] {
            assert_eq!(round_trip(body), body);
        }
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let body = "{\"s\":\"é\"}";
        let mut wire = Vec::new();
        write_message(&mut wire, body).unwrap();
        let header = String::from_utf8_lossy(&wire);
        assert!(header.starts_with(&format!("Content-Length: {}\r\n\r\n", body.len())));
    }

    #[test]
    fn unknown_headers_are_ignored() {
        let wire = b"Content-Type: application/vscode-jsonrpc\r\nContent-Length: 2\r\nX-Custom: yes\r\n\r\n{}".to_vec();
        let mut reader = BufReader::new(Cursor::new(wire));
        assert_eq!(read_message(&mut reader).unwrap().unwrap(), "{}");
    }

    #[test]
    fn missing_content_length_is_malformed() {
        let wire = b"Content-Type: application/json\r\n\r\n{}".to_vec();
        let mut reader = BufReader::new(Cursor::new(wire));
        assert!(matches!(
            read_message(&mut reader),
            Err(LspError::MalformedMessage(_))
        ));
    }

    #[test]
    fn non_utf8_body_is_malformed() {
        let mut wire = b"Content-Length: 2\r\n\r\n".to_vec();
        wire.extend_from_slice(&[0xFF, 0xFE]);
        let mut reader = BufReader::new(Cursor::new(wire));
        assert!(matches!(
            read_message(&mut reader),
            Err(LspError::MalformedMessage(_))
        ));
    }

    #[test]
    fn clean_eof_yields_none() {
        let mut reader = BufReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn two_messages_back_to_back() {
        let mut wire = Vec::new();
        write_message(&mut wire, "{\"a\":1}").unwrap();
        write_message(&mut wire, "{\"b\":2}").unwrap();
        let mut reader = BufReader::new(Cursor::new(wire));
        assert_eq!(read_message(&mut reader).unwrap().unwrap(), "{\"a\":1}");
        assert_eq!(read_message(&mut reader).unwrap().unwrap(), "{\"b\":2}");
        assert!(read_message(&mut reader).unwrap().is_none());
    }
}
