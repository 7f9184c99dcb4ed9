//! Wire types and the stateful frame decoder for the assistant's streaming
//! protocol.
//!
//! The server answers a chat request with a chunked body of newline-delimited
//! records. A record is only meaningful when it carries a fixed data prefix
//! (`"data: "` by default); the remainder is a JSON object with a `type`
//! discriminator. Everything else on the wire is ignored.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// JSON body of a chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    /// Client-generated session identifier.
    pub id: String,
    /// Server-assigned thread identifier; empty on the first message.
    pub thread_id: String,
}

/// One decoded protocol event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        #[serde(default)]
        thread_id: Option<String>,
    },
    Chunk {
        content: String,
    },
    End {
        #[serde(default)]
        thread_id: Option<String>,
        #[serde(default)]
        full_response: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Frame format
// ---------------------------------------------------------------------------

/// Data-frame prefix and record delimiter.
///
/// The server has shipped both `\n` and `\n\n` as the record delimiter at
/// different points, so neither is hard-coded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFormat {
    pub prefix: String,
    pub delimiter: Vec<u8>,
}

impl Default for FrameFormat {
    fn default() -> Self {
        FrameFormat {
            prefix: "data: ".to_string(),
            delimiter: b"\n".to_vec(),
        }
    }
}

impl FrameFormat {
    pub fn new(prefix: impl Into<String>, delimiter: impl Into<Vec<u8>>) -> Self {
        let delimiter = delimiter.into();
        // An empty delimiter would never terminate a record.
        let delimiter = if delimiter.is_empty() {
            b"\n".to_vec()
        } else {
            delimiter
        };
        FrameFormat {
            prefix: prefix.into(),
            delimiter,
        }
    }
}

// ---------------------------------------------------------------------------
// Frame decoder
// ---------------------------------------------------------------------------

/// Incremental decoder from raw network bytes to [`StreamEvent`]s.
///
/// Reads arrive in arbitrary slices: a record may span two reads, and a
/// multi-byte UTF-8 character may be split across a read boundary. Bytes are
/// buffered until a full delimiter-terminated record is present, so both
/// cases decode correctly. One malformed record never aborts the stream;
/// it is logged and skipped.
#[derive(Debug)]
pub struct FrameDecoder {
    format: FrameFormat,
    buf: Vec<u8>,
    /// Offset below which the buffer is known to hold no delimiter, so a
    /// long undelimited record fed in small reads is never rescanned from
    /// the start.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new(format: FrameFormat) -> Self {
        FrameDecoder {
            format,
            buf: Vec::new(),
            scanned: 0,
        }
    }

    /// Feed one network read and drain every complete record it unlocked.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = find_delimiter(&self.buf[self.scanned..], &self.format.delimiter)
            .map(|p| p + self.scanned)
        {
            let record: Vec<u8> = self.buf.drain(..pos + self.format.delimiter.len()).collect();
            let record = &record[..pos];
            self.scanned = 0;
            if let Some(event) = self.decode_record(record) {
                events.push(event);
            }
        }
        // Back off by delimiter.len() - 1 so a delimiter split across two
        // reads is still found.
        self.scanned = self
            .buf
            .len()
            .saturating_sub(self.format.delimiter.len().saturating_sub(1));
        events
    }

    /// Signal end-of-stream. A trailing undelimited partial record cannot be
    /// a complete frame and is discarded.
    pub fn finish(&mut self) {
        if !self.buf.is_empty() {
            debug!(
                bytes = self.buf.len(),
                "discarding partial record at end of stream"
            );
            self.buf.clear();
        }
        self.scanned = 0;
    }

    /// Bytes currently buffered without a terminating delimiter.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    fn decode_record(&self, record: &[u8]) -> Option<StreamEvent> {
        let line = match std::str::from_utf8(record) {
            Ok(s) => s.trim(),
            Err(e) => {
                warn!(error = %e, "skipping record with invalid UTF-8");
                return None;
            }
        };

        // Blank lines and records without the data prefix carry no payload.
        let payload = match line.strip_prefix(self.format.prefix.as_str()) {
            Some(rest) => rest,
            None => {
                if !line.is_empty() {
                    debug!(line, "ignoring record without data prefix");
                }
                return None;
            }
        };

        match serde_json::from_str::<StreamEvent>(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, payload, "skipping malformed data frame");
                None
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        FrameDecoder::new(FrameFormat::default())
    }
}

fn find_delimiter(buf: &[u8], delimiter: &[u8]) -> Option<usize> {
    if buf.len() < delimiter.len() {
        return None;
    }
    buf.windows(delimiter.len()).position(|w| w == delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> FrameDecoder {
        FrameDecoder::default()
    }

    #[test]
    fn test_chat_request_serializes_all_fields() {
        let req = ChatRequest {
            message: "hello".to_string(),
            id: "sess-1".to_string(),
            thread_id: "thr-9".to_string(),
        };
        let json = serde_json::to_string(&req).expect("serialize");
        let v: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(v["message"], "hello");
        assert_eq!(v["id"], "sess-1");
        assert_eq!(v["thread_id"], "thr-9");
    }

    #[test]
    fn test_start_event_deserializes() {
        let ev: StreamEvent =
            serde_json::from_str(r#"{"type":"start","thread_id":"t1"}"#).expect("deser");
        assert_eq!(
            ev,
            StreamEvent::Start {
                thread_id: Some("t1".to_string())
            }
        );
    }

    #[test]
    fn test_start_event_thread_id_optional() {
        let ev: StreamEvent = serde_json::from_str(r#"{"type":"start"}"#).expect("deser");
        assert_eq!(ev, StreamEvent::Start { thread_id: None });
    }

    #[test]
    fn test_chunk_event_requires_content() {
        assert!(serde_json::from_str::<StreamEvent>(r#"{"type":"chunk"}"#).is_err());
    }

    #[test]
    fn test_end_event_all_fields_optional() {
        let ev: StreamEvent = serde_json::from_str(r#"{"type":"end"}"#).expect("deser");
        assert_eq!(
            ev,
            StreamEvent::End {
                thread_id: None,
                full_response: None
            }
        );
    }

    #[test]
    fn test_unknown_type_is_error() {
        assert!(serde_json::from_str::<StreamEvent>(r#"{"type":"ping"}"#).is_err());
    }

    // -- decoder: whole records --

    #[test]
    fn test_decode_single_chunk_record() {
        let mut d = decoder();
        let events = d.push(b"data: {\"type\":\"chunk\",\"content\":\"hi\"}\n");
        assert_eq!(
            events,
            vec![StreamEvent::Chunk {
                content: "hi".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_multiple_records_in_one_read() {
        let mut d = decoder();
        let events = d.push(
            b"data: {\"type\":\"start\"}\ndata: {\"type\":\"chunk\",\"content\":\"a\"}\n",
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Start { .. }));
    }

    #[test]
    fn test_record_split_across_reads() {
        let mut d = decoder();
        assert!(d.push(b"data: {\"type\":\"chunk\",").is_empty());
        let events = d.push(b"\"content\":\"xy\"}\n");
        assert_eq!(
            events,
            vec![StreamEvent::Chunk {
                content: "xy".to_string()
            }]
        );
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        // "é" is 0xC3 0xA9. Split it between two network reads.
        let full = "data: {\"type\":\"chunk\",\"content\":\"café\"}\n".as_bytes();
        let split = full.len() - 4; // inside the é
        let mut d = decoder();
        assert!(d.push(&full[..split]).is_empty());
        let events = d.push(&full[split..]);
        assert_eq!(
            events,
            vec![StreamEvent::Chunk {
                content: "café".to_string()
            }]
        );
    }

    #[test]
    fn test_malformed_frame_skipped_not_fatal() {
        let mut d = decoder();
        let events = d.push(
            b"data: {\"type\":\"chunk\",\"content\":\"a\"}\ndata: {nonsense\ndata: {\"type\":\"chunk\",\"content\":\"b\"}\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            StreamEvent::Chunk {
                content: "b".to_string()
            }
        );
    }

    #[test]
    fn test_line_without_prefix_ignored() {
        let mut d = decoder();
        let events = d.push(b"event: noise\ndata: {\"type\":\"start\"}\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let mut d = decoder();
        let events = d.push(b"\n\ndata: {\"type\":\"start\"}\n\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_invalid_utf8_record_skipped() {
        let mut d = decoder();
        let mut bytes = b"data: ".to_vec();
        bytes.extend_from_slice(&[0xFF, 0xFE]);
        bytes.push(b'\n');
        bytes.extend_from_slice(b"data: {\"type\":\"chunk\",\"content\":\"ok\"}\n");
        let events = d.push(&bytes);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_finish_discards_trailing_partial() {
        let mut d = decoder();
        d.push(b"data: {\"type\":\"chunk\",\"content\":\"tail");
        assert!(d.pending_bytes() > 0);
        d.finish();
        assert_eq!(d.pending_bytes(), 0);
    }

    #[test]
    fn test_double_newline_delimiter() {
        let mut d = FrameDecoder::new(FrameFormat::new("data: ", b"\n\n".to_vec()));
        // With a blank-line delimiter, a single newline does not end a record.
        assert!(d.push(b"data: {\"type\":\"start\"}\n").is_empty());
        let events = d.push(b"\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_long_record_fed_in_small_reads_decodes_once_terminated() {
        let mut d = decoder();
        let content = "z".repeat(4096);
        let record = format!("data: {{\"type\":\"chunk\",\"content\":\"{content}\"}}\n");
        let bytes = record.as_bytes();
        let mut events = Vec::new();
        for piece in bytes.chunks(7) {
            events.extend(d.push(piece));
        }
        assert_eq!(
            events,
            vec![StreamEvent::Chunk { content }]
        );
        assert_eq!(d.pending_bytes(), 0);
    }

    #[test]
    fn test_blank_line_delimiter_split_across_three_reads() {
        let mut d = FrameDecoder::new(FrameFormat::new("data: ", b"\n\n".to_vec()));
        assert!(d.push(b"data: {\"type\":\"chunk\",\"content\":\"q\"}").is_empty());
        assert!(d.push(b"\n").is_empty());
        let events = d.push(b"\ndata: {\"type\":\"end\"}\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            StreamEvent::Chunk {
                content: "q".to_string()
            }
        );
    }

    #[test]
    fn test_push_after_finish_starts_clean() {
        let mut d = decoder();
        d.push(b"data: {\"type\":\"chunk\",\"content\":\"dropped");
        d.finish();
        let events = d.push(b"data: {\"type\":\"start\"}\n");
        assert_eq!(events, vec![StreamEvent::Start { thread_id: None }]);
    }

    #[test]
    fn test_custom_prefix() {
        let mut d = FrameDecoder::new(FrameFormat::new("frame|", b"\n".to_vec()));
        let events = d.push(b"frame|{\"type\":\"chunk\",\"content\":\"z\"}\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_empty_delimiter_falls_back_to_newline() {
        let fmt = FrameFormat::new("data: ", Vec::new());
        assert_eq!(fmt.delimiter, b"\n".to_vec());
    }

    #[test]
    fn test_end_with_full_response_deserializes() {
        let ev: StreamEvent = serde_json::from_str(
            r#"{"type":"end","thread_id":"t2","full_response":"final text"}"#,
        )
        .expect("deser");
        assert_eq!(
            ev,
            StreamEvent::End {
                thread_id: Some("t2".to_string()),
                full_response: Some("final text".to_string()),
            }
        );
    }
}
