//! Server-sent event framing shared by both protocols.
//!
//! [`SseDecoder`] turns arbitrary byte chunks into complete [`SseFrame`]s,
//! holding back a partial trailing frame until the rest of it arrives.
//! [`SseFrame::to_wire`] is the inverse.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::error::{TranslateError, TranslateResult};

/// Upper bound on bytes buffered for a single incomplete frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

const DONE_SENTINEL: &str = "[DONE]";

/// One decoded event: optional name, `data` lines joined with `\n`, optional id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            id: None,
        }
    }

    pub fn data_only(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
            id: None,
        }
    }

    /// Serialize `payload` as the data of a frame named `event`.
    pub fn json<T: Serialize>(event: &str, payload: &T) -> serde_json::Result<Self> {
        Ok(Self::new(event, serde_json::to_string(payload)?))
    }

    pub fn done() -> Self {
        Self::data_only(DONE_SENTINEL)
    }

    /// The OpenAI-style `data: [DONE]` terminator.
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }

    /// Parse `data` as JSON, filling in `type` from the event name when the
    /// payload omits it.
    pub fn payload(&self) -> serde_json::Result<Value> {
        let mut value: Value = serde_json::from_str(&self.data)?;
        if let (Some(event), Value::Object(map)) = (&self.event, &mut value) {
            map.entry("type")
                .or_insert_with(|| Value::String(event.clone()));
        }
        Ok(value)
    }

    pub fn to_wire(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);
        if let Some(ref event) = self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        if let Some(ref id) = self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Incremental SSE parser, tolerant of frames split across reads.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes,
        }
    }

    /// Feed bytes, returning every frame they complete.
    pub fn push(&mut self, chunk: &[u8]) -> TranslateResult<Vec<SseFrame>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some((frame_end, next)) = find_frame_end(&self.buffer[start..]) {
            if let Some(frame) = parse_frame(&self.buffer[start..start + frame_end])? {
                frames.push(frame);
            }
            start += next;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_frame_bytes {
            let len = self.buffer.len();
            self.buffer.clear();
            return Err(TranslateError::framing(format!(
                "incomplete frame of {} bytes exceeds the {} byte limit",
                len, self.max_frame_bytes
            )));
        }

        Ok(frames)
    }

    /// Flush a trailing frame the peer never terminated with a blank line.
    pub fn finish(&mut self) -> TranslateResult<Option<SseFrame>> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        parse_frame(&rest)
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Locate the first blank line. Returns (frame length, bytes to consume).
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    // A blank line at the very start terminates an empty frame.
    if buf.starts_with(b"\n") {
        return Some((0, 1));
    }
    if buf.starts_with(b"\r\n") {
        return Some((0, 2));
    }
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match buf.get(i + 1) {
                Some(b'\n') => return Some((i, i + 2)),
                Some(b'\r') => match buf.get(i + 2) {
                    Some(b'\n') => return Some((i, i + 3)),
                    Some(_) => {}
                    None => return None,
                },
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn parse_frame(raw: &[u8]) -> TranslateResult<Option<SseFrame>> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| TranslateError::framing(format!("frame is not valid UTF-8: {}", e)))?;

    let mut event: Option<String> = None;
    let mut id: Option<String> = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                if event.is_some() {
                    return Err(TranslateError::framing(format!(
                        "frame carries more than one event line: {}",
                        text
                    )));
                }
                event = Some(value.to_string());
            }
            "data" => data.push(value),
            "id" => id = Some(value.to_string()),
            // retry and unknown fields
            _ => {}
        }
    }

    if data.is_empty() {
        if let Some(name) = event {
            return Err(TranslateError::framing(format!(
                "event `{}` has no data line",
                name
            )));
        }
        return Ok(None);
    }

    Ok(Some(SseFrame {
        event,
        data: data.join("\n"),
        id,
    }))
}

/// Adapt a fallible byte stream (e.g. `reqwest::Response::bytes_stream`) into
/// a lazy stream of frames. Transport errors end the stream with
/// [`TranslateError::UpstreamInterrupted`].
pub fn decode_byte_stream<S, B, E>(
    bytes: S,
) -> impl Stream<Item = TranslateResult<SseFrame>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut failed = false;
        futures::pin_mut!(bytes);

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => match decoder.push(chunk.as_ref()) {
                    Ok(frames) => {
                        for frame in frames {
                            yield Ok(frame);
                        }
                    }
                    Err(e) => {
                        failed = true;
                        yield Err(e);
                        break;
                    }
                },
                Err(e) => {
                    failed = true;
                    yield Err(TranslateError::interrupted(e.to_string()));
                    break;
                }
            }
        }

        if !failed {
            match decoder.finish() {
                Ok(Some(frame)) => yield Ok(frame),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }
        }
    }
}

/// Encode frames back to wire bytes.
pub fn encode_frames<'a>(frames: impl IntoIterator<Item = &'a SseFrame>) -> Bytes {
    let mut out = String::new();
    for frame in frames {
        out.push_str(&frame.to_wire());
    }
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_split_across_reads() {
        let mut decoder = SseDecoder::new();
        let frames = decoder
            .push(b"event: response.output_text.delta\ndata: {\"delta\":")
            .unwrap();
        assert!(frames.is_empty());
        assert!(decoder.buffered_len() > 0);

        let frames = decoder.push(b"\"Hi\"}\n\nevent: ping\ndata: {}\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("response.output_text.delta"));
        assert_eq!(frames[0].data, "{\"delta\":\"Hi\"}");

        let frames = decoder.push(b"\n").unwrap();
        assert_eq!(frames, vec![SseFrame::new("ping", "{}")]);
    }

    #[test]
    fn test_crlf_comments_and_unknown_fields() {
        let mut decoder = SseDecoder::new();
        let frames = decoder
            .push(b": keep-alive\r\n\r\nevent: a\r\nretry: 10\r\nfoo: bar\r\ndata: 1\r\n\r\n")
            .unwrap();
        assert_eq!(frames, vec![SseFrame::new("a", "1")]);
    }

    #[test]
    fn test_crlf_terminator_split_between_reads() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: x\r\n\r").unwrap().is_empty());
        let frames = decoder.push(b"\n").unwrap();
        assert_eq!(frames, vec![SseFrame::data_only("x")]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: {\"a\":\ndata: 1}\n\n").unwrap();
        assert_eq!(frames[0].data, "{\"a\":\n1}");
        assert_eq!(frames[0].payload().unwrap()["a"], 1);
    }

    #[test]
    fn test_done_sentinel() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: [DONE]\n\n").unwrap();
        assert!(frames[0].is_done());
    }

    #[test]
    fn test_finish_flushes_unterminated_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: message_stop\ndata: {}").unwrap().is_empty());
        let frame = decoder.finish().unwrap().unwrap();
        assert_eq!(frame.event.as_deref(), Some("message_stop"));
        assert!(decoder.finish().unwrap().is_none());
    }

    #[test]
    fn test_framing_errors() {
        let mut decoder = SseDecoder::new();
        let err = decoder.push(b"event: a\nevent: b\ndata: {}\n\n").unwrap_err();
        assert!(matches!(err, TranslateError::Framing { .. }));

        let mut decoder = SseDecoder::new();
        let err = decoder.push(b"event: a\n\n").unwrap_err();
        assert!(matches!(err, TranslateError::Framing { .. }));

        let mut decoder = SseDecoder::new();
        let err = decoder.push(b"data: \xff\xfe\n\n").unwrap_err();
        assert!(matches!(err, TranslateError::Framing { .. }));

        let mut decoder = SseDecoder::with_max_frame_bytes(16);
        let err = decoder.push(&[b'x'; 32]).unwrap_err();
        assert!(matches!(err, TranslateError::Framing { .. }));
    }

    #[test]
    fn test_invalid_json_is_not_a_framing_error() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event: a\ndata: {not json\n\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload().is_err());
    }

    #[test]
    fn test_payload_injects_type_from_event_name() {
        let frame = SseFrame::new("message_stop", "{}");
        assert_eq!(frame.payload().unwrap()["type"], "message_stop");
        let frame = SseFrame::new("x", r#"{"type":"y"}"#);
        assert_eq!(frame.payload().unwrap()["type"], "y");
    }

    #[test]
    fn test_wire_encoding_decodes_back() {
        let frame = SseFrame::new("content_block_delta", "line one\nline two");
        let wire = frame.to_wire();
        assert_eq!(
            wire,
            "event: content_block_delta\ndata: line one\ndata: line two\n\n"
        );
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(wire.as_bytes()).unwrap(), vec![frame]);
    }

    #[test]
    fn test_decode_byte_stream_reports_interruption() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"a\":1}\n\ndata: {\"b\"".to_vec()),
            Err("connection reset".to_string()),
        ];
        let frames: Vec<_> = tokio_test::block_on(
            decode_byte_stream(futures::stream::iter(chunks)).collect::<Vec<_>>(),
        );
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(matches!(
            frames[1],
            Err(TranslateError::UpstreamInterrupted { .. })
        ));
    }
}
