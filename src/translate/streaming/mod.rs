//! Streaming translation between Responses and Messages SSE event sequences.
//!
//! Translators are plain state machines fed one event at a time. The frame
//! level [`DirectionalTranslator`] wraps either direction behind SSE frames,
//! and [`stream_convert`] / [`TranslateIter`] drive it lazily over async
//! streams and iterators respectively.

mod to_messages;
mod to_responses;

pub use to_messages::ResponsesToMessagesStream;
pub use to_responses::MessagesToResponsesStream;

use std::collections::VecDeque;

use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::error::{TranslateError, TranslateResult};
use crate::translate::messages_types::MessagesStreamEvent;
use crate::translate::responses_types::ResponsesStreamEvent;
use crate::translate::sse::SseFrame;
use crate::translate::{ConvertOptions, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

impl Phase {
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Errored | Phase::Cancelled)
    }
}

/// A translator for one stream, in either direction, speaking SSE frames.
#[derive(Debug)]
pub enum DirectionalTranslator {
    ToMessages(ResponsesToMessagesStream),
    ToResponses(MessagesToResponsesStream),
}

impl DirectionalTranslator {
    pub fn new(direction: Direction, opts: &ConvertOptions) -> Self {
        match direction {
            Direction::ResponsesToMessages => {
                Self::ToMessages(ResponsesToMessagesStream::new(opts))
            }
            Direction::MessagesToResponses => {
                Self::ToResponses(MessagesToResponsesStream::new(opts))
            }
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::ToMessages(_) => Direction::ResponsesToMessages,
            Self::ToResponses(_) => Direction::MessagesToResponses,
        }
    }

    /// Translate one upstream frame. A `[DONE]` sentinel ends the stream.
    pub fn process_frame(&mut self, frame: &SseFrame) -> TranslateResult<Vec<SseFrame>> {
        if frame.is_done() {
            return self.finish();
        }
        if frame.data.trim().is_empty() {
            return Ok(Vec::new());
        }

        let payload = frame.payload().map_err(|e| {
            TranslateError::stream(format!("event is not valid JSON: {}", e), frame.data.clone())
        })?;

        match self {
            Self::ToMessages(t) => {
                let event: ResponsesStreamEvent =
                    serde_json::from_value(payload).map_err(|e| {
                        TranslateError::stream(
                            format!("malformed Responses event: {}", e),
                            frame.data.clone(),
                        )
                    })?;
                encode(t.process(&event)?, MessagesStreamEvent::event_name)
            }
            Self::ToResponses(t) => {
                let event: MessagesStreamEvent = serde_json::from_value(payload).map_err(|e| {
                    TranslateError::stream(
                        format!("malformed Messages event: {}", e),
                        frame.data.clone(),
                    )
                })?;
                encode(t.process(&event)?, ResponsesStreamEvent::event_name)
            }
        }
    }

    /// End of upstream input. Emits a synthesized terminal error if the
    /// stream never completed.
    pub fn finish(&mut self) -> TranslateResult<Vec<SseFrame>> {
        match self {
            Self::ToMessages(t) => encode(t.finish(), MessagesStreamEvent::event_name),
            Self::ToResponses(t) => encode(t.finish(), ResponsesStreamEvent::event_name),
        }
    }

    pub fn fail(&mut self, err: &TranslateError) -> TranslateResult<Vec<SseFrame>> {
        match self {
            Self::ToMessages(t) => encode(t.fail(err), MessagesStreamEvent::event_name),
            Self::ToResponses(t) => encode(t.fail(err), ResponsesStreamEvent::event_name),
        }
    }

    pub fn cancel(&mut self) {
        match self {
            Self::ToMessages(t) => t.cancel(),
            Self::ToResponses(t) => t.cancel(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            Self::ToMessages(t) => t.is_finished(),
            Self::ToResponses(t) => t.is_finished(),
        }
    }
}

fn encode<E: Serialize>(
    events: Vec<E>,
    name: fn(&E) -> &'static str,
) -> TranslateResult<Vec<SseFrame>> {
    events
        .iter()
        .map(|ev| {
            SseFrame::json(name(ev), ev).map_err(|e| {
                TranslateError::stream(format!("failed to encode event: {}", e), name(ev))
            })
        })
        .collect()
}

/// Lazily translate a stream of upstream frames.
///
/// A translation or transport error closes any open blocks, yields a
/// terminal error frame and ends the stream; frames already yielded are
/// never retracted. Dropping the returned stream abandons the translation.
pub fn stream_convert<S>(
    direction: Direction,
    frames: S,
    opts: ConvertOptions,
) -> impl Stream<Item = SseFrame> + Send
where
    S: Stream<Item = TranslateResult<SseFrame>> + Send + 'static,
{
    async_stream::stream! {
        let mut translator = DirectionalTranslator::new(direction, &opts);
        let mut frames = Box::pin(frames);

        while let Some(next) = frames.next().await {
            let result = next.and_then(|frame| translator.process_frame(&frame));
            match result {
                Ok(out) => {
                    for frame in out {
                        yield frame;
                    }
                }
                Err(err) => {
                    tracing::warn!(%direction, error = %err, "Stream translation failed");
                    for frame in translator.fail(&err).unwrap_or_default() {
                        yield frame;
                    }
                }
            }
            if translator.is_finished() {
                break;
            }
        }

        if !translator.is_finished() {
            tracing::debug!(%direction, "Upstream ended before a terminal event");
            for frame in translator.finish().unwrap_or_default() {
                yield frame;
            }
        }
    }
}

/// Synchronous counterpart of [`stream_convert`] over an iterator of frames.
pub struct TranslateIter<I> {
    inner: I,
    translator: DirectionalTranslator,
    pending: VecDeque<SseFrame>,
    done: bool,
}

impl<I> TranslateIter<I>
where
    I: Iterator<Item = TranslateResult<SseFrame>>,
{
    pub fn new(direction: Direction, inner: I, opts: &ConvertOptions) -> Self {
        Self {
            inner,
            translator: DirectionalTranslator::new(direction, opts),
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Stop translating; buffered output is discarded.
    pub fn cancel(&mut self) {
        self.translator.cancel();
        self.pending.clear();
        self.done = true;
    }
}

impl<I> Iterator for TranslateIter<I>
where
    I: Iterator<Item = TranslateResult<SseFrame>>,
{
    type Item = SseFrame;

    fn next(&mut self) -> Option<SseFrame> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            if self.done {
                return None;
            }

            let produced = match self.inner.next() {
                Some(next) => match next.and_then(|frame| self.translator.process_frame(&frame)) {
                    Ok(out) => out,
                    Err(err) => {
                        tracing::warn!(error = %err, "Stream translation failed");
                        self.translator.fail(&err).unwrap_or_default()
                    }
                },
                None => {
                    self.done = true;
                    self.translator.finish().unwrap_or_default()
                }
            };
            if self.translator.is_finished() {
                self.done = true;
            }
            self.pending.extend(produced);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn frame(value: Value) -> TranslateResult<SseFrame> {
        let name = value["type"].as_str().unwrap_or_default().to_string();
        Ok(SseFrame::new(name, value.to_string()))
    }

    fn event_names(frames: &[SseFrame]) -> Vec<String> {
        frames.iter().map(|f| f.event.clone().unwrap_or_default()).collect()
    }

    fn text_upstream() -> Vec<TranslateResult<SseFrame>> {
        vec![
            frame(json!({"type": "response.created", "response": {"id": "resp_1", "model": "gpt-4.1"}})),
            frame(json!({"type": "response.output_item.added", "output_index": 0,
                         "item": {"type": "message", "id": "msg_1", "content": []}})),
            frame(json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "Hi"})),
            frame(json!({"type": "response.completed",
                         "response": {"id": "resp_1", "status": "completed", "output": [],
                                      "usage": {"input_tokens": 3, "output_tokens": 1, "total_tokens": 4}}})),
        ]
    }

    #[test]
    fn test_iterator_translates_frames() {
        let frames: Vec<SseFrame> = TranslateIter::new(
            Direction::ResponsesToMessages,
            text_upstream().into_iter(),
            &ConvertOptions::default(),
        )
        .collect();
        assert_eq!(
            event_names(&frames),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );
        let usage_frames = frames
            .iter()
            .filter(|f| f.data.contains("\"usage\"") && f.event.as_deref() == Some("message_delta"))
            .count();
        assert_eq!(usage_frames, 1);
    }

    #[test]
    fn test_malformed_frame_emits_error_and_stops() {
        let mut upstream = text_upstream();
        upstream.insert(3, Ok(SseFrame::new("response.output_text.delta", "{not json")));
        let frames: Vec<SseFrame> = TranslateIter::new(
            Direction::ResponsesToMessages,
            upstream.into_iter(),
            &ConvertOptions::default(),
        )
        .collect();
        assert_eq!(
            event_names(&frames),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "error"
            ]
        );
        let error: Value = serde_json::from_str(&frames[4].data).unwrap();
        assert_eq!(error["type"], "error");
    }

    #[test]
    fn test_transport_error_is_terminal() {
        let upstream = vec![
            text_upstream().remove(0),
            Err(TranslateError::interrupted("connection reset")),
        ];
        let frames: Vec<SseFrame> = TranslateIter::new(
            Direction::ResponsesToMessages,
            upstream.into_iter(),
            &ConvertOptions::default(),
        )
        .collect();
        assert_eq!(event_names(&frames), vec!["message_start", "error"]);
    }

    #[test]
    fn test_stream_convert_messages_to_responses() {
        let upstream = vec![
            frame(json!({"type": "message_start", "message": {"id": "msg_1", "model": "claude",
                          "usage": {"input_tokens": 4, "output_tokens": 0}}})),
            frame(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
            frame(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "ok"}})),
            frame(json!({"type": "content_block_stop", "index": 0})),
            frame(json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 1}})),
            frame(json!({"type": "message_stop"})),
        ];
        let frames: Vec<SseFrame> = tokio_test::block_on(
            stream_convert(
                Direction::MessagesToResponses,
                futures::stream::iter(upstream),
                ConvertOptions::default(),
            )
            .collect(),
        );
        let names = event_names(&frames);
        assert_eq!(names.first().map(String::as_str), Some("response.created"));
        assert_eq!(names.last().map(String::as_str), Some("response.completed"));
        assert!(names.contains(&"response.output_text.delta".to_string()));
    }

    #[test]
    fn test_cancel_discards_pending_output() {
        let mut iter = TranslateIter::new(
            Direction::ResponsesToMessages,
            text_upstream().into_iter(),
            &ConvertOptions::default(),
        );
        assert_eq!(iter.next().and_then(|f| f.event), Some("message_start".to_string()));
        iter.cancel();
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_done_sentinel_finishes_stream() {
        let mut translator =
            DirectionalTranslator::new(Direction::ResponsesToMessages, &ConvertOptions::default());
        translator
            .process_frame(&SseFrame::new(
                "response.created",
                json!({"type": "response.created", "response": {}}).to_string(),
            ))
            .unwrap();
        let out = translator.process_frame(&SseFrame::done()).unwrap();
        assert_eq!(event_names(&out), vec!["error"]);
        assert!(translator.is_finished());
    }
}
