//! State machine for translating Anthropic SSE events into OpenAI Responses stream events.
//!
//! Each Anthropic content block becomes one Responses output item. Output
//! indices follow the order in which blocks start, and every emitted event
//! carries a `sequence_number` counting up from zero.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;

use super::Phase;
use crate::error::{TranslateError, TranslateResult};
use crate::translate::messages_types::{
    Delta, DeltaUsage, ErrorBody, MessagesResponse, MessagesStreamEvent, ResponseContentBlock,
    StopReason, Usage,
};
use crate::translate::response::{
    map_stop_reason, new_item_id, response_id_from, usage_to_responses,
};
use crate::translate::responses_types::{
    FunctionCallItem, OutputContent, OutputItem, OutputMessage, ReasoningItem, ResponseError,
    ResponseStatus, ResponsesResponse, ResponsesStreamEvent, SummaryPart,
};
use crate::translate::ConvertOptions;

#[derive(Debug)]
enum OpenBlock {
    Text {
        item_id: String,
        output_index: usize,
        text: String,
    },
    Tool {
        item_id: String,
        output_index: usize,
        call_id: String,
        name: String,
        arguments: String,
    },
    Thinking {
        item_id: String,
        output_index: usize,
        text: String,
        signature: String,
    },
    Redacted {
        output_index: usize,
        item: ReasoningItem,
    },
    /// Block kinds with no Responses counterpart; deltas are dropped.
    Ignored,
}

/// Usage:
///   let mut translator = MessagesToResponsesStream::new(&ConvertOptions::default());
///   for event in anthropic_events {
///       for out in translator.process(&event)? { /* send */ }
///   }
#[derive(Debug)]
pub struct MessagesToResponsesStream {
    phase: Phase,
    sequence: u64,
    response_id: Option<String>,
    model: String,
    model_pinned: bool,
    created_at: i64,
    open: HashMap<usize, OpenBlock>,
    seen: HashSet<usize>,
    next_output_index: usize,
    output: BTreeMap<usize, OutputItem>,
    stop_reason: Option<StopReason>,
    stop_sequence: Option<String>,
    usage: Usage,
}

impl MessagesToResponsesStream {
    pub fn new(opts: &ConvertOptions) -> Self {
        Self {
            phase: Phase::Idle,
            sequence: 0,
            response_id: opts.message_id.as_deref().map(response_id_from),
            model: opts.model.clone().unwrap_or_else(|| "unknown".to_string()),
            model_pinned: opts.model.is_some(),
            created_at: chrono::Utc::now().timestamp(),
            open: HashMap::new(),
            seen: HashSet::new(),
            next_output_index: 0,
            output: BTreeMap::new(),
            stop_reason: None,
            stop_sequence: None,
            usage: Usage::default(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn process(
        &mut self,
        event: &MessagesStreamEvent,
    ) -> TranslateResult<Vec<ResponsesStreamEvent>> {
        if self.phase.is_terminal() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        match event {
            MessagesStreamEvent::MessageStart { message } => {
                self.ensure_started(Some(message), &mut out);
            }

            MessagesStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.ensure_started(None, &mut out);
                if !self.seen.insert(*index) {
                    return Err(malformed("content block index started twice", event));
                }
                self.start_block(*index, content_block, &mut out);
            }

            MessagesStreamEvent::ContentBlockDelta { index, delta } => {
                self.ensure_started(None, &mut out);
                self.apply_delta(*index, delta, event, &mut out)?;
            }

            MessagesStreamEvent::ContentBlockStop { index } => {
                self.ensure_started(None, &mut out);
                let block = self
                    .open
                    .remove(index)
                    .ok_or_else(|| malformed("stop for a content block that is not open", event))?;
                self.close_block(block, &mut out);
            }

            MessagesStreamEvent::MessageDelta { delta, usage } => {
                self.ensure_started(None, &mut out);
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                if delta.stop_sequence.is_some() {
                    self.stop_sequence = delta.stop_sequence.clone();
                }
                self.merge_usage(usage);
            }

            MessagesStreamEvent::MessageStop => {
                self.ensure_started(None, &mut out);
                self.close_all(&mut out);
                let response = self.final_response();
                let terminal = if response.status == ResponseStatus::Incomplete {
                    ResponsesStreamEvent::Incomplete {
                        response,
                        sequence_number: 0,
                    }
                } else {
                    ResponsesStreamEvent::Completed {
                        response,
                        sequence_number: 0,
                    }
                };
                self.emit(terminal, &mut out);
                self.finish_state(Phase::Completed);
            }

            MessagesStreamEvent::Error { error } => {
                self.emit_failure(error, &mut out);
            }

            MessagesStreamEvent::Ping | MessagesStreamEvent::Unknown => {}
        }
        Ok(out)
    }

    /// The upstream sequence ended; without `message_stop` the response fails.
    pub fn finish(&mut self) -> Vec<ResponsesStreamEvent> {
        self.fail(&TranslateError::interrupted(
            "upstream stream ended without message_stop",
        ))
    }

    pub fn fail(&mut self, err: &TranslateError) -> Vec<ResponsesStreamEvent> {
        if self.phase.is_terminal() {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.emit_failure(&err.to_error_response().error, &mut out);
        out
    }

    pub fn cancel(&mut self) {
        self.finish_state(Phase::Cancelled);
    }

    fn finish_state(&mut self, phase: Phase) {
        self.open.clear();
        self.output.clear();
        self.phase = phase;
    }

    fn emit(&mut self, mut event: ResponsesStreamEvent, out: &mut Vec<ResponsesStreamEvent>) {
        event.set_sequence_number(self.sequence);
        self.sequence += 1;
        out.push(event);
    }

    fn shell(&self, status: ResponseStatus) -> ResponsesResponse {
        ResponsesResponse {
            id: self.response_id.clone().unwrap_or_default(),
            object: "response".to_string(),
            created_at: self.created_at,
            status,
            model: self.model.clone(),
            output: Vec::new(),
            usage: None,
            incomplete_details: None,
            error: None,
            metadata: None,
        }
    }

    fn ensure_started(
        &mut self,
        message: Option<&MessagesResponse>,
        out: &mut Vec<ResponsesStreamEvent>,
    ) {
        if self.phase != Phase::Idle {
            return;
        }
        if let Some(msg) = message {
            if !self.model_pinned && !msg.model.is_empty() {
                self.model = msg.model.clone();
            }
            if self.response_id.is_none() && !msg.id.is_empty() {
                self.response_id = Some(response_id_from(&msg.id));
            }
            self.usage = msg.usage.clone();
        }
        if self.response_id.is_none() {
            self.response_id = Some(new_item_id("resp"));
        }

        let created = self.shell(ResponseStatus::InProgress);
        self.emit(
            ResponsesStreamEvent::Created {
                response: created.clone(),
                sequence_number: 0,
            },
            out,
        );
        self.emit(
            ResponsesStreamEvent::InProgress {
                response: created,
                sequence_number: 0,
            },
            out,
        );
        self.phase = Phase::Streaming;
    }

    fn start_block(
        &mut self,
        index: usize,
        block: &ResponseContentBlock,
        out: &mut Vec<ResponsesStreamEvent>,
    ) {
        if matches!(block, ResponseContentBlock::Unknown) {
            tracing::debug!(index, "Ignoring content block with no Responses counterpart");
            self.open.insert(index, OpenBlock::Ignored);
            return;
        }

        let output_index = self.next_output_index;
        self.next_output_index += 1;

        match block {
            ResponseContentBlock::Text { text } => {
                let item_id = new_item_id("msg");
                self.emit(
                    ResponsesStreamEvent::OutputItemAdded {
                        output_index,
                        item: OutputItem::Message(OutputMessage {
                            id: item_id.clone(),
                            role: "assistant".to_string(),
                            status: Some("in_progress".to_string()),
                            content: Vec::new(),
                        }),
                        sequence_number: 0,
                    },
                    out,
                );
                self.emit(
                    ResponsesStreamEvent::ContentPartAdded {
                        item_id: item_id.clone(),
                        output_index,
                        content_index: 0,
                        part: OutputContent::OutputText {
                            text: String::new(),
                            annotations: Vec::new(),
                        },
                        sequence_number: 0,
                    },
                    out,
                );
                if !text.is_empty() {
                    self.emit(text_delta(&item_id, output_index, text), out);
                }
                self.open.insert(
                    index,
                    OpenBlock::Text {
                        item_id,
                        output_index,
                        text: text.clone(),
                    },
                );
            }

            ResponseContentBlock::ToolUse { id, name, input } => {
                let item_id = new_item_id("fc");
                self.emit(
                    ResponsesStreamEvent::OutputItemAdded {
                        output_index,
                        item: OutputItem::FunctionCall(FunctionCallItem {
                            id: Some(item_id.clone()),
                            call_id: id.clone(),
                            name: name.clone(),
                            arguments: String::new(),
                            status: Some("in_progress".to_string()),
                        }),
                        sequence_number: 0,
                    },
                    out,
                );
                // Input normally arrives as input_json_delta; a populated start block
                // is sent whole.
                let arguments = match input {
                    Value::Object(map) if map.is_empty() => String::new(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                if !arguments.is_empty() {
                    self.emit(
                        ResponsesStreamEvent::FunctionCallArgumentsDelta {
                            item_id: item_id.clone(),
                            output_index,
                            delta: arguments.clone(),
                            sequence_number: 0,
                        },
                        out,
                    );
                }
                self.open.insert(
                    index,
                    OpenBlock::Tool {
                        item_id,
                        output_index,
                        call_id: id.clone(),
                        name: name.clone(),
                        arguments,
                    },
                );
            }

            ResponseContentBlock::Thinking { thinking, signature } => {
                let item_id = new_item_id("rs");
                self.emit(
                    ResponsesStreamEvent::OutputItemAdded {
                        output_index,
                        item: OutputItem::Reasoning(ReasoningItem {
                            id: item_id.clone(),
                            ..ReasoningItem::default()
                        }),
                        sequence_number: 0,
                    },
                    out,
                );
                self.emit(
                    ResponsesStreamEvent::ReasoningSummaryPartAdded {
                        item_id: item_id.clone(),
                        output_index,
                        summary_index: 0,
                        part: SummaryPart { text: String::new() },
                        sequence_number: 0,
                    },
                    out,
                );
                if !thinking.is_empty() {
                    self.emit(summary_delta(&item_id, output_index, thinking), out);
                }
                self.open.insert(
                    index,
                    OpenBlock::Thinking {
                        item_id,
                        output_index,
                        text: thinking.clone(),
                        signature: signature.clone(),
                    },
                );
            }

            ResponseContentBlock::RedactedThinking { data } => {
                let item = ReasoningItem {
                    id: new_item_id("rs"),
                    encrypted_content: Some(data.clone()),
                    ..ReasoningItem::default()
                };
                self.emit(
                    ResponsesStreamEvent::OutputItemAdded {
                        output_index,
                        item: OutputItem::Reasoning(item.clone()),
                        sequence_number: 0,
                    },
                    out,
                );
                self.open.insert(index, OpenBlock::Redacted { output_index, item });
            }

            ResponseContentBlock::Unknown => {}
        }
    }

    fn apply_delta(
        &mut self,
        index: usize,
        delta: &Delta,
        event: &MessagesStreamEvent,
        out: &mut Vec<ResponsesStreamEvent>,
    ) -> TranslateResult<()> {
        let block = match self.open.get_mut(&index) {
            Some(block) => block,
            None if self.seen.contains(&index) => {
                return Err(malformed("delta for a content block that is already closed", event));
            }
            None => {
                return Err(malformed("delta for a content block that was never started", event));
            }
        };

        let next = match (block, delta) {
            (OpenBlock::Ignored, _) | (_, Delta::Unknown) => None,
            (
                OpenBlock::Text {
                    item_id,
                    output_index,
                    text,
                },
                Delta::TextDelta { text: piece },
            ) => {
                text.push_str(piece);
                Some(text_delta(item_id, *output_index, piece))
            }
            (
                OpenBlock::Tool {
                    item_id,
                    output_index,
                    arguments,
                    ..
                },
                Delta::InputJsonDelta { partial_json },
            ) => {
                arguments.push_str(partial_json);
                Some(ResponsesStreamEvent::FunctionCallArgumentsDelta {
                    item_id: item_id.clone(),
                    output_index: *output_index,
                    delta: partial_json.clone(),
                    sequence_number: 0,
                })
            }
            (
                OpenBlock::Thinking {
                    item_id,
                    output_index,
                    text,
                    ..
                },
                Delta::ThinkingDelta { thinking },
            ) => {
                text.push_str(thinking);
                Some(summary_delta(item_id, *output_index, thinking))
            }
            (OpenBlock::Thinking { signature: sig, .. }, Delta::SignatureDelta { signature }) => {
                sig.push_str(signature);
                None
            }
            _ => return Err(malformed("delta type does not match the content block", event)),
        };

        if let Some(next) = next {
            if let ResponsesStreamEvent::OutputTextDelta { delta, .. }
            | ResponsesStreamEvent::FunctionCallArgumentsDelta { delta, .. }
            | ResponsesStreamEvent::ReasoningSummaryTextDelta { delta, .. } = &next
            {
                if delta.is_empty() {
                    return Ok(());
                }
            }
            self.emit(next, out);
        }
        Ok(())
    }

    fn close_block(&mut self, block: OpenBlock, out: &mut Vec<ResponsesStreamEvent>) {
        match block {
            OpenBlock::Text {
                item_id,
                output_index,
                text,
            } => {
                let part = OutputContent::OutputText {
                    text: text.clone(),
                    annotations: Vec::new(),
                };
                self.emit(
                    ResponsesStreamEvent::OutputTextDone {
                        item_id: item_id.clone(),
                        output_index,
                        content_index: 0,
                        text,
                        logprobs: Vec::new(),
                        sequence_number: 0,
                    },
                    out,
                );
                self.emit(
                    ResponsesStreamEvent::ContentPartDone {
                        item_id: item_id.clone(),
                        output_index,
                        content_index: 0,
                        part: part.clone(),
                        sequence_number: 0,
                    },
                    out,
                );
                let item = OutputItem::Message(OutputMessage {
                    id: item_id,
                    role: "assistant".to_string(),
                    status: Some("completed".to_string()),
                    content: vec![part],
                });
                self.finish_item(output_index, item, out);
            }

            OpenBlock::Tool {
                item_id,
                output_index,
                call_id,
                name,
                arguments,
            } => {
                let arguments = if arguments.is_empty() {
                    "{}".to_string()
                } else {
                    arguments
                };
                self.emit(
                    ResponsesStreamEvent::FunctionCallArgumentsDone {
                        item_id: item_id.clone(),
                        output_index,
                        arguments: arguments.clone(),
                        sequence_number: 0,
                    },
                    out,
                );
                let item = OutputItem::FunctionCall(FunctionCallItem {
                    id: Some(item_id),
                    call_id,
                    name,
                    arguments,
                    status: Some("completed".to_string()),
                });
                self.finish_item(output_index, item, out);
            }

            OpenBlock::Thinking {
                item_id,
                output_index,
                text,
                signature,
            } => {
                self.emit(
                    ResponsesStreamEvent::ReasoningSummaryTextDone {
                        item_id: item_id.clone(),
                        output_index,
                        summary_index: 0,
                        text: text.clone(),
                        sequence_number: 0,
                    },
                    out,
                );
                let part = SummaryPart { text };
                self.emit(
                    ResponsesStreamEvent::ReasoningSummaryPartDone {
                        item_id: item_id.clone(),
                        output_index,
                        summary_index: 0,
                        part: part.clone(),
                        sequence_number: 0,
                    },
                    out,
                );
                let item = OutputItem::Reasoning(ReasoningItem {
                    id: item_id,
                    summary: vec![part],
                    encrypted_content: (!signature.is_empty()).then_some(signature),
                    content: None,
                });
                self.finish_item(output_index, item, out);
            }

            OpenBlock::Redacted { output_index, item } => {
                self.finish_item(output_index, OutputItem::Reasoning(item), out);
            }

            OpenBlock::Ignored => {}
        }
    }

    fn finish_item(
        &mut self,
        output_index: usize,
        item: OutputItem,
        out: &mut Vec<ResponsesStreamEvent>,
    ) {
        self.emit(
            ResponsesStreamEvent::OutputItemDone {
                output_index,
                item: item.clone(),
                sequence_number: 0,
            },
            out,
        );
        self.output.insert(output_index, item);
    }

    /// Close open blocks in index order.
    fn close_all(&mut self, out: &mut Vec<ResponsesStreamEvent>) {
        let mut indices: Vec<usize> = self.open.keys().copied().collect();
        indices.sort_unstable();
        for index in indices {
            if let Some(block) = self.open.remove(&index) {
                self.close_block(block, out);
            }
        }
    }

    fn merge_usage(&mut self, usage: &DeltaUsage) {
        if let Some(input) = usage.input_tokens {
            self.usage.input_tokens = input;
        }
        self.usage.output_tokens = usage.output_tokens;
        if usage.cache_creation_input_tokens.is_some() {
            self.usage.cache_creation_input_tokens = usage.cache_creation_input_tokens;
        }
        if usage.cache_read_input_tokens.is_some() {
            self.usage.cache_read_input_tokens = usage.cache_read_input_tokens;
        }
    }

    fn final_response(&mut self) -> ResponsesResponse {
        let (status, incomplete_details) = map_stop_reason(self.stop_reason);
        let mut response = self.shell(status);
        response.output = std::mem::take(&mut self.output).into_values().collect();
        response.usage = Some(usage_to_responses(&self.usage));
        response.incomplete_details = incomplete_details;
        response.metadata = self
            .stop_sequence
            .as_ref()
            .map(|s| {
                [("stop_sequence".to_string(), Value::String(s.clone()))]
                    .into_iter()
                    .collect()
            });
        response
    }

    fn emit_failure(&mut self, error: &ErrorBody, out: &mut Vec<ResponsesStreamEvent>) {
        self.ensure_started(None, out);
        self.close_all(out);
        let mut response = self.shell(ResponseStatus::Failed);
        response.output = std::mem::take(&mut self.output).into_values().collect();
        response.error = Some(ResponseError {
            code: Some(error.error_type.clone()),
            message: error.message.clone(),
        });
        self.emit(
            ResponsesStreamEvent::Failed {
                response,
                sequence_number: 0,
            },
            out,
        );
        self.finish_state(Phase::Errored);
    }
}

fn text_delta(item_id: &str, output_index: usize, delta: &str) -> ResponsesStreamEvent {
    ResponsesStreamEvent::OutputTextDelta {
        item_id: item_id.to_string(),
        output_index,
        content_index: 0,
        delta: delta.to_string(),
        logprobs: Vec::new(),
        sequence_number: 0,
    }
}

fn summary_delta(item_id: &str, output_index: usize, delta: &str) -> ResponsesStreamEvent {
    ResponsesStreamEvent::ReasoningSummaryTextDelta {
        item_id: item_id.to_string(),
        output_index,
        summary_index: 0,
        delta: delta.to_string(),
        sequence_number: 0,
    }
}

fn malformed(message: &str, event: &MessagesStreamEvent) -> TranslateError {
    TranslateError::stream(message, serde_json::to_string(event).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(value: Value) -> MessagesStreamEvent {
        serde_json::from_value(value).unwrap()
    }

    fn run(t: &mut MessagesToResponsesStream, events: Vec<Value>) -> Vec<ResponsesStreamEvent> {
        let mut out = Vec::new();
        for e in events {
            out.extend(t.process(&ev(e)).unwrap());
        }
        out
    }

    fn message_start() -> Value {
        json!({"type": "message_start", "message": {
            "id": "msg_abc", "type": "message", "role": "assistant", "content": [],
            "model": "claude-sonnet-4", "stop_reason": null, "stop_sequence": null,
            "usage": {"input_tokens": 12, "output_tokens": 1}}})
    }

    fn names(events: &[ResponsesStreamEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_name()).collect()
    }

    fn sequence_numbers(events: &[ResponsesStreamEvent]) -> Vec<u64> {
        events
            .iter()
            .map(|e| serde_json::to_value(e).unwrap()["sequence_number"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn test_text_stream() {
        let mut t = MessagesToResponsesStream::new(&ConvertOptions::default());
        let out = run(
            &mut t,
            vec![
                message_start(),
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                json!({"type": "ping"}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello"}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "!"}}),
                json!({"type": "content_block_stop", "index": 0}),
                json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 3}}),
                json!({"type": "message_stop"}),
            ],
        );
        assert_eq!(
            names(&out),
            vec![
                "response.created",
                "response.in_progress",
                "response.output_item.added",
                "response.content_part.added",
                "response.output_text.delta",
                "response.output_text.delta",
                "response.output_text.done",
                "response.content_part.done",
                "response.output_item.done",
                "response.completed"
            ]
        );
        assert_eq!(sequence_numbers(&out), (0..out.len() as u64).collect::<Vec<_>>());

        match out.last().unwrap() {
            ResponsesStreamEvent::Completed { response, .. } => {
                assert_eq!(response.id, "resp_abc");
                assert_eq!(response.model, "claude-sonnet-4");
                assert_eq!(response.status, ResponseStatus::Completed);
                let usage = response.usage.as_ref().unwrap();
                assert_eq!(usage.input_tokens, 12);
                assert_eq!(usage.output_tokens, 3);
                assert_eq!(response.output.len(), 1);
                match &response.output[0] {
                    OutputItem::Message(m) => assert_eq!(
                        m.content,
                        vec![OutputContent::OutputText {
                            text: "Hello!".to_string(),
                            annotations: vec![]
                        }]
                    ),
                    other => panic!("unexpected item {:?}", other),
                }
            }
            other => panic!("expected completed, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_use_stream() {
        let mut t = MessagesToResponsesStream::new(&ConvertOptions::default());
        let out = run(
            &mut t,
            vec![
                message_start(),
                json!({"type": "content_block_start", "index": 0,
                       "content_block": {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {}}}),
                json!({"type": "content_block_delta", "index": 0,
                       "delta": {"type": "input_json_delta", "partial_json": "{\"q\":"}}),
                json!({"type": "content_block_delta", "index": 0,
                       "delta": {"type": "input_json_delta", "partial_json": "\"rust\"}"}}),
                json!({"type": "content_block_stop", "index": 0}),
                json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 9}}),
                json!({"type": "message_stop"}),
            ],
        );
        let deltas: Vec<&str> = out
            .iter()
            .filter_map(|e| match e {
                ResponsesStreamEvent::FunctionCallArgumentsDelta { delta, .. } => {
                    Some(delta.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["{\"q\":", "\"rust\"}"]);
        assert!(out.iter().any(|e| matches!(
            e,
            ResponsesStreamEvent::FunctionCallArgumentsDone { arguments, .. } if arguments == "{\"q\":\"rust\"}"
        )));
        match out.last().unwrap() {
            ResponsesStreamEvent::Completed { response, .. } => {
                assert!(matches!(
                    &response.output[0],
                    OutputItem::FunctionCall(c) if c.call_id == "toolu_1" && c.name == "lookup"
                ));
            }
            other => panic!("expected completed, got {:?}", other),
        }
    }

    #[test]
    fn test_thinking_keeps_signature() {
        let mut t = MessagesToResponsesStream::new(&ConvertOptions::default());
        let out = run(
            &mut t,
            vec![
                message_start(),
                json!({"type": "content_block_start", "index": 0,
                       "content_block": {"type": "thinking", "thinking": "", "signature": ""}}),
                json!({"type": "content_block_delta", "index": 0,
                       "delta": {"type": "thinking_delta", "thinking": "hmm"}}),
                json!({"type": "content_block_delta", "index": 0,
                       "delta": {"type": "signature_delta", "signature": "sig=="}}),
                json!({"type": "content_block_stop", "index": 0}),
            ],
        );
        let done = out.iter().find_map(|e| match e {
            ResponsesStreamEvent::OutputItemDone {
                item: OutputItem::Reasoning(r),
                ..
            } => Some(r.clone()),
            _ => None,
        });
        let reasoning = done.unwrap();
        assert_eq!(reasoning.summary[0].text, "hmm");
        assert_eq!(reasoning.encrypted_content.as_deref(), Some("sig=="));
    }

    #[test]
    fn test_max_tokens_is_incomplete() {
        let mut t = MessagesToResponsesStream::new(&ConvertOptions::default());
        let out = run(
            &mut t,
            vec![
                message_start(),
                json!({"type": "message_delta", "delta": {"stop_reason": "max_tokens"}, "usage": {"output_tokens": 100}}),
                json!({"type": "message_stop"}),
            ],
        );
        match out.last().unwrap() {
            ResponsesStreamEvent::Incomplete { response, .. } => {
                assert_eq!(
                    response.incomplete_details.as_ref().unwrap().reason,
                    "max_output_tokens"
                );
            }
            other => panic!("expected incomplete, got {:?}", other),
        }
    }

    #[test]
    fn test_error_event_fails_response() {
        let mut t = MessagesToResponsesStream::new(&ConvertOptions::default());
        let out = run(
            &mut t,
            vec![
                message_start(),
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
            ],
        );
        let tail: Vec<_> = names(&out).into_iter().rev().take(4).collect();
        assert_eq!(
            tail,
            vec![
                "response.failed",
                "response.output_item.done",
                "response.content_part.done",
                "response.output_text.done"
            ]
        );
        match out.last().unwrap() {
            ResponsesStreamEvent::Failed { response, .. } => {
                let err = response.error.as_ref().unwrap();
                assert_eq!(err.code.as_deref(), Some("overloaded_error"));
            }
            other => panic!("expected failed, got {:?}", other),
        }
        assert!(t.is_finished());
    }

    #[test]
    fn test_mismatched_delta_is_malformed() {
        let mut t = MessagesToResponsesStream::new(&ConvertOptions::default());
        run(
            &mut t,
            vec![
                message_start(),
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            ],
        );
        let err = t
            .process(&ev(json!({"type": "content_block_delta", "index": 0,
                                "delta": {"type": "input_json_delta", "partial_json": "{"}})))
            .unwrap_err();
        assert!(matches!(err, TranslateError::StreamTranslation { .. }));
        assert!(t
            .process(&ev(json!({"type": "content_block_stop", "index": 5})))
            .is_err());
    }

    #[test]
    fn test_abrupt_end_fails_response() {
        let mut t = MessagesToResponsesStream::new(&ConvertOptions::default());
        run(&mut t, vec![message_start()]);
        let tail = t.finish();
        assert_eq!(names(&tail), vec!["response.failed"]);
        assert!(t.finish().is_empty());
    }
}
