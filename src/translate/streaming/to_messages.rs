//! State machine for translating OpenAI Responses stream events into Anthropic SSE events.
//!
//! The [`ResponsesToMessagesStream`] consumes `response.*` events one at a time,
//! assigns an Anthropic content-block index the first time each upstream block
//! (a content part, a tool call, a reasoning summary) is seen, and emits the
//! `message_start` ... `message_stop` sequence a Claude client expects.

use std::collections::{BTreeMap, HashMap};

use serde_json::json;

use super::Phase;
use crate::error::{TranslateError, TranslateResult};
use crate::translate::messages_types::{
    Delta, DeltaUsage, ErrorBody, MessageDeltaBody, MessagesResponse, MessagesStreamEvent,
    ResponseContentBlock, StopReason, Usage,
};
use crate::translate::response::{failure_to_error, map_status, message_id_from, new_item_id};
use crate::translate::responses_types::{
    OutputContent, OutputItem, ResponsesResponse, ResponsesStreamEvent, ResponsesUsage,
};
use crate::translate::ConvertOptions;

/// Upstream identity of a destination block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BlockKey {
    /// Text or refusal part: (item_id, content_index)
    Part(String, usize),
    /// Function or custom tool call
    Call(String),
    /// Reasoning summary: (item_id, summary_index)
    Summary(String, usize),
    /// Raw reasoning text: (item_id, content_index)
    ReasoningText(String, usize),
}

impl BlockKey {
    fn item_id(&self) -> &str {
        match self {
            BlockKey::Part(id, _)
            | BlockKey::Call(id)
            | BlockKey::Summary(id, _)
            | BlockKey::ReasoningText(id, _) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
    /// Free-form tool input; buffered and emitted as `{"input": ...}` when complete.
    CustomToolUse,
    Thinking,
}

#[derive(Debug)]
struct BlockAccumulator {
    key: BlockKey,
    kind: BlockKind,
    buffer: String,
    streamed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    Message,
    FunctionCall,
    CustomToolCall,
    Reasoning,
    /// Hosted tool calls and other items with no Anthropic block.
    Ignored,
}

/// Per-stream bookkeeping; owned by exactly one translator.
#[derive(Debug, Default)]
struct StreamContext {
    index_of: HashMap<BlockKey, usize>,
    open: BTreeMap<usize, BlockAccumulator>,
    next_index: usize,
    items: HashMap<String, ItemKind>,
    saw_tool_use: bool,
}

/// Usage:
///   let mut translator = ResponsesToMessagesStream::new(&ConvertOptions::default());
///   for event in upstream_events {
///       for out in translator.process(&event)? {
///           // send as SSE
///       }
///   }
///   let trailing = translator.finish();
#[derive(Debug)]
pub struct ResponsesToMessagesStream {
    ctx: StreamContext,
    phase: Phase,
    message_id: Option<String>,
    model: String,
    model_pinned: bool,
}

impl ResponsesToMessagesStream {
    pub fn new(opts: &ConvertOptions) -> Self {
        Self {
            ctx: StreamContext::default(),
            phase: Phase::Idle,
            message_id: opts.message_id.clone(),
            model: opts.model.clone().unwrap_or_else(|| "unknown".to_string()),
            model_pinned: opts.model.is_some(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Translate one upstream event into zero or more Anthropic events.
    ///
    /// On `Err` nothing has been emitted for this event; call [`fail`](Self::fail)
    /// to close the stream with an error frame.
    pub fn process(
        &mut self,
        event: &ResponsesStreamEvent,
    ) -> TranslateResult<Vec<MessagesStreamEvent>> {
        if self.phase.is_terminal() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        match event {
            ResponsesStreamEvent::Created { response, .. }
            | ResponsesStreamEvent::InProgress { response, .. } => {
                self.ensure_started(Some(response), &mut out);
            }

            ResponsesStreamEvent::OutputItemAdded { item, .. } => {
                self.ensure_started(None, &mut out);
                self.add_item(item, event, &mut out)?;
            }

            ResponsesStreamEvent::ContentPartAdded {
                item_id,
                content_index,
                part,
                ..
            } => {
                self.ensure_started(None, &mut out);
                match self.item_kind(item_id, event)? {
                    ItemKind::Message if !matches!(part, OutputContent::Unknown) => {
                        let key = BlockKey::Part(item_id.clone(), *content_index);
                        self.block_for_delta(key, BlockKind::Text, event, &mut out)?;
                    }
                    // Reasoning parts stream through reasoning_text events.
                    _ => {}
                }
            }

            ResponsesStreamEvent::OutputTextDelta {
                item_id,
                content_index,
                delta,
                ..
            }
            | ResponsesStreamEvent::RefusalDelta {
                item_id,
                content_index,
                delta,
                ..
            } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::Message, event)? {
                    let key = BlockKey::Part(item_id.clone(), *content_index);
                    self.text_delta(key, BlockKind::Text, delta, event, &mut out)?;
                }
            }

            ResponsesStreamEvent::OutputTextDone {
                item_id,
                content_index,
                text,
                ..
            }
            | ResponsesStreamEvent::RefusalDone {
                item_id,
                content_index,
                refusal: text,
                ..
            } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::Message, event)? {
                    let key = BlockKey::Part(item_id.clone(), *content_index);
                    self.finish_block(key, BlockKind::Text, text, &mut out);
                }
            }

            ResponsesStreamEvent::ContentPartDone {
                item_id,
                content_index,
                part,
                ..
            } => {
                self.ensure_started(None, &mut out);
                if self.item_kind(item_id, event)? == ItemKind::Message {
                    let text = match part {
                        OutputContent::OutputText { text, .. } => text.as_str(),
                        OutputContent::Refusal { refusal } => refusal.as_str(),
                        OutputContent::Unknown => "",
                    };
                    let key = BlockKey::Part(item_id.clone(), *content_index);
                    self.finish_block(key, BlockKind::Text, text, &mut out);
                }
            }

            ResponsesStreamEvent::FunctionCallArgumentsDelta { item_id, delta, .. } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::FunctionCall, event)? {
                    self.text_delta(
                        BlockKey::Call(item_id.clone()),
                        BlockKind::ToolUse,
                        delta,
                        event,
                        &mut out,
                    )?;
                }
            }

            ResponsesStreamEvent::FunctionCallArgumentsDone {
                item_id, arguments, ..
            } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::FunctionCall, event)? {
                    self.finish_block(
                        BlockKey::Call(item_id.clone()),
                        BlockKind::ToolUse,
                        arguments,
                        &mut out,
                    );
                }
            }

            ResponsesStreamEvent::CustomToolCallInputDelta { item_id, delta, .. } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::CustomToolCall, event)? {
                    let key = BlockKey::Call(item_id.clone());
                    let index = self.open_index(&key, event)?;
                    if let Some(acc) = self.ctx.open.get_mut(&index) {
                        acc.buffer.push_str(delta);
                    }
                }
            }

            ResponsesStreamEvent::CustomToolCallInputDone { item_id, input, .. } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::CustomToolCall, event)? {
                    self.finish_block(
                        BlockKey::Call(item_id.clone()),
                        BlockKind::CustomToolUse,
                        input,
                        &mut out,
                    );
                }
            }

            ResponsesStreamEvent::ReasoningSummaryPartAdded {
                item_id,
                summary_index,
                ..
            } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::Reasoning, event)? {
                    let key = BlockKey::Summary(item_id.clone(), *summary_index);
                    self.block_for_delta(key, BlockKind::Thinking, event, &mut out)?;
                }
            }

            ResponsesStreamEvent::ReasoningSummaryTextDelta {
                item_id,
                summary_index,
                delta,
                ..
            } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::Reasoning, event)? {
                    let key = BlockKey::Summary(item_id.clone(), *summary_index);
                    self.text_delta(key, BlockKind::Thinking, delta, event, &mut out)?;
                }
            }

            ResponsesStreamEvent::ReasoningSummaryTextDone {
                item_id,
                summary_index,
                text,
                ..
            } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::Reasoning, event)? {
                    let key = BlockKey::Summary(item_id.clone(), *summary_index);
                    self.finish_block(key, BlockKind::Thinking, text, &mut out);
                }
            }

            ResponsesStreamEvent::ReasoningSummaryPartDone {
                item_id,
                summary_index,
                part,
                ..
            } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::Reasoning, event)? {
                    let key = BlockKey::Summary(item_id.clone(), *summary_index);
                    self.finish_block(key, BlockKind::Thinking, &part.text, &mut out);
                }
            }

            ResponsesStreamEvent::ReasoningTextDelta {
                item_id,
                content_index,
                delta,
                ..
            } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::Reasoning, event)? {
                    let key = BlockKey::ReasoningText(item_id.clone(), *content_index);
                    self.text_delta(key, BlockKind::Thinking, delta, event, &mut out)?;
                }
            }

            ResponsesStreamEvent::ReasoningTextDone {
                item_id,
                content_index,
                text,
                ..
            } => {
                self.ensure_started(None, &mut out);
                if self.expect_item(item_id, ItemKind::Reasoning, event)? {
                    let key = BlockKey::ReasoningText(item_id.clone(), *content_index);
                    self.finish_block(key, BlockKind::Thinking, text, &mut out);
                }
            }

            ResponsesStreamEvent::OutputItemDone { item, .. } => {
                self.ensure_started(None, &mut out);
                self.done_item(item, event, &mut out)?;
            }

            ResponsesStreamEvent::Completed { response, .. }
            | ResponsesStreamEvent::Incomplete { response, .. } => {
                self.ensure_started(Some(response), &mut out);
                // Finished items are no-ops; anything that never streamed is emitted now.
                for item in &response.output {
                    self.done_item(item, event, &mut out)?;
                }
                self.close_all(&mut out);
                out.push(self.make_message_delta(response));
                out.push(MessagesStreamEvent::MessageStop);
                self.finish_context(Phase::Completed);
            }

            ResponsesStreamEvent::Failed { response, .. } => {
                self.close_all(&mut out);
                out.push(MessagesStreamEvent::Error {
                    error: failure_to_error(response.error.as_ref()),
                });
                self.finish_context(Phase::Errored);
            }

            ResponsesStreamEvent::Error { code, message, .. } => {
                self.close_all(&mut out);
                let message = match code {
                    Some(code) => format!("{}: {}", code, message),
                    None => message.clone(),
                };
                out.push(MessagesStreamEvent::Error {
                    error: ErrorBody {
                        error_type: "api_error".to_string(),
                        message,
                    },
                });
                self.finish_context(Phase::Errored);
            }

            ResponsesStreamEvent::Unknown => {}
        }

        Ok(out)
    }

    /// The upstream sequence ended. Without a terminal event, close what is
    /// open and emit an error so the client is not left hanging.
    pub fn finish(&mut self) -> Vec<MessagesStreamEvent> {
        self.fail(&TranslateError::interrupted(
            "upstream stream ended without a terminal event",
        ))
    }

    /// Abort after `err`: close open blocks and emit a terminal error event.
    pub fn fail(&mut self, err: &TranslateError) -> Vec<MessagesStreamEvent> {
        if self.phase.is_terminal() {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.close_all(&mut out);
        out.push(MessagesStreamEvent::Error {
            error: err.to_error_response().error,
        });
        self.finish_context(Phase::Errored);
        out
    }

    /// Drop all buffered state; nothing more is emitted.
    pub fn cancel(&mut self) {
        self.finish_context(Phase::Cancelled);
    }

    fn finish_context(&mut self, phase: Phase) {
        self.ctx = StreamContext::default();
        self.phase = phase;
    }

    fn ensure_started(
        &mut self,
        response: Option<&ResponsesResponse>,
        out: &mut Vec<MessagesStreamEvent>,
    ) {
        if self.phase != Phase::Idle {
            return;
        }
        if let Some(resp) = response {
            if !self.model_pinned && !resp.model.is_empty() {
                self.model = resp.model.clone();
            }
            if self.message_id.is_none() && !resp.id.is_empty() {
                self.message_id = Some(message_id_from(&resp.id));
            }
        }
        let id = self
            .message_id
            .get_or_insert_with(|| new_item_id("msg"))
            .clone();

        out.push(MessagesStreamEvent::MessageStart {
            message: MessagesResponse {
                id,
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                content: Vec::new(),
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage::default(),
            },
        });
        self.phase = Phase::Streaming;
    }

    fn add_item(
        &mut self,
        item: &OutputItem,
        event: &ResponsesStreamEvent,
        out: &mut Vec<MessagesStreamEvent>,
    ) -> TranslateResult<()> {
        let (item_id, kind) = item_identity(item);
        if kind != ItemKind::Ignored && self.ctx.items.contains_key(&item_id) {
            return Err(malformed("output item announced twice", event));
        }
        self.ctx.items.insert(item_id.clone(), kind);

        match item {
            OutputItem::FunctionCall(call) => {
                self.open_tool_block(item_id, &call.call_id, &call.name, BlockKind::ToolUse, out);
                if !call.arguments.is_empty() {
                    let key = BlockKey::Call(item_id_of(item));
                    self.text_delta(key, BlockKind::ToolUse, &call.arguments, event, out)?;
                }
            }
            OutputItem::CustomToolCall(call) => {
                self.open_tool_block(
                    item_id,
                    &call.call_id,
                    &call.name,
                    BlockKind::CustomToolUse,
                    out,
                );
                if !call.input.is_empty() {
                    let index = self.open_index(&BlockKey::Call(item_id_of(item)), event)?;
                    if let Some(acc) = self.ctx.open.get_mut(&index) {
                        acc.buffer.push_str(&call.input);
                    }
                }
            }
            OutputItem::Unsupported { item_type, .. } => {
                tracing::debug!(
                    item_type = %item_type,
                    "Ignoring output item with no Messages counterpart"
                );
            }
            OutputItem::Message(_) | OutputItem::Reasoning(_) => {}
        }
        Ok(())
    }

    /// `output_item.done`: emit anything the item carries that never streamed,
    /// then close the item's remaining blocks.
    fn done_item(
        &mut self,
        item: &OutputItem,
        event: &ResponsesStreamEvent,
        out: &mut Vec<MessagesStreamEvent>,
    ) -> TranslateResult<()> {
        let (item_id, kind) = item_identity(item);
        match self.ctx.items.get(&item_id) {
            None => {
                // Upstreams that only send completed items still produce blocks.
                self.add_item(item, event, out)?;
            }
            Some(known) if *known != kind => {
                return Err(malformed("output item changed type", event));
            }
            Some(_) => {}
        }

        match item {
            OutputItem::Message(msg) => {
                for (i, part) in msg.content.iter().enumerate() {
                    let text = match part {
                        OutputContent::OutputText { text, .. } => text,
                        OutputContent::Refusal { refusal } => refusal,
                        OutputContent::Unknown => continue,
                    };
                    self.finish_block(
                        BlockKey::Part(item_id.clone(), i),
                        BlockKind::Text,
                        text,
                        out,
                    );
                }
            }
            OutputItem::FunctionCall(call) => {
                self.finish_block(
                    BlockKey::Call(item_id.clone()),
                    BlockKind::ToolUse,
                    &call.arguments,
                    out,
                );
            }
            OutputItem::CustomToolCall(call) => {
                self.finish_block(
                    BlockKey::Call(item_id.clone()),
                    BlockKind::CustomToolUse,
                    &call.input,
                    out,
                );
            }
            OutputItem::Reasoning(reasoning) => {
                for (i, part) in reasoning.summary.iter().enumerate() {
                    self.finish_block(
                        BlockKey::Summary(item_id.clone(), i),
                        BlockKind::Thinking,
                        &part.text,
                        out,
                    );
                }
                if let Some(ref content) = reasoning.content {
                    for (i, part) in content.iter().enumerate() {
                        self.finish_block(
                            BlockKey::ReasoningText(item_id.clone(), i),
                            BlockKind::Thinking,
                            &part.text,
                            out,
                        );
                    }
                }
            }
            OutputItem::Unsupported { .. } => {}
        }

        // Anything of this item still open (e.g. parts the item no longer lists)
        let leftover: Vec<usize> = self
            .ctx
            .open
            .iter()
            .filter(|(_, acc)| acc.key.item_id() == item_id)
            .map(|(index, _)| *index)
            .collect();
        for index in leftover {
            self.close_block(index, out);
        }
        Ok(())
    }

    fn open_tool_block(
        &mut self,
        item_id: String,
        call_id: &str,
        name: &str,
        kind: BlockKind,
        out: &mut Vec<MessagesStreamEvent>,
    ) {
        self.ctx.saw_tool_use = true;
        let start = ResponseContentBlock::ToolUse {
            id: call_id.to_string(),
            name: name.to_string(),
            input: json!({}),
        };
        self.open_block(BlockKey::Call(item_id), kind, start, out);
    }

    fn open_block(
        &mut self,
        key: BlockKey,
        kind: BlockKind,
        content_block: ResponseContentBlock,
        out: &mut Vec<MessagesStreamEvent>,
    ) -> usize {
        let index = self.ctx.next_index;
        self.ctx.next_index += 1;
        self.ctx.index_of.insert(key.clone(), index);
        self.ctx.open.insert(
            index,
            BlockAccumulator {
                key,
                kind,
                buffer: String::new(),
                streamed: false,
            },
        );
        out.push(MessagesStreamEvent::ContentBlockStart {
            index,
            content_block,
        });
        index
    }

    /// Index of an open block, opening text and thinking blocks on first sight.
    fn block_for_delta(
        &mut self,
        key: BlockKey,
        kind: BlockKind,
        event: &ResponsesStreamEvent,
        out: &mut Vec<MessagesStreamEvent>,
    ) -> TranslateResult<usize> {
        if self.ctx.index_of.contains_key(&key) {
            return self.open_index(&key, event);
        }
        let start = match kind {
            BlockKind::Text => ResponseContentBlock::Text {
                text: String::new(),
            },
            BlockKind::Thinking => ResponseContentBlock::Thinking {
                thinking: String::new(),
                signature: String::new(),
            },
            BlockKind::ToolUse | BlockKind::CustomToolUse => {
                return Err(malformed("tool call was never announced", event));
            }
        };
        Ok(self.open_block(key, kind, start, out))
    }

    fn open_index(&self, key: &BlockKey, event: &ResponsesStreamEvent) -> TranslateResult<usize> {
        let index = *self
            .ctx
            .index_of
            .get(key)
            .ok_or_else(|| malformed("delta for a block that was never opened", event))?;
        if !self.ctx.open.contains_key(&index) {
            return Err(malformed("delta for a block that is already closed", event));
        }
        Ok(index)
    }

    fn text_delta(
        &mut self,
        key: BlockKey,
        kind: BlockKind,
        delta: &str,
        event: &ResponsesStreamEvent,
        out: &mut Vec<MessagesStreamEvent>,
    ) -> TranslateResult<()> {
        let index = self.block_for_delta(key, kind, event, out)?;
        if delta.is_empty() {
            return Ok(());
        }
        if let Some(acc) = self.ctx.open.get_mut(&index) {
            acc.buffer.push_str(delta);
            acc.streamed = true;
        }
        out.push(MessagesStreamEvent::ContentBlockDelta {
            index,
            delta: make_delta(kind, delta),
        });
        Ok(())
    }

    /// Close a block on its `*.done` event. When nothing streamed, `full`
    /// is emitted as a single delta; an already-closed block is left alone.
    fn finish_block(
        &mut self,
        key: BlockKey,
        kind: BlockKind,
        full: &str,
        out: &mut Vec<MessagesStreamEvent>,
    ) {
        let index = match self.ctx.index_of.get(&key) {
            Some(index) if self.ctx.open.contains_key(index) => *index,
            Some(_) => return,
            None if full.is_empty() => return,
            None => match kind {
                BlockKind::Text => self.open_block(
                    key,
                    kind,
                    ResponseContentBlock::Text {
                        text: String::new(),
                    },
                    out,
                ),
                BlockKind::Thinking => self.open_block(
                    key,
                    kind,
                    ResponseContentBlock::Thinking {
                        thinking: String::new(),
                        signature: String::new(),
                    },
                    out,
                ),
                // Tool blocks always open on output_item.added
                BlockKind::ToolUse | BlockKind::CustomToolUse => return,
            },
        };

        if let Some(acc) = self.ctx.open.get_mut(&index) {
            let pending = match acc.kind {
                BlockKind::CustomToolUse => {
                    let raw = if full.is_empty() { acc.buffer.as_str() } else { full };
                    Some(json!({ "input": raw }).to_string())
                }
                _ if !acc.streamed && !full.is_empty() => Some(full.to_string()),
                _ => None,
            };
            if let Some(text) = pending {
                acc.streamed = true;
                out.push(MessagesStreamEvent::ContentBlockDelta {
                    index,
                    delta: make_delta(acc.kind, &text),
                });
            }
        }
        self.close_block(index, out);
    }

    fn close_block(&mut self, index: usize, out: &mut Vec<MessagesStreamEvent>) {
        if let Some(acc) = self.ctx.open.remove(&index) {
            if acc.kind == BlockKind::CustomToolUse && !acc.streamed {
                out.push(MessagesStreamEvent::ContentBlockDelta {
                    index,
                    delta: make_delta(acc.kind, &json!({ "input": acc.buffer }).to_string()),
                });
            }
            out.push(MessagesStreamEvent::ContentBlockStop { index });
        }
    }

    fn close_all(&mut self, out: &mut Vec<MessagesStreamEvent>) {
        let open: Vec<usize> = self.ctx.open.keys().copied().collect();
        for index in open {
            self.close_block(index, out);
        }
    }

    fn item_kind(&self, item_id: &str, event: &ResponsesStreamEvent) -> TranslateResult<ItemKind> {
        self.ctx
            .items
            .get(item_id)
            .copied()
            .ok_or_else(|| {
                malformed("event references an output item that was never announced", event)
            })
    }

    /// `Ok(false)` for ignored items, an error for unknown or mismatched ones.
    fn expect_item(
        &self,
        item_id: &str,
        expected: ItemKind,
        event: &ResponsesStreamEvent,
    ) -> TranslateResult<bool> {
        match self.item_kind(item_id, event)? {
            ItemKind::Ignored => Ok(false),
            kind if kind == expected => Ok(true),
            _ => Err(malformed("event does not match the output item's type", event)),
        }
    }

    fn make_message_delta(&self, response: &ResponsesResponse) -> MessagesStreamEvent {
        let stop_sequence = response
            .metadata
            .as_ref()
            .and_then(|m| m.get("stop_sequence"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        let ends_with_tool_call = match response.output.last() {
            Some(item) => item.is_tool_call(),
            None => self.ctx.saw_tool_use,
        };
        let stop_reason = if stop_sequence.is_some() {
            StopReason::StopSequence
        } else {
            map_status(response.incomplete_details.as_ref(), ends_with_tool_call)
        };

        MessagesStreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason),
                stop_sequence,
            },
            usage: response.usage.as_ref().map_or_else(DeltaUsage::default, delta_usage),
        }
    }
}

fn delta_usage(usage: &ResponsesUsage) -> DeltaUsage {
    let cached = usage.cached_tokens();
    DeltaUsage {
        input_tokens: Some(usage.input_tokens.saturating_sub(cached)),
        output_tokens: usage.output_tokens,
        cache_creation_input_tokens: None,
        cache_read_input_tokens: (cached > 0).then_some(cached),
    }
}

fn make_delta(kind: BlockKind, text: &str) -> Delta {
    match kind {
        BlockKind::Text => Delta::TextDelta {
            text: text.to_string(),
        },
        BlockKind::ToolUse | BlockKind::CustomToolUse => Delta::InputJsonDelta {
            partial_json: text.to_string(),
        },
        BlockKind::Thinking => Delta::ThinkingDelta {
            thinking: text.to_string(),
        },
    }
}

fn item_id_of(item: &OutputItem) -> String {
    item_identity(item).0
}

/// Tool calls are keyed by item id, falling back to call_id when absent.
fn item_identity(item: &OutputItem) -> (String, ItemKind) {
    match item {
        OutputItem::Message(m) => (m.id.clone(), ItemKind::Message),
        OutputItem::FunctionCall(c) => (
            c.id.clone().unwrap_or_else(|| c.call_id.clone()),
            ItemKind::FunctionCall,
        ),
        OutputItem::CustomToolCall(c) => (
            c.id.clone().unwrap_or_else(|| c.call_id.clone()),
            ItemKind::CustomToolCall,
        ),
        OutputItem::Reasoning(r) => (r.id.clone(), ItemKind::Reasoning),
        OutputItem::Unsupported { id, .. } => (id.clone().unwrap_or_default(), ItemKind::Ignored),
    }
}

fn malformed(message: &str, event: &ResponsesStreamEvent) -> TranslateError {
    TranslateError::stream(message, serde_json::to_string(event).unwrap_or_default())
}
