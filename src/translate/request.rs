//! Translate requests between the Anthropic Messages API and the OpenAI Responses API.
//!
//! Anthropic messages flatten into a Responses `input` item list (tool calls and
//! tool results become standalone items), and the item list folds back into
//! alternating messages. Sampling parameters map by name; parameters with no
//! counterpart on the target side are dropped.

use serde_json::{json, Value};

use super::messages_types::{
    ContentBlock, MediaSource, Message, MessageContent, MessagesRequest, Metadata, Role,
    SystemContent, ThinkingConfig, Tool, ToolChoice, ToolResultContent,
};
use super::responses_types::{
    CustomToolCallItem, FunctionCallItem, FunctionCallOutputItem, FunctionOutput, InputContent,
    InputItem, InputMessage, InputMessageContent, InputRole, NamedToolChoice, ReasoningConfig,
    ReasoningEffort, ResponsesInput, ResponsesRequest, ResponsesTool, ResponsesToolChoice,
    ToolChoiceMode,
};
use super::ConvertOptions;
use crate::error::{TranslateError, TranslateResult};

/// Smallest thinking budget the Messages API accepts.
pub const MIN_THINKING_BUDGET: u64 = 1024;

const ERROR_PREFIX: &str = "ERROR: ";

// ---------------------------------------------------------------------------
// Messages -> Responses
// ---------------------------------------------------------------------------

/// Translate an Anthropic Messages request into an OpenAI Responses request.
pub fn messages_to_responses(req: &MessagesRequest) -> TranslateResult<ResponsesRequest> {
    let mut items = Vec::new();
    for (i, msg) in req.messages.iter().enumerate() {
        message_to_items(msg, i, &mut items)?;
    }

    let instructions = req
        .system
        .as_ref()
        .map(SystemContent::as_text)
        .filter(|s| !s.is_empty());

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .filter_map(|t| {
                if t.is_server_tool() {
                    tracing::warn!(
                        tool = %t.name,
                        "Dropping server tool with no Responses counterpart"
                    );
                    return None;
                }
                Some(ResponsesTool::Function {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: Some(t.input_schema.clone()),
                    strict: Some(false),
                })
            })
            .collect::<Vec<_>>()
    });

    let parallel_tool_calls = req
        .tool_choice
        .as_ref()
        .filter(|tc| tc.disables_parallel_tool_use())
        .map(|_| false);

    if req.top_k.is_some() || req.stop_sequences.is_some() {
        tracing::debug!("Dropping top_k / stop_sequences (not supported by the Responses API)");
    }

    let reasoning = match req.thinking {
        Some(ThinkingConfig::Enabled { budget_tokens }) => Some(ReasoningConfig {
            effort: Some(budget_to_effort(budget_tokens)),
            summary: Some("auto".to_string()),
        }),
        _ => None,
    };

    Ok(ResponsesRequest {
        model: req.model.clone(),
        input: Some(ResponsesInput::Items(items)),
        instructions,
        max_output_tokens: Some(req.max_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        tools: tools.filter(|t| !t.is_empty()),
        tool_choice: req.tool_choice.as_ref().map(tool_choice_to_responses),
        parallel_tool_calls,
        reasoning,
        user: req.metadata.as_ref().and_then(|m| m.user_id.clone()),
        previous_response_id: None,
        conversation: None,
        store: None,
        extra: Default::default(),
    })
}

/// A single Anthropic message can expand into several items: text and media
/// stay in a `message` item, while tool calls and results are split out.
fn message_to_items(
    msg: &Message,
    index: usize,
    items: &mut Vec<InputItem>,
) -> TranslateResult<()> {
    let role = match msg.role {
        Role::User => InputRole::User,
        Role::Assistant => InputRole::Assistant,
    };
    let context = format!("messages[{}] ({})", index, role_name(msg.role));
    let mut parts: Vec<InputContent> = Vec::new();

    for block in msg.content.blocks() {
        match (msg.role, block) {
            (Role::User, ContentBlock::Text { text }) => {
                parts.push(InputContent::InputText { text });
            }
            (Role::Assistant, ContentBlock::Text { text }) => {
                parts.push(InputContent::OutputText {
                    text,
                    annotations: Vec::new(),
                });
            }
            (Role::User, ContentBlock::Image { source }) => parts.push(image_to_part(&source)?),
            (Role::User, ContentBlock::Document { source, title }) => {
                parts.push(document_to_part(&source, title))
            }
            (Role::Assistant, ContentBlock::ToolUse { id, name, input }) => {
                flush_parts(role, &mut parts, items);
                items.push(InputItem::FunctionCall(FunctionCallItem {
                    id: None,
                    call_id: id,
                    name,
                    arguments: input.to_string(),
                    status: None,
                }));
            }
            (
                Role::User,
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                },
            ) => {
                flush_parts(role, &mut parts, items);
                items.push(InputItem::FunctionCallOutput(FunctionCallOutputItem {
                    id: None,
                    call_id: tool_use_id,
                    output: tool_result_to_output(content.as_ref(), is_error == Some(true))?,
                }));
            }
            // Signatures and redacted payloads are only meaningful to Anthropic.
            (_, ContentBlock::Thinking { .. } | ContentBlock::RedactedThinking { .. }) => {}
            (_, other) => {
                return Err(TranslateError::unsupported(other.type_name(), context));
            }
        }
    }

    flush_parts(role, &mut parts, items);
    Ok(())
}

fn flush_parts(role: InputRole, parts: &mut Vec<InputContent>, items: &mut Vec<InputItem>) {
    if parts.is_empty() {
        return;
    }
    items.push(InputItem::Message(InputMessage {
        id: None,
        role,
        content: InputMessageContent::Parts(std::mem::take(parts)),
        status: None,
    }));
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn image_to_part(source: &MediaSource) -> TranslateResult<InputContent> {
    let url = match source {
        MediaSource::Base64 { media_type, data } => format!("data:{};base64,{}", media_type, data),
        MediaSource::Url { url } => url.clone(),
        MediaSource::Text { .. } => {
            return Err(TranslateError::schema(
                "source",
                "image blocks cannot use a text source",
            ))
        }
    };
    Ok(InputContent::InputImage {
        image_url: Some(url),
        file_id: None,
        detail: None,
    })
}

fn document_to_part(source: &MediaSource, title: Option<String>) -> InputContent {
    match source {
        MediaSource::Base64 { media_type, data } => InputContent::InputFile {
            file_id: None,
            file_data: Some(format!("data:{};base64,{}", media_type, data)),
            file_url: None,
            filename: title,
        },
        MediaSource::Url { url } => InputContent::InputFile {
            file_id: None,
            file_data: None,
            file_url: Some(url.clone()),
            filename: title,
        },
        // Plain-text documents are just text to the model.
        MediaSource::Text { data, .. } => InputContent::InputText { text: data.clone() },
    }
}

fn tool_result_to_output(
    content: Option<&ToolResultContent>,
    is_error: bool,
) -> TranslateResult<FunctionOutput> {
    let prefix = if is_error { ERROR_PREFIX } else { "" };

    let blocks = match content {
        None => return Ok(FunctionOutput::Text(prefix.to_string())),
        Some(ToolResultContent::Text(t)) => return Ok(FunctionOutput::Text(format!("{prefix}{t}"))),
        Some(ToolResultContent::Blocks(blocks)) => blocks,
    };

    let all_text = blocks.iter().all(|b| matches!(b, ContentBlock::Text { .. }));
    if all_text {
        let text = blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        return Ok(FunctionOutput::Text(format!("{prefix}{text}")));
    }

    let mut parts = Vec::with_capacity(blocks.len() + 1);
    if is_error {
        parts.push(InputContent::InputText {
            text: ERROR_PREFIX.trim_end().to_string(),
        });
    }
    for block in blocks {
        match block {
            ContentBlock::Text { text } => {
                parts.push(InputContent::InputText { text: text.clone() })
            }
            ContentBlock::Image { source } => parts.push(image_to_part(source)?),
            ContentBlock::Document { source, title } => {
                parts.push(document_to_part(source, title.clone()))
            }
            other => {
                return Err(TranslateError::unsupported(other.type_name(), "tool_result content"))
            }
        }
    }
    Ok(FunctionOutput::Parts(parts))
}

fn tool_choice_to_responses(tc: &ToolChoice) -> ResponsesToolChoice {
    match tc {
        ToolChoice::Auto { .. } => ResponsesToolChoice::Mode(ToolChoiceMode::Auto),
        ToolChoice::Any { .. } => ResponsesToolChoice::Mode(ToolChoiceMode::Required),
        ToolChoice::None => ResponsesToolChoice::Mode(ToolChoiceMode::None),
        ToolChoice::Tool { name, .. } => {
            ResponsesToolChoice::Named(NamedToolChoice::Function { name: name.clone() })
        }
    }
}

/// Bucket a thinking budget into a reasoning effort.
pub fn budget_to_effort(budget_tokens: u64) -> ReasoningEffort {
    match budget_tokens {
        0..=4095 => ReasoningEffort::Low,
        4096..=16383 => ReasoningEffort::Medium,
        _ => ReasoningEffort::High,
    }
}

// ---------------------------------------------------------------------------
// Responses -> Messages
// ---------------------------------------------------------------------------

/// Thinking budget for a reasoning effort; `None` disables thinking.
pub fn effort_to_budget(effort: ReasoningEffort) -> Option<u64> {
    match effort {
        ReasoningEffort::None => None,
        ReasoningEffort::Minimal => Some(MIN_THINKING_BUDGET),
        ReasoningEffort::Low => Some(2048),
        ReasoningEffort::Medium => Some(8192),
        ReasoningEffort::High => Some(24_576),
        ReasoningEffort::Xhigh => Some(32_768),
    }
}

/// Translate an OpenAI Responses request into an Anthropic Messages request.
pub fn responses_to_messages(
    req: &ResponsesRequest,
    opts: &ConvertOptions,
) -> TranslateResult<MessagesRequest> {
    if req.previous_response_id.is_some() {
        return Err(TranslateError::schema(
            "previous_response_id",
            "server-held conversation state cannot be resumed on a Messages backend",
        ));
    }
    if req.conversation.is_some() {
        return Err(TranslateError::schema(
            "conversation",
            "server-held conversation state cannot be resumed on a Messages backend",
        ));
    }

    let max_tokens = req
        .max_output_tokens
        .or(opts.default_max_tokens)
        .ok_or_else(|| {
            TranslateError::schema(
                "max_output_tokens",
                "required by the Messages API and no default is configured",
            )
        })?;

    let mut system_parts: Vec<String> = req
        .instructions
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect();
    let mut folder = MessageFolder::default();

    match &req.input {
        None => {}
        Some(ResponsesInput::Text(text)) => {
            folder.push(Role::User, ContentBlock::Text { text: text.clone() })
        }
        Some(ResponsesInput::Items(items)) => {
            for (i, item) in items.iter().enumerate() {
                item_to_blocks(item, i, &mut folder, &mut system_parts)?;
            }
        }
    }

    let tools = match &req.tools {
        Some(tools) => {
            let converted: Vec<Tool> = tools.iter().filter_map(tool_to_messages).collect();
            (!converted.is_empty()).then_some(converted)
        }
        None => None,
    };

    let tool_choice = tool_choice_to_messages(req.tool_choice.as_ref(), req.parallel_tool_calls);

    let thinking = req
        .reasoning
        .as_ref()
        .and_then(|r| r.effort)
        .and_then(effort_to_budget)
        .and_then(|budget| {
            // The budget must stay below max_tokens.
            let clamped = budget.min(max_tokens.saturating_sub(1));
            if clamped < MIN_THINKING_BUDGET {
                tracing::debug!(
                    max_tokens,
                    "Thinking disabled: budget does not fit under max_tokens"
                );
                None
            } else {
                Some(ThinkingConfig::Enabled {
                    budget_tokens: clamped,
                })
            }
        });

    // Extended thinking rejects custom temperatures.
    let temperature = match (&thinking, req.temperature) {
        (Some(_), Some(t)) if (t - 1.0).abs() > f64::EPSILON => {
            tracing::debug!(temperature = t, "Dropping temperature while thinking is enabled");
            None
        }
        (_, t) => t.map(|t| t.min(1.0)),
    };

    let system = (!system_parts.is_empty()).then(|| SystemContent::Text(system_parts.join("\n\n")));

    Ok(MessagesRequest {
        model: req.model.clone(),
        max_tokens,
        messages: folder.finish(),
        system,
        stream: req.stream,
        temperature,
        top_p: req.top_p,
        top_k: None,
        tools,
        tool_choice,
        metadata: req.user.as_ref().map(|u| Metadata {
            user_id: Some(u.clone()),
            extra: Default::default(),
        }),
        stop_sequences: None,
        thinking,
        extra: Default::default(),
    })
}

/// Folds a flat item list into alternating messages, merging consecutive
/// same-role content into one message.
#[derive(Default)]
struct MessageFolder {
    messages: Vec<Message>,
}

impl MessageFolder {
    fn push(&mut self, role: Role, block: ContentBlock) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == role {
                if let MessageContent::Blocks(ref mut blocks) = last.content {
                    blocks.push(block);
                    return;
                }
            }
        }
        self.messages.push(Message {
            role,
            content: MessageContent::Blocks(vec![block]),
        });
    }

    fn finish(self) -> Vec<Message> {
        self.messages
    }
}

fn item_to_blocks(
    item: &InputItem,
    index: usize,
    folder: &mut MessageFolder,
    system_parts: &mut Vec<String>,
) -> TranslateResult<()> {
    let context = format!("input[{}]", index);
    match item {
        InputItem::Message(msg) => match msg.role {
            InputRole::System | InputRole::Developer => {
                let text = message_text(&msg.content, &context)?;
                if !text.is_empty() {
                    system_parts.push(text);
                }
            }
            InputRole::User | InputRole::Assistant => {
                let role = if msg.role == InputRole::User {
                    Role::User
                } else {
                    Role::Assistant
                };
                match &msg.content {
                    InputMessageContent::Text(text) => {
                        folder.push(role, ContentBlock::Text { text: text.clone() })
                    }
                    InputMessageContent::Parts(parts) => {
                        for part in parts {
                            folder.push(role, part_to_block(part, role, &context)?);
                        }
                    }
                }
            }
        },
        InputItem::FunctionCall(call) => {
            folder.push(
                Role::Assistant,
                ContentBlock::ToolUse {
                    id: call.call_id.clone(),
                    name: call.name.clone(),
                    input: arguments_to_input(&call.arguments, &context)?,
                },
            );
        }
        InputItem::CustomToolCall(CustomToolCallItem {
            call_id, name, input, ..
        }) => {
            folder.push(
                Role::Assistant,
                ContentBlock::ToolUse {
                    id: call_id.clone(),
                    name: name.clone(),
                    input: json!({ "input": input }),
                },
            );
        }
        InputItem::FunctionCallOutput(out) => {
            folder.push(Role::User, tool_output_to_block(&out.call_id, &out.output, &context)?);
        }
        InputItem::CustomToolCallOutput(out) => {
            folder.push(Role::User, tool_output_to_block(&out.call_id, &out.output, &context)?);
        }
        // Encrypted reasoning is not portable to Anthropic.
        InputItem::Reasoning(_) => {}
        InputItem::ItemReference { .. } => {
            return Err(TranslateError::unsupported("item_reference", context));
        }
        InputItem::Unsupported { item_type } => {
            return Err(TranslateError::unsupported(item_type.clone(), context));
        }
    }
    Ok(())
}

fn message_text(content: &InputMessageContent, context: &str) -> TranslateResult<String> {
    match content {
        InputMessageContent::Text(text) => Ok(text.clone()),
        InputMessageContent::Parts(parts) => {
            let mut texts = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    InputContent::InputText { text } | InputContent::OutputText { text, .. } => {
                        texts.push(text.as_str())
                    }
                    other => {
                        return Err(TranslateError::unsupported(
                            part_type_name(other),
                            format!("{} (system message)", context),
                        ))
                    }
                }
            }
            Ok(texts.join("\n"))
        }
    }
}

fn part_to_block(part: &InputContent, role: Role, context: &str) -> TranslateResult<ContentBlock> {
    let unsupported = |why: &str| {
        TranslateError::unsupported(part_type_name(part), format!("{} ({})", context, why))
    };

    match part {
        InputContent::InputText { text } | InputContent::OutputText { text, .. } => {
            Ok(ContentBlock::Text { text: text.clone() })
        }
        InputContent::Refusal { refusal } => Ok(ContentBlock::Text {
            text: refusal.clone(),
        }),
        InputContent::InputImage { .. } | InputContent::InputFile { .. }
            if role == Role::Assistant =>
        {
            Err(unsupported("assistant turn"))
        }
        InputContent::InputImage {
            image_url, file_id, ..
        } => match image_url {
            Some(url) => Ok(ContentBlock::Image {
                source: url_to_source(url, "image/png"),
            }),
            None if file_id.is_some() => Err(unsupported("file_id reference")),
            None => Err(TranslateError::schema(
                format!("{}.image_url", context),
                "input_image needs an image_url",
            )),
        },
        InputContent::InputFile {
            file_data,
            file_url,
            filename,
            ..
        } => {
            let source = match (file_data, file_url) {
                (Some(data), _) if data.starts_with("data:") => {
                    url_to_source(data, "application/pdf")
                }
                (Some(data), _) => MediaSource::Base64 {
                    media_type: "application/pdf".to_string(),
                    data: data.clone(),
                },
                (None, Some(url)) => MediaSource::Url { url: url.clone() },
                (None, None) => return Err(unsupported("file_id reference")),
            };
            Ok(ContentBlock::Document {
                source,
                title: filename.clone(),
            })
        }
        InputContent::InputAudio { .. } => Err(unsupported("audio input")),
        InputContent::Unsupported { .. } => Err(unsupported("unknown part type")),
    }
}

fn part_type_name(part: &InputContent) -> String {
    match part {
        InputContent::InputText { .. } => "input_text".to_string(),
        InputContent::InputImage { .. } => "input_image".to_string(),
        InputContent::InputFile { .. } => "input_file".to_string(),
        InputContent::InputAudio { .. } => "input_audio".to_string(),
        InputContent::OutputText { .. } => "output_text".to_string(),
        InputContent::Refusal { .. } => "refusal".to_string(),
        InputContent::Unsupported { part_type } => part_type.clone(),
    }
}

/// `data:<media>;base64,<payload>` becomes an inline source; anything else is a URL.
fn url_to_source(url: &str, fallback_media_type: &str) -> MediaSource {
    if let Some(rest) = url.strip_prefix("data:") {
        if let Some((meta, data)) = rest.split_once(',') {
            if let Some(media_type) = meta.strip_suffix(";base64") {
                let media_type = if media_type.is_empty() {
                    fallback_media_type
                } else {
                    media_type
                };
                return MediaSource::Base64 {
                    media_type: media_type.to_string(),
                    data: data.to_string(),
                };
            }
        }
    }
    MediaSource::Url {
        url: url.to_string(),
    }
}

/// Tool arguments arrive as a JSON string. Unparseable arguments are kept
/// verbatim under `_raw` so the model still sees what it produced.
fn arguments_to_input(arguments: &str, context: &str) -> TranslateResult<Value> {
    if arguments.trim().is_empty() {
        return Ok(json!({}));
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(v @ Value::Object(_)) => Ok(v),
        Ok(_) => Err(TranslateError::schema(
            format!("{}.arguments", context),
            "tool arguments must be a JSON object",
        )),
        Err(_) => Ok(json!({ "_raw": arguments })),
    }
}

fn tool_output_to_block(
    call_id: &str,
    output: &FunctionOutput,
    context: &str,
) -> TranslateResult<ContentBlock> {
    let content = match output {
        FunctionOutput::Text(text) => ToolResultContent::Text(text.clone()),
        FunctionOutput::Parts(parts) => {
            let blocks = parts
                .iter()
                .map(|p| part_to_block(p, Role::User, context))
                .collect::<TranslateResult<Vec<_>>>()?;
            ToolResultContent::Blocks(blocks)
        }
    };
    Ok(ContentBlock::ToolResult {
        tool_use_id: call_id.to_string(),
        content: Some(content),
        is_error: None,
    })
}

fn tool_to_messages(tool: &ResponsesTool) -> Option<Tool> {
    match tool {
        ResponsesTool::Function {
            name,
            description,
            parameters,
            ..
        } => Some(Tool {
            name: name.clone(),
            description: description.clone(),
            input_schema: parameters.clone().unwrap_or_else(|| json!({ "type": "object" })),
            tool_type: None,
        }),
        ResponsesTool::Custom {
            name, description, ..
        } => Some(Tool {
            name: name.clone(),
            description: description.clone(),
            input_schema: json!({
                "type": "object",
                "properties": { "input": { "type": "string" } },
                "required": ["input"]
            }),
            tool_type: None,
        }),
        ResponsesTool::Hosted => {
            tracing::warn!("Dropping hosted tool with no Messages counterpart");
            None
        }
    }
}

fn tool_choice_to_messages(
    choice: Option<&ResponsesToolChoice>,
    parallel_tool_calls: Option<bool>,
) -> Option<ToolChoice> {
    let disable_parallel_tool_use = (parallel_tool_calls == Some(false)).then_some(true);

    match choice {
        None => disable_parallel_tool_use.map(|_| ToolChoice::Auto {
            disable_parallel_tool_use,
        }),
        Some(ResponsesToolChoice::Mode(ToolChoiceMode::None)) => Some(ToolChoice::None),
        Some(ResponsesToolChoice::Mode(ToolChoiceMode::Auto)) => Some(ToolChoice::Auto {
            disable_parallel_tool_use,
        }),
        Some(ResponsesToolChoice::Mode(ToolChoiceMode::Required)) => Some(ToolChoice::Any {
            disable_parallel_tool_use,
        }),
        Some(ResponsesToolChoice::Named(
            NamedToolChoice::Function { name } | NamedToolChoice::Custom { name },
        )) => Some(ToolChoice::Tool {
            name: name.clone(),
            disable_parallel_tool_use,
        }),
        Some(ResponsesToolChoice::Named(NamedToolChoice::Hosted)) => {
            tracing::warn!("Hosted tool_choice has no Messages counterpart, using auto");
            Some(ToolChoice::Auto {
                disable_parallel_tool_use,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::messages_types::*;
    use crate::translate::responses_types::*;

    fn messages_request(messages: Vec<Message>) -> MessagesRequest {
        MessagesRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            messages,
            system: None,
            stream: None,
            temperature: None,
            top_p: None,
            top_k: None,
            tools: None,
            tool_choice: None,
            metadata: None,
            stop_sequences: None,
            thinking: None,
            extra: Default::default(),
        }
    }

    fn responses_request(input: serde_json::Value) -> ResponsesRequest {
        serde_json::from_value(json!({
            "model": "gpt-5",
            "max_output_tokens": 512,
            "input": input,
        }))
        .unwrap()
    }

    #[test]
    fn test_simple_text_request() {
        let mut req = messages_request(vec![Message {
            role: Role::User,
            content: MessageContent::Text("Hello".to_string()),
        }]);
        req.system = Some(SystemContent::Text("You are helpful".to_string()));
        req.temperature = Some(0.3);

        let out = messages_to_responses(&req).unwrap();
        assert_eq!(out.instructions.as_deref(), Some("You are helpful"));
        assert_eq!(out.max_output_tokens, Some(1024));
        assert_eq!(out.temperature, Some(0.3));
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["input"][0]["type"], "message");
        assert_eq!(value["input"][0]["role"], "user");
        assert_eq!(value["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(value["input"][0]["content"][0]["text"], "Hello");
    }

    #[test]
    fn test_tool_use_and_result_split_into_items() {
        let req = messages_request(vec![
            Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(vec![
                    ContentBlock::Text {
                        text: "Checking".to_string(),
                    },
                    ContentBlock::ToolUse {
                        id: "toolu_1".to_string(),
                        name: "search".to_string(),
                        input: json!({"q": "rust"}),
                    },
                ]),
            },
            Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![
                    ContentBlock::ToolResult {
                        tool_use_id: "toolu_1".to_string(),
                        content: Some(ToolResultContent::Text("boom".to_string())),
                        is_error: Some(true),
                    },
                    ContentBlock::Text {
                        text: "Now continue".to_string(),
                    },
                ]),
            },
        ]);

        let out = messages_to_responses(&req).unwrap();
        let items = match out.input {
            Some(ResponsesInput::Items(items)) => items,
            other => panic!("unexpected input {other:?}"),
        };
        assert_eq!(items.len(), 4);
        assert!(matches!(items[0], InputItem::Message(_)));
        match &items[1] {
            InputItem::FunctionCall(call) => {
                assert_eq!(call.call_id, "toolu_1");
                assert_eq!(call.name, "search");
                assert_eq!(
                    serde_json::from_str::<Value>(&call.arguments).unwrap(),
                    json!({"q": "rust"})
                );
            }
            other => panic!("unexpected item {other:?}"),
        }
        match &items[2] {
            InputItem::FunctionCallOutput(out) => {
                assert_eq!(out.output, FunctionOutput::Text("ERROR: boom".to_string()));
            }
            other => panic!("unexpected item {other:?}"),
        }
        assert!(matches!(items[3], InputItem::Message(_)));
    }

    #[test]
    fn test_base64_image_becomes_data_url() {
        let req = messages_request(vec![Message {
            role: Role::User,
            content: MessageContent::Blocks(vec![ContentBlock::Image {
                source: MediaSource::Base64 {
                    media_type: "image/png".to_string(),
                    data: "AAAA".to_string(),
                },
            }]),
        }]);
        let value = serde_json::to_value(messages_to_responses(&req).unwrap()).unwrap();
        assert_eq!(
            value["input"][0]["content"][0]["image_url"],
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn test_assistant_image_is_unsupported() {
        let req = messages_request(vec![Message {
            role: Role::Assistant,
            content: MessageContent::Blocks(vec![ContentBlock::Image {
                source: MediaSource::Url {
                    url: "https://example.com/a.png".to_string(),
                },
            }]),
        }]);
        let err = messages_to_responses(&req).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::UnsupportedContentType { ref content_type, .. } if content_type == "image"
        ));
    }

    #[test]
    fn test_tool_choice_and_thinking_mapping() {
        let mut req = messages_request(vec![]);
        req.tools = Some(vec![
            Tool {
                name: "lookup".to_string(),
                description: Some("Look things up".to_string()),
                input_schema: json!({"type": "object", "properties": {"q": {"type": "string"}}}),
                tool_type: None,
            },
            Tool {
                name: "web_search".to_string(),
                description: None,
                input_schema: json!({"type": "object"}),
                tool_type: Some("web_search_20250305".to_string()),
            },
        ]);
        req.tool_choice = Some(ToolChoice::Any {
            disable_parallel_tool_use: Some(true),
        });
        req.thinking = Some(ThinkingConfig::Enabled {
            budget_tokens: 10_000,
        });

        let out = messages_to_responses(&req).unwrap();
        assert_eq!(out.tools.as_ref().map(Vec::len), Some(1));
        assert_eq!(
            out.tool_choice,
            Some(ResponsesToolChoice::Mode(ToolChoiceMode::Required))
        );
        assert_eq!(out.parallel_tool_calls, Some(false));
        assert_eq!(
            out.reasoning.and_then(|r| r.effort),
            Some(ReasoningEffort::Medium)
        );
    }

    #[test]
    fn test_responses_items_fold_into_messages() {
        let req = responses_request(json!([
            {"role": "developer", "content": "Be terse."},
            {"role": "user", "content": "What's the weather?"},
            {"type": "function_call", "call_id": "call_1", "name": "weather", "arguments": "{\"city\":\"Oslo\"}"},
            {"type": "function_call", "call_id": "call_2", "name": "time", "arguments": "not json"},
            {"type": "function_call_output", "call_id": "call_1", "output": "rain"},
            {"type": "function_call_output", "call_id": "call_2", "output": "noon"},
            {"type": "reasoning", "id": "rs_1", "summary": []}
        ]));

        let out = responses_to_messages(&req, &ConvertOptions::default()).unwrap();
        assert_eq!(out.max_tokens, 512);
        assert_eq!(out.system.as_ref().map(SystemContent::as_text).as_deref(), Some("Be terse."));
        assert_eq!(out.messages.len(), 3);
        assert_eq!(out.messages[0].role, Role::User);
        assert_eq!(out.messages[1].role, Role::Assistant);
        assert_eq!(out.messages[2].role, Role::User);

        let assistant = out.messages[1].content.blocks();
        assert_eq!(
            assistant[0],
            ContentBlock::ToolUse {
                id: "call_1".to_string(),
                name: "weather".to_string(),
                input: json!({"city": "Oslo"}),
            }
        );
        assert_eq!(
            assistant[1],
            ContentBlock::ToolUse {
                id: "call_2".to_string(),
                name: "time".to_string(),
                input: json!({"_raw": "not json"}),
            }
        );
        assert_eq!(out.messages[2].content.blocks().len(), 2);
    }

    #[test]
    fn test_missing_max_output_tokens() {
        let mut req = responses_request(json!("hi"));
        req.max_output_tokens = None;
        let err = responses_to_messages(&req, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::SchemaViolation { ref field, .. } if field == "max_output_tokens"
        ));

        let opts = ConvertOptions {
            default_max_tokens: Some(4096),
            ..Default::default()
        };
        assert_eq!(responses_to_messages(&req, &opts).unwrap().max_tokens, 4096);
    }

    #[test]
    fn test_server_state_is_rejected() {
        let mut req = responses_request(json!("hi"));
        req.previous_response_id = Some("resp_123".to_string());
        let err = responses_to_messages(&req, &ConvertOptions::default()).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_unsupported_parts_and_items() {
        let req = responses_request(json!([
            {"role": "user", "content": [{"type": "input_audio", "input_audio": {"data": "", "format": "wav"}}]}
        ]));
        let err = responses_to_messages(&req, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::UnsupportedContentType { ref content_type, .. } if content_type == "input_audio"
        ));

        let req = responses_request(json!([{"type": "item_reference", "id": "msg_1"}]));
        assert!(responses_to_messages(&req, &ConvertOptions::default()).is_err());

        let req = responses_request(json!([
            {"role": "user", "content": [{"type": "input_image", "file_id": "file_1"}]}
        ]));
        assert!(responses_to_messages(&req, &ConvertOptions::default()).is_err());
    }

    #[test]
    fn test_data_url_image_and_temperature_clamp() {
        let mut req = responses_request(json!([
            {"role": "user", "content": [
                {"type": "input_text", "text": "describe"},
                {"type": "input_image", "image_url": "data:image/jpeg;base64,QUJD"}
            ]}
        ]));
        req.temperature = Some(1.6);

        let out = responses_to_messages(&req, &ConvertOptions::default()).unwrap();
        assert_eq!(out.temperature, Some(1.0));
        assert_eq!(
            out.messages[0].content.blocks()[1],
            ContentBlock::Image {
                source: MediaSource::Base64 {
                    media_type: "image/jpeg".to_string(),
                    data: "QUJD".to_string()
                }
            }
        );
    }

    #[test]
    fn test_reasoning_effort_budget_is_clamped() {
        let mut req = responses_request(json!("think"));
        req.reasoning = Some(ReasoningConfig {
            effort: Some(ReasoningEffort::High),
            summary: None,
        });
        req.max_output_tokens = Some(4000);
        let out = responses_to_messages(&req, &ConvertOptions::default()).unwrap();
        assert_eq!(
            out.thinking,
            Some(ThinkingConfig::Enabled {
                budget_tokens: 3999
            })
        );

        req.max_output_tokens = Some(800);
        let out = responses_to_messages(&req, &ConvertOptions::default()).unwrap();
        assert_eq!(out.thinking, None);
    }

    #[test]
    fn test_custom_tools_and_named_choice() {
        let mut req = responses_request(json!([
            {"type": "custom_tool_call", "call_id": "call_9", "name": "apply_patch", "input": "*** Begin Patch"}
        ]));
        req.tools = Some(vec![
            ResponsesTool::Custom {
                name: "apply_patch".to_string(),
                description: None,
                format: None,
            },
            ResponsesTool::Hosted,
        ]);
        req.tool_choice = Some(ResponsesToolChoice::Named(NamedToolChoice::Custom {
            name: "apply_patch".to_string(),
        }));
        req.parallel_tool_calls = Some(false);

        let out = responses_to_messages(&req, &ConvertOptions::default()).unwrap();
        let tools = out.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].input_schema["properties"]["input"]["type"], "string");
        assert_eq!(
            out.tool_choice,
            Some(ToolChoice::Tool {
                name: "apply_patch".to_string(),
                disable_parallel_tool_use: Some(true)
            })
        );
        assert_eq!(
            out.messages[0].content.blocks()[0],
            ContentBlock::ToolUse {
                id: "call_9".to_string(),
                name: "apply_patch".to_string(),
                input: json!({"input": "*** Begin Patch"}),
            }
        );
    }

    #[test]
    fn test_round_trip_preserves_prompt_tools_and_sampling() {
        let mut original = messages_request(vec![Message {
            role: Role::User,
            content: MessageContent::Text("Summarize this".to_string()),
        }]);
        original.system = Some(SystemContent::Text("You are terse".to_string()));
        original.temperature = Some(0.5);
        original.top_p = Some(0.9);
        original.tools = Some(vec![Tool {
            name: "lookup".to_string(),
            description: Some("Look up".to_string()),
            input_schema: json!({"type": "object", "properties": {"id": {"type": "integer"}}}),
            tool_type: None,
        }]);

        let there = messages_to_responses(&original).unwrap();
        let back = responses_to_messages(&there, &ConvertOptions::default()).unwrap();

        assert_eq!(back.max_tokens, original.max_tokens);
        assert_eq!(back.temperature, original.temperature);
        assert_eq!(back.top_p, original.top_p);
        assert_eq!(
            back.system.as_ref().map(SystemContent::as_text),
            Some("You are terse".to_string())
        );
        assert_eq!(back.tools, original.tools);
        assert_eq!(
            back.messages[0].content.blocks(),
            vec![ContentBlock::Text {
                text: "Summarize this".to_string()
            }]
        );
    }
}
