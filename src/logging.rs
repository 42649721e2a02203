//! Translation journal: a JSONL-backed ring buffer of what the bridge did.
//!
//! Each entry records one stage of a request's life (the incoming request,
//! the upstream call, the translated reply, stream summaries). Payloads are
//! optional and always scrubbed of credentials and truncated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_LOG_ENTRIES: usize = 10_000;

/// Keys whose values never reach the journal.
const SECRET_KEYS: &[&str] = &["authorization", "api_key", "x-api-key", "x-openai-api-key"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Startup,
    ClientRequest,
    UpstreamRequest,
    UpstreamResponse,
    ClientResponse,
    Stream,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            stage,
            message: message.into(),
            request_id: None,
            payload: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Ring buffer persisted to JSONL. Existing entries are reloaded on start.
pub struct TranslationLog {
    entries: VecDeque<LogEntry>,
    file_path: std::path::PathBuf,
    writer: Option<BufWriter<File>>,
}

impl TranslationLog {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut entries = VecDeque::with_capacity(MAX_LOG_ENTRIES);

        if file_path.exists() {
            let file = File::open(&file_path)?;
            let reader = BufReader::new(file);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(entry) = serde_json::from_str::<LogEntry>(&line) {
                    if entries.len() >= MAX_LOG_ENTRIES {
                        entries.pop_front();
                    }
                    entries.push_back(entry);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        Ok(Self {
            entries,
            file_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// In-memory only; used by tests and the offline CLI.
    pub fn in_memory() -> Self {
        Self {
            entries: VecDeque::new(),
            file_path: std::path::PathBuf::new(),
            writer: None,
        }
    }

    pub fn log(&mut self, entry: LogEntry) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
        if self.entries.len() >= MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Rewrite the file so it holds only the retained entries.
    pub fn compact(&mut self) -> std::io::Result<()> {
        if self.writer.is_none() {
            return Ok(());
        }
        self.writer = None;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.file_path)?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            if let Ok(json) = serde_json::to_string(entry) {
                writeln!(writer, "{}", json)?;
            }
        }
        writer.flush()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }
}

#[derive(Clone)]
pub struct SharedLog {
    inner: Arc<Mutex<TranslationLog>>,
    payloads: bool,
    max_chars: usize,
}

impl SharedLog {
    pub fn new(
        file_path: impl AsRef<Path>,
        payloads: bool,
        max_chars: usize,
    ) -> std::io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(TranslationLog::new(file_path)?)),
            payloads,
            max_chars,
        })
    }

    pub fn in_memory(payloads: bool, max_chars: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TranslationLog::in_memory())),
            payloads,
            max_chars,
        }
    }

    pub fn log(&self, entry: LogEntry) {
        if let Ok(mut log) = self.inner.lock() {
            log.log(entry);
        }
    }

    pub fn info(&self, stage: Stage, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, stage, message));
    }

    pub fn warn(&self, stage: Stage, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warn, stage, message));
    }

    pub fn error(&self, stage: Stage, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, stage, message));
    }

    pub fn debug(&self, stage: Stage, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Debug, stage, message));
    }

    /// Record a payload for `request_id`; a no-op unless payload logging is on.
    pub fn payload(
        &self,
        stage: Stage,
        request_id: &str,
        message: impl Into<String>,
        payload: &Value,
    ) {
        if !self.payloads {
            return;
        }
        let entry = LogEntry::new(LogLevel::Debug, stage, message)
            .with_request_id(request_id)
            .with_payload(truncate_value(&scrub(payload), self.max_chars));
        self.log(entry);
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.inner.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }
}

/// Replace credential values anywhere in `value` with `"***"`.
pub fn scrub(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if SECRET_KEYS.contains(&k.to_ascii_lowercase().as_str()) {
                        (k.clone(), Value::String("***".to_string()))
                    } else {
                        (k.clone(), scrub(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(scrub).collect()),
        other => other.clone(),
    }
}

/// Keep `value` as is when its JSON text fits in `max_chars`, otherwise
/// store a truncated string of it.
pub fn truncate_value(value: &Value, max_chars: usize) -> Value {
    let text = value.to_string();
    if text.chars().count() <= max_chars {
        return value.clone();
    }
    let cut: String = text.chars().take(max_chars).collect();
    Value::String(format!("{}... (truncated, {} chars total)", cut, text.chars().count()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_scrub_nested_secrets() {
        let scrubbed = scrub(&json!({
            "model": "gpt-4.1",
            "headers": {"Authorization": "Bearer sk-123", "x-openai-api-key": "sk-456"},
            "items": [{"api_key": "sk-789"}]
        }));
        assert_eq!(scrubbed["model"], "gpt-4.1");
        assert_eq!(scrubbed["headers"]["Authorization"], "***");
        assert_eq!(scrubbed["headers"]["x-openai-api-key"], "***");
        assert_eq!(scrubbed["items"][0]["api_key"], "***");
    }

    #[test]
    fn test_truncate_value() {
        let small = json!({"a": 1});
        assert_eq!(truncate_value(&small, 100), small);

        let big = json!({"text": "x".repeat(50)});
        let out = truncate_value(&big, 10);
        assert!(out.as_str().unwrap().contains("truncated"));
    }

    #[test]
    fn test_journal_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");

        let log = SharedLog::new(&path, true, 4000).unwrap();
        log.info(Stage::ClientRequest, "model=claude-sonnet-4 streaming=false");
        log.payload(Stage::UpstreamRequest, "req_1", "upstream body", &json!({"api_key": "secret"}));

        let reloaded = TranslationLog::new(&path).unwrap();
        let recent = reloaded.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].stage, Stage::UpstreamRequest);
        assert_eq!(recent[0].payload.as_ref().unwrap()["api_key"], "***");
        assert_eq!(recent[1].message, "model=claude-sonnet-4 streaming=false");
    }

    #[test]
    fn test_payloads_skipped_when_disabled() {
        let log = SharedLog::in_memory(false, 4000);
        log.payload(Stage::ClientResponse, "req_1", "body", &json!({"ok": true}));
        assert!(log.recent(10).is_empty());
    }
}
