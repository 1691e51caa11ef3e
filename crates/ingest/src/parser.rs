use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use chrono::DateTime;
use serde::Deserialize;
use serde::de::IgnoredAny;
use usage_core::{LiveEvent, TokenCounts, UsageEvent, is_row_safe};

const PREVIEW_MAX_CHARS: usize = 180;
const PREVIEW_KEEP_CHARS: usize = 177;
const PREVIEW_ELLIPSIS: &str = "...";
const NO_PROMPT: &str = "-";

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(rename = "isApiErrorMessage", default)]
    is_api_error_message: Option<bool>,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

impl From<&Usage> for TokenCounts {
    fn from(usage: &Usage) -> Self {
        Self {
            input: usage.input_tokens,
            output: usage.output_tokens,
            cache_read: usage.cache_read_input_tokens,
            cache_create: usage.cache_creation_input_tokens,
        }
    }
}

/// Message payload, resolved once when the line is decoded.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
pub(crate) enum Content {
    #[default]
    Absent,
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl ContentBlock {
    fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }
}

impl Content {
    /// Anything except a non-empty list made only of `tool_result` blocks.
    pub(crate) fn is_human_prompt(&self) -> bool {
        match self {
            Content::Blocks(blocks) if !blocks.is_empty() => {
                !blocks.iter().all(|block| block.kind() == "tool_result")
            }
            _ => true,
        }
    }

    pub(crate) fn content_type(&self) -> &str {
        match self {
            Content::Text(_) => "text",
            Content::Blocks(blocks) => match blocks.first() {
                Some(block) if !block.kind().is_empty() => block.kind(),
                _ => NO_PROMPT,
            },
            Content::Absent | Content::Other(_) => NO_PROMPT,
        }
    }

    fn prompt_text(&self) -> Cow<'_, str> {
        match self {
            Content::Text(text) => Cow::Borrowed(text),
            Content::Blocks(blocks) => Cow::Owned(
                blocks
                    .iter()
                    .filter(|block| block.kind() == "text")
                    .map(|block| block.text.as_deref().unwrap_or(""))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Content::Absent | Content::Other(_) => Cow::Borrowed(""),
        }
    }
}

/// Whether a human prompt has arrived since the last measured assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TurnState {
    AwaitingHuman,
    NotAwaiting,
}

/// Events recovered from one transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEvents {
    pub usage: Vec<UsageEvent>,
    pub live: Vec<LiveEvent>,
    pub bytes_read: u64,
}

/// Per-file state machine feeding both event streams.
struct SessionScanner<'a> {
    project_slug: &'a str,
    session_id: &'a str,
    state: TurnState,
    last_signature: Option<String>,
    last_prompt: String,
    out: SessionEvents,
}

impl<'a> SessionScanner<'a> {
    fn new(project_slug: &'a str, session_id: &'a str) -> Self {
        Self {
            project_slug,
            session_id,
            state: TurnState::NotAwaiting,
            last_signature: None,
            last_prompt: NO_PROMPT.to_string(),
            out: SessionEvents::default(),
        }
    }

    fn observe_line(&mut self, line: &[u8]) {
        if line.is_empty() {
            return;
        }
        let Ok(row) = serde_json::from_slice::<Row>(line) else {
            return;
        };
        self.observe(row);
    }

    fn observe(&mut self, row: Row) {
        let Some(message) = row.message.as_ref() else {
            return;
        };
        match row.kind.as_deref() {
            Some("user") => {
                if message.content.is_human_prompt() {
                    self.state = TurnState::AwaitingHuman;
                    self.last_prompt = prompt_preview(&message.content.prompt_text());
                }
            }
            Some("assistant") => {
                let Some(usage) = message.usage.as_ref() else {
                    return;
                };
                if row.is_api_error_message == Some(true) {
                    return;
                }
                let ts_iso = row.timestamp.as_deref().unwrap_or("");
                if !is_row_safe(ts_iso) {
                    return;
                }
                let counts = TokenCounts::from(usage);
                let signature = counts.signature();
                let repeated = self.last_signature.as_deref() == Some(signature.as_str());
                if !(repeated && self.state == TurnState::NotAwaiting) {
                    let event = UsageEvent::from_counts(
                        parse_epoch(ts_iso),
                        ts_iso,
                        self.project_slug,
                        self.session_id,
                        counts,
                        message.content.content_type(),
                    );
                    self.out.live.push(LiveEvent {
                        event: event.clone(),
                        prompt_preview: self.last_prompt.clone(),
                    });
                    self.out.usage.push(event);
                }
                self.last_signature = Some(signature);
                self.state = TurnState::NotAwaiting;
            }
            _ => {}
        }
    }

    fn finish(self) -> SessionEvents {
        self.out
    }
}

/// Scans a transcript. Malformed lines are skipped; only read failures error.
pub fn session_events_from_reader<R: BufRead>(
    mut reader: R,
    project_slug: &str,
    session_id: &str,
) -> io::Result<SessionEvents> {
    let mut scanner = SessionScanner::new(project_slug, session_id);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let bytes = reader.read_until(b'\n', &mut buf)?;
        if bytes == 0 {
            break;
        }
        scanner.out.bytes_read = scanner.out.bytes_read.saturating_add(bytes as u64);
        scanner.observe_line(trim_line_end(&buf));
    }
    Ok(scanner.finish())
}

pub fn parse_session_file(
    path: &Path,
    project_slug: &str,
    session_id: &str,
) -> io::Result<SessionEvents> {
    let file = File::open(path)?;
    session_events_from_reader(BufReader::new(file), project_slug, session_id)
}

#[derive(Debug, Deserialize)]
struct CwdProbe {
    #[serde(default)]
    cwd: Option<String>,
}

/// First non-empty `cwd` recorded in the transcript, or an empty string.
pub fn project_path_from_reader<R: BufRead>(mut reader: R) -> String {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => return String::new(),
            Ok(_) => {}
        }
        let Ok(probe) = serde_json::from_slice::<CwdProbe>(trim_line_end(&buf)) else {
            continue;
        };
        if let Some(cwd) = probe.cwd.filter(|cwd| !cwd.is_empty()) {
            return cwd;
        }
    }
}

pub fn extract_project_path(path: &Path) -> String {
    match File::open(path) {
        Ok(file) => project_path_from_reader(BufReader::new(file)),
        Err(_) => String::new(),
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Seconds since the epoch, or 0 for anything unparsable.
///
/// Fractional seconds are stripped first and must be followed by a zone
/// marker (`Z`, `+` or `-`); a fraction with no zone yields 0.
pub fn parse_epoch(ts: &str) -> i64 {
    if ts.is_empty() {
        return 0;
    }
    let cleaned = match ts.find('.') {
        Some(dot) => {
            let rest = &ts[dot + 1..];
            match rest.find(['Z', '+', '-']) {
                Some(zone) => Cow::Owned(format!("{}{}", &ts[..dot], &rest[zone..])),
                None => return 0,
            }
        }
        None => Cow::Borrowed(ts),
    };
    DateTime::parse_from_rfc3339(&cleaned)
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

/// Turns tabs and line breaks into spaces, collapses runs, trims the ends.
pub fn clean_text(text: &str) -> String {
    text.split([' ', '\t', '\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn prompt_preview(text: &str) -> String {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return NO_PROMPT.to_string();
    }
    if cleaned.chars().count() > PREVIEW_MAX_CHARS {
        let mut truncated: String = cleaned.chars().take(PREVIEW_KEEP_CHARS).collect();
        truncated.push_str(PREVIEW_ELLIPSIS);
        return truncated;
    }
    cleaned
}
