use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Path prefix used for projects whose working directory was never recorded.
pub const UNKNOWN_PROJECT_PREFIX: &str = "/unknown/";

/// Characters that would split a stored row.
pub const ROW_BREAKING_CHARS: [char; 3] = ['\t', '\r', '\n'];

/// Whether `value` can be stored as a single column without splitting a row.
pub fn is_row_safe(value: &str) -> bool {
    !value.contains(ROW_BREAKING_CHARS)
}

/// The four raw counts reported by a usage block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_create: u64,
}

impl TokenCounts {
    pub fn billable(&self) -> u64 {
        self.input.saturating_add(self.output)
    }

    pub fn total_with_cache(&self) -> u64 {
        self.billable()
            .saturating_add(self.cache_read)
            .saturating_add(self.cache_create)
    }

    /// Dedup key built from the counts alone, e.g. `100|50|20|10`.
    pub fn signature(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.input, self.output, self.cache_read, self.cache_create
        )
    }
}

/// One measured unit of assistant work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub ts_epoch: i64,
    pub ts_iso: String,
    pub project_slug: String,
    pub session_id: String,
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_create: u64,
    pub billable: u64,
    pub total_with_cache: u64,
    pub content_type: String,
    pub signature: String,
}

impl UsageEvent {
    /// Builds an event and fills in the derived columns from `counts`.
    /// Tabs and line breaks in `content_type` become spaces.
    pub fn from_counts(
        ts_epoch: i64,
        ts_iso: &str,
        project_slug: &str,
        session_id: &str,
        counts: TokenCounts,
        content_type: &str,
    ) -> Self {
        Self {
            ts_epoch,
            ts_iso: ts_iso.to_string(),
            project_slug: project_slug.to_string(),
            session_id: session_id.to_string(),
            input: counts.input,
            output: counts.output,
            cache_read: counts.cache_read,
            cache_create: counts.cache_create,
            billable: counts.billable(),
            total_with_cache: counts.total_with_cache(),
            content_type: content_type.replace(ROW_BREAKING_CHARS, " "),
            signature: counts.signature(),
        }
    }

    pub fn counts(&self) -> TokenCounts {
        TokenCounts {
            input: self.input,
            output: self.output,
            cache_read: self.cache_read,
            cache_create: self.cache_create,
        }
    }
}

impl AsRef<UsageEvent> for UsageEvent {
    fn as_ref(&self) -> &UsageEvent {
        self
    }
}

/// A usage event annotated with the human prompt that preceded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEvent {
    #[serde(flatten)]
    pub event: UsageEvent,
    pub prompt_preview: String,
}

impl AsRef<UsageEvent> for LiveEvent {
    fn as_ref(&self) -> &UsageEvent {
        &self.event
    }
}

/// Total order used for every merged event stream: epoch, then the raw
/// timestamp, project, session and signature.
pub fn compare_chronological(a: &UsageEvent, b: &UsageEvent) -> Ordering {
    a.ts_epoch
        .cmp(&b.ts_epoch)
        .then_with(|| a.ts_iso.cmp(&b.ts_iso))
        .then_with(|| a.project_slug.cmp(&b.project_slug))
        .then_with(|| a.session_id.cmp(&b.session_id))
        .then_with(|| a.signature.cmp(&b.signature))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub slug: String,
    pub path: String,
}

impl ProjectEntry {
    /// Uses `path` when known, otherwise the `/unknown/<slug>` placeholder.
    pub fn discovered(slug: &str, path: &str) -> Self {
        let path = if path.is_empty() {
            format!("{UNKNOWN_PROJECT_PREFIX}{slug}")
        } else {
            path.to_string()
        };
        Self {
            slug: slug.to_string(),
            path,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.path.starts_with(UNKNOWN_PROJECT_PREFIX)
    }
}

/// Aggregated token counts over a set of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub events: u64,
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_create: u64,
    pub billable: u64,
    pub total_with_cache: u64,
}

impl UsageSummary {
    pub fn add(&mut self, event: &UsageEvent) {
        self.events += 1;
        self.input = self.input.saturating_add(event.input);
        self.output = self.output.saturating_add(event.output);
        self.cache_read = self.cache_read.saturating_add(event.cache_read);
        self.cache_create = self.cache_create.saturating_add(event.cache_create);
        self.billable = self.billable.saturating_add(event.billable);
        self.total_with_cache = self.total_with_cache.saturating_add(event.total_with_cache);
    }
}
