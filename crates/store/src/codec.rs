use std::str::FromStr;

use usage_core::{LiveEvent, UsageEvent};

use crate::error::DecodeError;

pub const EVENTS_HEADER: &str = "ts_epoch\tts_iso\tproject_slug\tsession_id\tinput\toutput\tcache_read\tcache_create\tbillable\ttotal_with_cache\tcontent_type\tsignature";

pub const LIVE_EVENTS_HEADER: &str = "ts_epoch\tts_iso\tproject_slug\tsession_id\tprompt_preview\tinput\toutput\tcache_read\tcache_create\tbillable\ttotal_with_cache\tcontent_type\tsignature";

const EVENT_FIELDS: usize = 12;
const LIVE_EVENT_FIELDS: usize = 13;

/// A value stored as one tab-separated row under a fixed header.
pub trait TsvRecord: Sized {
    const HEADER: &'static str;

    fn encode(&self) -> String;

    fn decode(line: &str) -> Result<Self, DecodeError>;
}

impl TsvRecord for UsageEvent {
    const HEADER: &'static str = EVENTS_HEADER;

    fn encode(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.ts_epoch,
            self.ts_iso,
            self.project_slug,
            self.session_id,
            self.input,
            self.output,
            self.cache_read,
            self.cache_create,
            self.billable,
            self.total_with_cache,
            self.content_type,
            self.signature,
        )
    }

    fn decode(line: &str) -> Result<Self, DecodeError> {
        let fields = split_fields(line, EVENT_FIELDS)?;
        decode_event(&fields[..4], &fields[4..])
    }
}

impl TsvRecord for LiveEvent {
    const HEADER: &'static str = LIVE_EVENTS_HEADER;

    fn encode(&self) -> String {
        let event = &self.event;
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            event.ts_epoch,
            event.ts_iso,
            event.project_slug,
            event.session_id,
            self.prompt_preview,
            event.input,
            event.output,
            event.cache_read,
            event.cache_create,
            event.billable,
            event.total_with_cache,
            event.content_type,
            event.signature,
        )
    }

    fn decode(line: &str) -> Result<Self, DecodeError> {
        let fields = split_fields(line, LIVE_EVENT_FIELDS)?;
        let event = decode_event(&fields[..4], &fields[5..])?;
        Ok(LiveEvent {
            event,
            prompt_preview: fields[4].to_string(),
        })
    }
}

fn split_fields(line: &str, expected: usize) -> Result<Vec<&str>, DecodeError> {
    let fields: Vec<&str> = line.split('\t').collect();
    let found = fields.len();
    if found < expected {
        return Err(DecodeError::MissingFields { expected, found });
    }
    if found > expected {
        return Err(DecodeError::ExtraFields { expected, found });
    }
    Ok(fields)
}

/// `head` is `ts_epoch, ts_iso, project_slug, session_id`; `tail` starts at `input`.
fn decode_event(head: &[&str], tail: &[&str]) -> Result<UsageEvent, DecodeError> {
    Ok(UsageEvent {
        ts_epoch: parse_field(head[0], "ts_epoch")?,
        ts_iso: head[1].to_string(),
        project_slug: head[2].to_string(),
        session_id: head[3].to_string(),
        input: parse_field(tail[0], "input")?,
        output: parse_field(tail[1], "output")?,
        cache_read: parse_field(tail[2], "cache_read")?,
        cache_create: parse_field(tail[3], "cache_create")?,
        billable: parse_field(tail[4], "billable")?,
        total_with_cache: parse_field(tail[5], "total_with_cache")?,
        content_type: tail[6].to_string(),
        signature: tail[7].to_string(),
    })
}

fn parse_field<T: FromStr>(raw: &str, field: &'static str) -> Result<T, DecodeError> {
    raw.parse::<T>().map_err(|_| DecodeError::InvalidInteger {
        field,
        value: raw.to_string(),
    })
}
