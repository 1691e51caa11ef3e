use std::fs;

use ingest::{IngestError, SyncConfig, sync};
use serde_json::Value;
use tempfile::{TempDir, tempdir};
use usage_store::{EVENTS_HEADER, LIVE_EVENTS_HEADER, ReportStore};

const SLUG: &str = "-Users-test-my-project";

const SESSION_ONE: &str = r#"{"cwd":"/Users/test/my-project","type":"user","message":{"role":"user","content":"Hello"},"timestamp":"2025-01-15T10:00:00.000Z"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Hi!"}],"usage":{"input_tokens":100,"output_tokens":50,"cache_read_input_tokens":20,"cache_creation_input_tokens":10}},"timestamp":"2025-01-15T10:00:10.000Z","isApiErrorMessage":false}
{"type":"user","message":{"role":"user","content":"Write code"},"timestamp":"2025-01-15T10:01:00.000Z"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Here's code"}],"usage":{"input_tokens":200,"output_tokens":150,"cache_read_input_tokens":40,"cache_creation_input_tokens":15}},"timestamp":"2025-01-15T10:01:10.000Z","isApiErrorMessage":false}
"#;

const SESSION_TWO: &str = r#"{"type":"user","message":{"role":"user","content":"Fix bug"},"timestamp":"2025-01-15T11:00:00.000Z"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Fixed!"}],"usage":{"input_tokens":300,"output_tokens":100,"cache_read_input_tokens":0,"cache_creation_input_tokens":0}},"timestamp":"2025-01-15T11:00:05.000Z","isApiErrorMessage":false}
"#;

struct Fixture {
    dir: TempDir,
    config: SyncConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().expect("temp dir");
        let config = SyncConfig::new(
            dir.path().join("source"),
            dir.path().join("data"),
            dir.path().join("claude.json"),
        );
        Self { dir, config }
    }

    fn write_session(&self, slug: &str, name: &str, contents: &str) {
        let project_dir = self.config.source_root.join(slug);
        fs::create_dir_all(&project_dir).expect("create project dir");
        fs::write(project_dir.join(name), contents).expect("write session");
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.config.data_root.join(name)).expect("read output")
    }

    fn read_json(&self, name: &str) -> Value {
        serde_json::from_str(&self.read(name)).expect("parse output")
    }
}

fn data_lines(contents: &str) -> Vec<&str> {
    contents.lines().skip(1).collect()
}

#[test]
fn sync_writes_sorted_event_stores() {
    let fixture = Fixture::new();
    fixture.write_session(SLUG, "session-002.jsonl", SESSION_TWO);
    fixture.write_session(SLUG, "session-001.jsonl", SESSION_ONE);

    let result = sync(&fixture.config).expect("sync");
    assert_eq!(result.session_files, 2);
    assert_eq!(result.event_rows, 3);
    assert_eq!(result.live_event_rows, 3);
    assert_eq!(
        result.source_root,
        fixture.config.source_root.to_string_lossy()
    );
    assert!(result.issues.is_empty());

    let events = fixture.read("events.tsv");
    assert!(events.ends_with('\n'));
    let lines: Vec<&str> = events.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], EVENTS_HEADER);
    assert!(lines[1].contains("session-001") && lines[1].contains("2025-01-15T10:00:10.000Z"));
    assert!(lines[2].contains("session-001") && lines[2].contains("2025-01-15T10:01:10.000Z"));
    assert!(lines[3].contains("session-002"));
    assert!(lines[1].starts_with("1736935210\t"));

    let live = fixture.read("live-events.tsv");
    let live_lines: Vec<&str> = live.lines().collect();
    assert_eq!(live_lines.len(), 4);
    assert_eq!(live_lines[0], LIVE_EVENTS_HEADER);
    let previews: Vec<&str> = data_lines(&live)
        .iter()
        .map(|line| line.split('\t').nth(4).expect("preview column"))
        .collect();
    assert_eq!(previews, vec!["Hello", "Write code", "Fix bug"]);

    let status = fixture.read_json("sync-status.json");
    assert_eq!(status["session_files"], 2);
    assert_eq!(status["event_rows"], 3);
    assert_eq!(status["live_event_rows"], 3);
    assert_eq!(
        status["source_root"],
        fixture.config.source_root.to_string_lossy().to_string()
    );
    assert!(status["last_sync_epoch"].as_i64().expect("epoch") > 0);
    assert!(status["last_sync_iso"].as_str().expect("iso").ends_with('Z'));

    let stored = ReportStore::at(&fixture.config.data_root)
        .read_events()
        .expect("read back");
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|event| event.billable == event.input + event.output));
}

#[test]
fn sync_is_idempotent() {
    let fixture = Fixture::new();
    fixture.write_session(SLUG, "session-001.jsonl", SESSION_ONE);
    fixture.write_session("-Users-test-other", "session-002.jsonl", SESSION_TWO);

    sync(&fixture.config).expect("first sync");
    let first: Vec<String> = ["events.tsv", "live-events.tsv", "projects.json"]
        .iter()
        .map(|name| fixture.read(name))
        .collect();

    sync(&fixture.config).expect("second sync");
    sync(&fixture.config).expect("third sync");
    let third: Vec<String> = ["events.tsv", "live-events.tsv", "projects.json"]
        .iter()
        .map(|name| fixture.read(name))
        .collect();
    assert_eq!(first, third);
}

#[test]
fn distinct_sessions_keep_identical_measurements() {
    let fixture = Fixture::new();
    fixture.write_session(SLUG, "session-001.jsonl", SESSION_ONE);
    fixture.write_session(SLUG, "session-001-copy.jsonl", SESSION_ONE);
    fixture.write_session("-Users-mirror", "session-001.jsonl", SESSION_ONE);

    let result = sync(&fixture.config).expect("sync");
    assert_eq!(result.session_files, 3);
    assert_eq!(result.event_rows, 6);

    let events = fixture.read("events.tsv");
    let mut rows = data_lines(&events);
    let before = rows.len();
    rows.sort();
    rows.dedup();
    assert_eq!(rows.len(), before);
}

#[test]
fn identical_rows_within_one_project_session_collapse() {
    let fixture = Fixture::new();
    let replay = format!("{SESSION_TWO}{SESSION_TWO}");
    fixture.write_session(SLUG, "session-002.jsonl", &replay);

    let result = sync(&fixture.config).expect("sync");
    assert_eq!(result.event_rows, 1);
    assert_eq!(result.live_event_rows, 1);
}

#[test]
fn missing_source_root_is_an_empty_successful_sync() {
    let fixture = Fixture::new();

    let result = sync(&fixture.config).expect("sync");
    assert_eq!(result.session_files, 0);
    assert_eq!(result.event_rows, 0);
    assert_eq!(fixture.read("events.tsv"), format!("{EVENTS_HEADER}\n"));
    assert_eq!(fixture.read("live-events.tsv"), format!("{LIVE_EVENTS_HEADER}\n"));
    assert_eq!(fixture.read("projects.json"), "[]\n");
    assert_eq!(fixture.read("account.json"), "{}\n");
    assert_eq!(fixture.read_json("sync-status.json")["session_files"], 0);
}

#[test]
fn only_jsonl_files_one_level_deep_are_read() {
    let fixture = Fixture::new();
    fixture.write_session(SLUG, "session-001.jsonl", SESSION_ONE);
    fixture.write_session(SLUG, "notes.txt", SESSION_TWO);
    fixture.write_session(&format!("{SLUG}/nested"), "deep.jsonl", SESSION_TWO);
    fs::write(fixture.config.source_root.join("top.jsonl"), SESSION_TWO).expect("write top");

    let result = sync(&fixture.config).expect("sync");
    assert_eq!(result.session_files, 1);
    assert_eq!(result.event_rows, 2);
}

#[test]
fn projects_use_cwd_or_placeholder() {
    let fixture = Fixture::new();
    fixture.write_session(SLUG, "session-001.jsonl", SESSION_ONE);
    fixture.write_session(SLUG, "session-002.jsonl", SESSION_TWO);
    fixture.write_session("-tmp-scratch", "a.jsonl", SESSION_TWO);

    sync(&fixture.config).expect("sync");
    let projects = fixture.read_json("projects.json");
    assert_eq!(
        projects,
        serde_json::json!([
            {"slug": SLUG, "path": "/Users/test/my-project"},
            {"slug": "-tmp-scratch", "path": "/unknown/-tmp-scratch"},
        ])
    );
}

#[test]
fn account_profile_is_projected_or_empty() {
    let fixture = Fixture::new();
    fs::write(&fixture.config.account_file, "{ not json").expect("write account");
    sync(&fixture.config).expect("sync");
    assert_eq!(fixture.read("account.json"), "{}\n");

    fs::write(
        &fixture.config.account_file,
        r#"{"oauthAccount":{"displayName":"Test","emailAddress":"t@example.com"},"userID":"u1"}"#,
    )
    .expect("write account");
    sync(&fixture.config).expect("sync");
    let account = fixture.read_json("account.json");
    assert_eq!(account["display_name"], "Test");
    assert_eq!(account["email"], "t@example.com");
    assert_eq!(account["user_id"], "u1");
    assert!(account["generated_at"].is_string());
}

#[test]
fn unusable_data_root_is_fatal() {
    let fixture = Fixture::new();
    fixture.write_session(SLUG, "session-001.jsonl", SESSION_ONE);
    let blocked = fixture.dir.path().join("blocked");
    fs::write(&blocked, "a file, not a directory").expect("write blocker");
    let config = SyncConfig::new(
        &fixture.config.source_root,
        blocked.join("data"),
        &fixture.config.account_file,
    );

    let err = sync(&config).expect_err("data root under a file");
    assert!(matches!(err, IngestError::Store(_)));
}

#[test]
fn output_dir_contains_only_reports() {
    let fixture = Fixture::new();
    fixture.write_session(SLUG, "session-001.jsonl", SESSION_ONE);
    sync(&fixture.config).expect("sync");

    let mut names: Vec<String> = fs::read_dir(&fixture.config.data_root)
        .expect("read data root")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "account.json",
            "events.tsv",
            "live-events.tsv",
            "projects.json",
            "sync-status.json",
        ]
    );
}

#[test]
fn bare_jsonl_name_is_a_session_with_empty_id() {
    let fixture = Fixture::new();
    fixture.write_session(SLUG, ".jsonl", SESSION_TWO);

    let result = sync(&fixture.config).expect("sync");
    assert_eq!(result.session_files, 1);
    assert_eq!(result.event_rows, 1);
    let stored = ReportStore::at(&fixture.config.data_root)
        .read_events()
        .expect("read back");
    assert_eq!(stored[0].session_id, "");
}

#[test]
fn row_breaking_content_types_survive_a_round_trip() {
    const SESSION: &str = r#"{"type":"assistant","message":{"content":[{"type":"a\tb"}],"usage":{"input_tokens":1,"output_tokens":1}},"timestamp":"2025-01-15T10:00:00Z"}
{"type":"assistant","message":{"content":[{"type":"x\ny"}],"usage":{"input_tokens":2,"output_tokens":2}},"timestamp":"2025-01-15T10:00:01Z"}
"#;
    let fixture = Fixture::new();
    fixture.write_session(SLUG, "session-001.jsonl", SESSION);

    let result = sync(&fixture.config).expect("sync");
    assert_eq!(result.event_rows, 2);
    assert_eq!(fixture.read("events.tsv").lines().count(), 3);
    assert_eq!(fixture.read("live-events.tsv").lines().count(), 3);

    let store = ReportStore::at(&fixture.config.data_root);
    let stored = store.read_events().expect("read events");
    let types: Vec<&str> = stored.iter().map(|e| e.content_type.as_str()).collect();
    assert_eq!(types, vec!["a b", "x y"]);
    assert_eq!(stored[0].signature, "1|1|0|0");
    assert_eq!(store.read_live_events().expect("read live").len(), 2);
}

#[cfg(unix)]
#[test]
fn unreadable_session_is_reported_and_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new();
    fixture.write_session(SLUG, "session-001.jsonl", SESSION_ONE);
    fixture.write_session("-Users-test-locked", "session-002.jsonl", SESSION_TWO);
    let locked = fixture
        .config
        .source_root
        .join("-Users-test-locked")
        .join("session-002.jsonl");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");
    if fs::File::open(&locked).is_ok() {
        // Running with privileges that ignore file modes.
        return;
    }

    let result = sync(&fixture.config).expect("sync");
    assert_eq!(result.session_files, 2);
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].file_path, locked.to_string_lossy());
    assert_eq!(result.event_rows, 2);
    assert_eq!(data_lines(&fixture.read("events.tsv")).len(), 2);

    let projects = fixture.read_json("projects.json");
    let slugs: Vec<&str> = projects
        .as_array()
        .expect("project list")
        .iter()
        .map(|entry| entry["slug"].as_str().expect("slug"))
        .collect();
    assert!(slugs.contains(&"-Users-test-locked"));
    assert!(slugs.contains(&SLUG));

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).expect("restore mode");
}
