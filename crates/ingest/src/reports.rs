use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use usage_core::ProjectEntry;
use usage_store::ReportStore;

/// One entry per slug, preferring a real path over the `/unknown/` placeholder,
/// ordered by path.
pub fn build_project_index(mut entries: Vec<ProjectEntry>) -> Vec<ProjectEntry> {
    entries.sort_by(|a, b| a.slug.cmp(&b.slug).then_with(|| a.path.cmp(&b.path)));

    let mut grouped: BTreeMap<String, Vec<ProjectEntry>> = BTreeMap::new();
    for entry in entries {
        grouped.entry(entry.slug.clone()).or_default().push(entry);
    }

    let mut index: Vec<ProjectEntry> = grouped
        .into_values()
        .filter_map(|candidates| {
            let chosen = candidates
                .iter()
                .position(|entry| !entry.is_placeholder())
                .unwrap_or(0);
            candidates.into_iter().nth(chosen)
        })
        .collect();
    index.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.slug.cmp(&b.slug)));
    index
}

/// Projects selected fields of the assistant's account file. `None` when the
/// contents are not JSON or carry no `oauthAccount` object.
pub fn extract_account_profile(contents: &str) -> Option<Value> {
    let raw: Value = serde_json::from_str(contents).ok()?;
    let oauth = raw.get("oauthAccount")?.as_object()?;
    let field = |source: &Map<String, Value>, key: &str| -> Value {
        source.get(key).cloned().unwrap_or(Value::Null)
    };
    let top = raw.as_object()?;
    Some(json!({
        "display_name": field(oauth, "displayName"),
        "email": field(oauth, "emailAddress"),
        "billing_type": field(oauth, "billingType"),
        "account_uuid": field(oauth, "accountUuid"),
        "organization_uuid": field(oauth, "organizationUuid"),
        "has_extra_usage_enabled": field(oauth, "hasExtraUsageEnabled"),
        "account_created_at": field(oauth, "accountCreatedAt"),
        "subscription_created_at": field(oauth, "subscriptionCreatedAt"),
        "has_available_subscription": field(top, "hasAvailableSubscription"),
        "has_opus_plan_default": field(top, "hasOpusPlanDefault"),
        "user_id": field(top, "userID"),
        "generated_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
}

/// Writes `account.json`, falling back to `{}` whenever the account file
/// cannot be used. Only the write itself can fail.
pub fn write_account_profile(store: &ReportStore, account_file: &Path) -> usage_store::Result<()> {
    let profile = match fs::read_to_string(account_file) {
        Ok(contents) => extract_account_profile(&contents).unwrap_or_else(|| {
            tracing::warn!(path = %account_file.display(), "no usable account profile");
            Value::Object(Map::new())
        }),
        Err(err) => {
            tracing::debug!(
                path = %account_file.display(),
                error = %err,
                "account file unavailable"
            );
            Value::Object(Map::new())
        }
    };
    store.write_account(&profile)
}
