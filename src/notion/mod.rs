pub mod client;
pub mod listings;
pub mod profiles;

pub use client::Client;

use serde_json::{json, Value};

// Notion caps a single rich-text item; long fields are truncated on write.
const MAX_TEXT_CONTENT: usize = 1900;

pub(crate) fn title(value: &str) -> Value {
    json!({ "title": [{ "type": "text", "text": { "content": clip(value) } }] })
}

pub(crate) fn rich_text(value: &str) -> Value {
    if value.is_empty() {
        return json!({ "rich_text": [] });
    }
    json!({ "rich_text": [{ "type": "text", "text": { "content": clip(value) } }] })
}

pub(crate) fn number(value: i64) -> Value {
    json!({ "number": value })
}

fn clip(value: &str) -> String {
    value.chars().take(MAX_TEXT_CONTENT).collect()
}

pub(crate) fn title_text(prop: &Value) -> String {
    prop["title"][0]["plain_text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn plain_text(prop: &Value) -> String {
    prop["rich_text"][0]["plain_text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn number_value(prop: &Value) -> Option<i64> {
    prop["number"].as_i64()
}

pub(crate) fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
