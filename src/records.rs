//! Typed projections of exported source documents.
//! Only the fields needed for keyword extraction are deserialized; extra fields are ignored.

use crate::config::Source;
use crate::date::{day_from_extended_json, Day};
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

/// A tweet as exported from the tweets collection.
#[derive(Debug, Default, Deserialize)]
pub struct Tweet {
    #[serde(rename = "_id", default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default, deserialize_with = "strings_lenient")]
    pub hashtags: Vec<String>,
}

/// A Reddit post with its extracted keywords.
#[derive(Debug, Default, Deserialize)]
pub struct RedditPost {
    #[serde(rename = "_id", default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub created: Option<Value>,
    #[serde(default, deserialize_with = "strings_lenient")]
    pub keywords: Vec<String>,
    /// `text` of every entry of the embedded `comments` array.
    #[serde(rename = "comments", default, deserialize_with = "comment_texts")]
    pub comment_texts: Vec<String>,
}

/// An RSS article; `published` is frequently null or a raw string in feeds.
#[derive(Debug, Default, Deserialize)]
pub struct RssArticle {
    #[serde(rename = "_id", default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub published: Option<Value>,
    #[serde(default, deserialize_with = "strings_lenient")]
    pub tags: Vec<String>,
}

impl Tweet {
    pub fn day(&self) -> Option<Day> {
        self.created_at.as_ref().and_then(day_from_extended_json)
    }
}

impl RedditPost {
    pub fn day(&self) -> Option<Day> {
        self.created.as_ref().and_then(day_from_extended_json)
    }
}

impl RssArticle {
    pub fn day(&self) -> Option<Day> {
        self.published.as_ref().and_then(day_from_extended_json)
    }
}

/// One parsed document of any source.
#[derive(Debug)]
pub enum SourceRecord {
    Twitter(Tweet),
    Reddit(RedditPost),
    Rss(RssArticle),
}

impl SourceRecord {
    /// Parse one NDJSON line as a document of `source`.
    pub fn parse(source: Source, line: &str) -> Result<Self> {
        Ok(match source {
            Source::Twitter => SourceRecord::Twitter(serde_json::from_str(line)?),
            Source::Reddit => SourceRecord::Reddit(serde_json::from_str(line)?),
            Source::Rss => SourceRecord::Rss(serde_json::from_str(line)?),
        })
    }

    pub fn source(&self) -> Source {
        match self {
            SourceRecord::Twitter(_) => Source::Twitter,
            SourceRecord::Reddit(_) => Source::Reddit,
            SourceRecord::Rss(_) => Source::Rss,
        }
    }

    pub fn day(&self) -> Option<Day> {
        match self {
            SourceRecord::Twitter(t) => t.day(),
            SourceRecord::Reddit(p) => p.day(),
            SourceRecord::Rss(a) => a.day(),
        }
    }

    fn raw_id(&self) -> Option<&Value> {
        match self {
            SourceRecord::Twitter(t) => t.id.as_ref(),
            SourceRecord::Reddit(p) => p.id.as_ref(),
            SourceRecord::Rss(a) => a.id.as_ref(),
        }
    }

    /// Stable document identity: `_id` when present, else `fallback` (file:line).
    pub fn doc_id(&self, fallback: impl FnOnce() -> String) -> String {
        self.raw_id().and_then(id_string).unwrap_or_else(fallback)
    }
}

/// String elements of an array. `null` reads as empty; non-string elements are skipped.
fn strings_lenient<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect())
}

fn comment_texts<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .iter()
        .filter_map(|c| c.get("text").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Canonical string for `{"$oid": ..}`, string or numeric `_id` values.
pub fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(o) => o
            .get("$oid")
            .and_then(|x| x.as_str())
            .map(|s| s.to_string())
            .or_else(|| Some(v.to_string())),
        _ => None,
    }
}
