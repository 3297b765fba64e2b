#![allow(dead_code)]

use kwetl::{KeywordDayCount, KeywordETL, Source, SummaryFilter, SummaryStore};
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway export tree: `<root>/twitter`, `<root>/reddit`, `<root>/rss`.
pub struct Corpus {
    dir: TempDir,
}

impl Corpus {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for s in Source::ALL {
            fs::create_dir_all(dir.path().join(s.as_str())).unwrap();
        }
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_dir(&self, source: Source) -> PathBuf {
        self.root().join(source.as_str())
    }

    /// Write a plain NDJSON export under the source's directory.
    pub fn write_plain(&self, source: Source, name: &str, docs: &[Value]) -> PathBuf {
        let path = self.source_dir(source).join(name);
        let mut f = File::create(&path).unwrap();
        for d in docs {
            writeln!(f, "{}", d).unwrap();
        }
        path
    }

    /// Write a zstd-compressed NDJSON export under the source's directory.
    pub fn write_zst(&self, source: Source, name: &str, docs: &[Value]) -> PathBuf {
        let path = self.source_dir(source).join(name);
        let f = File::create(&path).unwrap();
        let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
        for d in docs {
            writeln!(&mut enc, "{}", d).unwrap();
        }
        enc.finish().unwrap();
        path
    }

    /// Write raw bytes through zstd, for exports that are not clean NDJSON.
    pub fn write_zst_bytes(&self, source: Source, name: &str, body: &[u8]) -> PathBuf {
        let path = self.source_dir(source).join(name);
        let mut enc = zstd::stream::write::Encoder::new(File::create(&path).unwrap(), 3).unwrap();
        enc.write_all(body).unwrap();
        enc.finish().unwrap();
        path
    }

    /// Batch job over this corpus with quiet, deterministic settings.
    pub fn etl(&self) -> KeywordETL {
        KeywordETL::new()
            .data_dir(self.root())
            .progress(false)
            .retry_delay_ms(0)
            .low_memory_fraction(0.0)
    }
}

/// Extended-JSON date as emitted by `mongoexport`.
pub fn date(rfc3339: &str) -> Value {
    json!({ "$date": rfc3339 })
}

pub fn tweet(id: &str, created_at: Value, trend: &str, hashtags: &[&str]) -> Value {
    json!({ "_id": { "$oid": id }, "created_at": created_at, "trend": trend, "hashtags": hashtags, "lang": "en" })
}

pub fn reddit(id: &str, created: Value, keywords: &[&str]) -> Value {
    json!({ "_id": id, "created": created, "keywords": keywords, "subreddit": "worldnews" })
}

/// A Reddit post with embedded comments, as the scraper stores them.
pub fn reddit_with_comments(id: &str, created: Value, comments: &[&str]) -> Value {
    let comments: Vec<Value> = comments
        .iter()
        .map(|t| json!({ "text": t, "sentiment": { "compound": 0.0 } }))
        .collect();
    json!({ "_id": id, "created": created, "keywords": [], "subreddit": "worldnews", "comments": comments })
}

pub fn rss(id: &str, published: Value, tags: &[&str]) -> Value {
    json!({ "_id": id, "published": published, "tags": tags, "feed": "example" })
}

/// `n` tweets on `day` that all carry `hashtag`.
pub fn tweets_with(prefix: &str, day: &str, trend: &str, hashtag: &str, n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| tweet(&format!("{prefix}{i}"), date(&format!("{day}T12:00:00Z")), trend, &[hashtag]))
        .collect()
}

pub fn all_rows(store: &dyn SummaryStore) -> Vec<KeywordDayCount> {
    store.scan(&SummaryFilter::all()).unwrap()
}

/// `(keyword, date, count)` as returned by `rows_of`.
pub fn row(keyword: &str, day: &str, count: u64) -> (String, String, u64) {
    (keyword.to_string(), day.to_string(), count)
}

pub fn rows_of(store: &dyn SummaryStore, source: Source) -> Vec<(String, String, u64)> {
    store
        .scan(&SummaryFilter::all().sources([source]))
        .unwrap()
        .into_iter()
        .map(|r| (r.keyword, r.date.to_string(), r.count))
        .collect()
}
