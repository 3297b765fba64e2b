//! The shared keyword-activity summary: one row per `(keyword, date, source)`.
//!
//! Two stores are provided:
//!  - `MemorySummaryStore` for tests and embedding.
//!  - `FileSummaryStore`, an NDJSON file loaded on open and replaced atomically on `flush`.
//!
//! Rows are only ever inserted or replaced. Nothing here deletes a key.

use crate::config::Source;
use crate::date::Day;
use crate::ndjson::{NdjsonReader, NdjsonWriter};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SummaryKey {
    pub keyword: String,
    pub date: Day,
    pub source: Source,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeywordDayCount {
    pub keyword: String,
    pub date: Day,
    pub source: Source,
    pub count: u64,
}

impl KeywordDayCount {
    pub fn key(&self) -> SummaryKey {
        SummaryKey { keyword: self.keyword.clone(), date: self.date, source: self.source }
    }

    fn from_entry(k: &SummaryKey, count: u64) -> Self {
        Self { keyword: k.keyword.clone(), date: k.date, source: k.source, count }
    }
}

/// On-disk document shape: `{"_id":{"keyword":..,"date":..,"source":..},"count":N}`.
#[derive(Serialize, Deserialize)]
struct SummaryDoc {
    #[serde(rename = "_id")]
    key: SummaryKey,
    count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// Key existed with the same count.
    Unchanged,
}

/// Equality/range predicate over summary keys. Empty filter matches everything.
#[derive(Clone, Debug, Default)]
pub struct SummaryFilter {
    pub sources: Option<Vec<Source>>,
    pub keyword: Option<String>,
    pub from: Option<Day>, // inclusive
    pub to: Option<Day>,   // inclusive
}

impl SummaryFilter {
    pub fn all() -> Self {
        Self::default()
    }
    pub fn sources<I: IntoIterator<Item = Source>>(mut self, sources: I) -> Self {
        let mut v: Vec<Source> = sources.into_iter().collect();
        v.sort();
        v.dedup();
        self.sources = Some(v);
        self
    }
    /// Exact, case-sensitive match on the stored (already lower-cased) keyword.
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }
    pub fn between(mut self, from: Option<Day>, to: Option<Day>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn matches(&self, k: &SummaryKey) -> bool {
        if let Some(ref sources) = self.sources {
            if sources.binary_search(&k.source).is_err() { return false; }
        }
        if let Some(ref kw) = self.keyword {
            if &k.keyword != kw { return false; }
        }
        if let Some(lo) = self.from {
            if k.date < lo { return false; }
        }
        if let Some(hi) = self.to {
            if k.date > hi { return false; }
        }
        true
    }
}

pub trait SummaryStore: Send + Sync {
    /// Insert the row, or replace the count of the existing row with the same key.
    fn upsert(&self, row: &KeywordDayCount) -> Result<UpsertOutcome>;
    /// Matching rows ordered by (keyword, date, source).
    fn scan(&self, filter: &SummaryFilter) -> Result<Vec<KeywordDayCount>>;
    /// Persist pending writes. No-op for stores without a backing medium.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Table {
    rows: BTreeMap<SummaryKey, u64>,
}

impl Table {
    fn upsert(&mut self, row: &KeywordDayCount) -> UpsertOutcome {
        match self.rows.insert(row.key(), row.count) {
            None => UpsertOutcome::Inserted,
            Some(prev) if prev == row.count => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Replaced,
        }
    }

    fn scan(&self, filter: &SummaryFilter) -> Vec<KeywordDayCount> {
        let matching = |(k, n): (&SummaryKey, &u64)| filter.matches(k).then(|| KeywordDayCount::from_entry(k, *n));
        match filter.keyword {
            // Keys are ordered by keyword first, so an exact keyword is a contiguous range.
            Some(ref kw) => self
                .rows
                .iter()
                .skip_while(|(k, _)| &k.keyword < kw)
                .take_while(|(k, _)| &k.keyword == kw)
                .filter_map(matching)
                .collect(),
            None => self.rows.iter().filter_map(matching).collect(),
        }
    }
}

#[derive(Default)]
pub struct MemorySummaryStore {
    table: RwLock<Table>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SummaryStore for MemorySummaryStore {
    fn upsert(&self, row: &KeywordDayCount) -> Result<UpsertOutcome> {
        Ok(self.table.write().upsert(row))
    }

    fn scan(&self, filter: &SummaryFilter) -> Result<Vec<KeywordDayCount>> {
        Ok(self.table.read().scan(filter))
    }
}

/// NDJSON-backed summary store.
pub struct FileSummaryStore {
    path: PathBuf,
    write_buf: usize,
    table: RwLock<Table>,
    dirty: AtomicBool,
}

impl FileSummaryStore {
    /// Load `path` if it exists; a missing file is an empty store.
    /// A file that cannot be read or parsed is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_buffers(path, 256 * 1024, 256 * 1024)
    }

    pub fn open_with_buffers(path: impl AsRef<Path>, read_buf: usize, write_buf: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut table = Table::default();

        match NdjsonReader::open(&path, read_buf) {
            Ok(mut rdr) => {
                let mut buf = String::new();
                let mut line_no = 0usize;
                loop {
                    let n = rdr.read_line(&mut buf).with_context(|| format!("read {}", path.display()))?;
                    if n == 0 { break; }
                    line_no += 1;
                    if buf.trim().is_empty() { continue; }
                    let doc: SummaryDoc = serde_json::from_str(&buf)
                        .with_context(|| format!("{}:{}: malformed summary row", path.display(), line_no))?;
                    table.rows.insert(doc.key, doc.count);
                }
                tracing::debug!(path=%path.display(), rows=table.rows.len(), "Loaded summary store");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path=%path.display(), "Summary store does not exist yet; starting empty");
            }
            Err(e) => return Err(e).with_context(|| format!("open summary store {}", path.display())),
        }

        Ok(Self { path, write_buf, table: RwLock::new(table), dirty: AtomicBool::new(false) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self.path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "summary".into());
        self.path.with_file_name(format!("{name}.tmp"))
    }
}

impl SummaryStore for FileSummaryStore {
    fn upsert(&self, row: &KeywordDayCount) -> Result<UpsertOutcome> {
        let outcome = self.table.write().upsert(row);
        if outcome != UpsertOutcome::Unchanged {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(outcome)
    }

    fn scan(&self, filter: &SummaryFilter) -> Result<Vec<KeywordDayCount>> {
        Ok(self.table.read().scan(filter))
    }

    fn flush(&self) -> Result<()> {
        // Hold the table read lock across the write so the file matches one consistent state.
        let table = self.table.read();
        if !self.dirty.load(Ordering::Acquire) && self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let tmp = self.tmp_path();
        let mut w = NdjsonWriter::create(&tmp, self.write_buf).with_context(|| format!("create {}", tmp.display()))?;
        for (key, count) in &table.rows {
            let line = serde_json::to_string(&SummaryDoc { key: key.clone(), count: *count })?;
            w.write_line(&line).with_context(|| format!("write {}", tmp.display()))?;
        }
        w.finish_atomic(&self.path)?;
        self.dirty.store(false, Ordering::Release);
        tracing::debug!(path=%self.path.display(), rows=table.rows.len(), "Summary store flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(k: &str, d: Day, s: Source, n: u64) -> KeywordDayCount {
        KeywordDayCount { keyword: k.into(), date: d, source: s, count: n }
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let store = MemorySummaryStore::new();
        let d = Day::new(2024, 1, 5);
        assert_eq!(store.upsert(&row("ai", d, Source::Twitter, 12)).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&row("ai", d, Source::Twitter, 12)).unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.upsert(&row("ai", d, Source::Twitter, 15)).unwrap(), UpsertOutcome::Replaced);
        assert_eq!(store.upsert(&row("ai", d, Source::Rss, 4)).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.len(), 2);
        let tw = store.scan(&SummaryFilter::all().sources([Source::Twitter])).unwrap();
        assert_eq!(tw, vec![row("ai", d, Source::Twitter, 15)]);
    }

    #[test]
    fn filter_by_keyword_and_range() {
        let store = MemorySummaryStore::new();
        for (k, day) in [("a", 1), ("b", 1), ("b", 2), ("b", 3), ("c", 2)] {
            store.upsert(&row(k, Day::new(2024, 1, day), Source::Reddit, 3)).unwrap();
        }
        let got = store
            .scan(&SummaryFilter::all().keyword("b").between(Some(Day::new(2024, 1, 2)), None))
            .unwrap();
        assert_eq!(got.iter().map(|r| r.date.day).collect::<Vec<_>>(), vec![2, 3]);
        assert!(store.scan(&SummaryFilter::all().keyword("B")).unwrap().is_empty());
    }

    #[test]
    fn file_store_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("summary.ndjson");
        let d = Day::new(2024, 1, 5);

        let store = FileSummaryStore::open(&path).unwrap();
        assert!(store.is_empty());
        store.upsert(&row("energy", d, Source::Rss, 3)).unwrap();
        store.flush().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), r#"{"_id":{"keyword":"energy","date":"2024-01-05","source":"rss"},"count":3}"#);

        let reopened = FileSummaryStore::open(&path).unwrap();
        assert_eq!(reopened.scan(&SummaryFilter::all()).unwrap(), vec![row("energy", d, Source::Rss, 3)]);
    }

    #[test]
    fn file_store_rejects_corrupt_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.ndjson");
        fs::write(&path, "{not json}\n").unwrap();
        assert!(FileSummaryStore::open(&path).is_err());
    }
}
