//! Reddit comment texts, kept once per distinct text.
//!
//! A text that is already stored is reported as a duplicate, never rewritten.
//! Store errors are kept apart from duplicates and land in the report.

use crate::ndjson::{NdjsonReader, NdjsonWriter};
use crate::pipeline::ScanStats;
use crate::util::backoff_sleep;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentOutcome {
    Inserted,
    Duplicate,
}

/// Keyed store of comment texts.
pub trait CommentStore: Send + Sync {
    fn insert(&self, text: &str) -> Result<CommentOutcome>;

    /// Stored texts, ascending.
    fn texts(&self) -> Result<Vec<String>>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CommentDoc {
    comment: String,
}

fn insert_into(set: &RwLock<BTreeSet<String>>, text: &str) -> CommentOutcome {
    if set.read().contains(text) {
        return CommentOutcome::Duplicate;
    }
    match set.write().insert(text.to_string()) {
        true => CommentOutcome::Inserted,
        false => CommentOutcome::Duplicate,
    }
}

#[derive(Default)]
pub struct MemoryCommentStore {
    texts: RwLock<BTreeSet<String>>,
}

impl MemoryCommentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.texts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CommentStore for MemoryCommentStore {
    fn insert(&self, text: &str) -> Result<CommentOutcome> {
        Ok(insert_into(&self.texts, text))
    }

    fn texts(&self) -> Result<Vec<String>> {
        Ok(self.texts.read().iter().cloned().collect())
    }
}

/// NDJSON-backed comment store, one `{"comment": ..}` per line.
pub struct FileCommentStore {
    path: PathBuf,
    write_buf: usize,
    texts: RwLock<BTreeSet<String>>,
    dirty: AtomicBool,
}

impl FileCommentStore {
    /// Load `path` if it exists; a missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_buffers(path, 256 * 1024, 256 * 1024)
    }

    pub fn open_with_buffers(path: impl AsRef<Path>, read_buf: usize, write_buf: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut texts = BTreeSet::new();

        match NdjsonReader::open(&path, read_buf) {
            Ok(mut rdr) => {
                let mut buf = String::new();
                let mut line_no = 0usize;
                loop {
                    let n = rdr.read_line(&mut buf).with_context(|| format!("read {}", path.display()))?;
                    if n == 0 { break; }
                    line_no += 1;
                    if buf.trim().is_empty() { continue; }
                    let doc: CommentDoc = serde_json::from_str(&buf)
                        .with_context(|| format!("{}:{}: malformed comment row", path.display(), line_no))?;
                    texts.insert(doc.comment);
                }
                tracing::debug!(path=%path.display(), comments=texts.len(), "Loaded comment store");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path=%path.display(), "Comment store does not exist yet; starting empty");
            }
            Err(e) => return Err(e).with_context(|| format!("open comment store {}", path.display())),
        }

        Ok(Self { path, write_buf, texts: RwLock::new(texts), dirty: AtomicBool::new(false) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.texts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CommentStore for FileCommentStore {
    fn insert(&self, text: &str) -> Result<CommentOutcome> {
        let outcome = insert_into(&self.texts, text);
        if outcome == CommentOutcome::Inserted {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(outcome)
    }

    fn texts(&self) -> Result<Vec<String>> {
        Ok(self.texts.read().iter().cloned().collect())
    }

    fn flush(&self) -> Result<()> {
        let texts = self.texts.read();
        if !self.dirty.load(Ordering::Acquire) && self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let name = self.path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "comments".into());
        let tmp = self.path.with_file_name(format!("{name}.tmp"));
        let mut w = NdjsonWriter::create(&tmp, self.write_buf).with_context(|| format!("create {}", tmp.display()))?;
        for text in texts.iter() {
            let line = serde_json::to_string(&CommentDoc { comment: text.clone() })?;
            w.write_line(&line).with_context(|| format!("write {}", tmp.display()))?;
        }
        w.finish_atomic(&self.path)?;
        self.dirty.store(false, Ordering::Release);
        tracing::debug!(path=%self.path.display(), comments=texts.len(), "Comment store flushed");
        Ok(())
    }
}

/// Outcome of one comments pass over the Reddit exports.
#[derive(Clone, Debug, Default)]
pub struct CommentReport {
    pub scan: ScanStats,
    /// Non-blank comment texts found in the posts.
    pub comments: u64,
    pub inserted: u64,
    pub duplicates: u64,
    /// Texts the store kept rejecting after retries, with the last error.
    pub failures: Vec<(String, String)>,
    pub elapsed: Duration,
}

impl CommentReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn merge(&mut self, o: CommentReport) {
        self.scan.merge(o.scan);
        self.comments += o.comments;
        self.inserted += o.inserted;
        self.duplicates += o.duplicates;
        self.failures.extend(o.failures);
    }

    /// Insert one text, retrying store errors `retries` times.
    pub(crate) fn insert<S>(&mut self, store: &S, text: &str, retries: usize, delay_ms: u64)
    where
        S: CommentStore + ?Sized,
    {
        self.comments += 1;
        let mut attempt = 0usize;
        loop {
            match store.insert(text) {
                Ok(CommentOutcome::Inserted) => self.inserted += 1,
                Ok(CommentOutcome::Duplicate) => self.duplicates += 1,
                Err(e) if attempt < retries => {
                    tracing::debug!(attempt, error=%e, "Comment insert failed; retrying");
                    backoff_sleep(attempt, delay_ms);
                    attempt += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error=%e, "Comment insert failed; comment skipped");
                    self.failures.push((text.to_string(), format!("{e:#}")));
                }
            }
            break;
        }
    }
}
