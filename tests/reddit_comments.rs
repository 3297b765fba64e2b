#[path = "common/mod.rs"]
mod common;

use anyhow::{bail, Result};
use common::*;
use kwetl::{CommentOutcome, CommentStore, FileCommentStore, MemoryCommentStore, MemorySummaryStore, Source};
use serde_json::json;

/// Store that refuses one text.
struct PickyStore {
    inner: MemoryCommentStore,
    refuse: &'static str,
}

impl CommentStore for PickyStore {
    fn insert(&self, text: &str) -> Result<CommentOutcome> {
        if text == self.refuse {
            bail!("insert rejected");
        }
        self.inner.insert(text)
    }

    fn texts(&self) -> Result<Vec<String>> {
        self.inner.texts()
    }
}

#[test]
fn comments_are_inserted_once_across_posts_and_files() {
    let c = Corpus::new();
    let d = date("2024-02-01T08:00:00Z");
    c.write_plain(
        Source::Reddit,
        "a.jsonl",
        &[
            reddit_with_comments("p1", d.clone(), &["first!", "source?"]),
            reddit_with_comments("p2", json!(null), &["source?", "  "]),
        ],
    );
    c.write_zst(Source::Reddit, "b.jsonl.zst", &[reddit_with_comments("p3", d.clone(), &["first!", "thanks"])]);

    let store = MemoryCommentStore::new();
    let report = c.etl().run_comments(&store).unwrap();
    assert_eq!(report.scan.files, 2);
    assert_eq!(report.scan.documents, 3);
    assert_eq!(report.comments, 5);
    assert_eq!((report.inserted, report.duplicates), (3, 2));
    assert!(report.is_clean());
    assert_eq!(store.texts().unwrap(), vec!["first!", "source?", "thanks"]);

    let again = c.etl().run_comments(&store).unwrap();
    assert_eq!((again.inserted, again.duplicates), (0, 5));
}

#[test]
fn comments_pass_leaves_the_summary_alone() {
    let c = Corpus::new();
    let d = date("2024-02-01T08:00:00Z");
    let posts: Vec<_> = (0..3).map(|i| reddit_with_comments(&format!("p{i}"), d.clone(), &["same"])).collect();
    c.write_plain(Source::Reddit, "a.jsonl", &posts);

    let summary = MemorySummaryStore::new();
    let comments = MemoryCommentStore::new();
    c.etl().run_comments(&comments).unwrap();
    assert!(summary.is_empty());
    assert_eq!(comments.len(), 1);

    // Keyword counting ignores the comments.
    assert!(c.etl().run(&summary).is_complete());
    assert!(summary.is_empty());
}

#[test]
fn rejected_comment_is_reported_and_others_still_inserted() {
    let c = Corpus::new();
    let d = date("2024-02-01T08:00:00Z");
    c.write_plain(Source::Reddit, "a.jsonl", &[reddit_with_comments("p1", d, &["ok", "spam", "fine"])]);

    let store = PickyStore { inner: MemoryCommentStore::new(), refuse: "spam" };
    let report = c.etl().write_retries(2).run_comments(&store).unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.duplicates, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "spam");
    assert!(report.failures[0].1.contains("insert rejected"));
    assert!(!report.is_clean());
}

#[test]
fn missing_reddit_directory_is_an_error() {
    let c = Corpus::new();
    std::fs::remove_dir(c.source_dir(Source::Reddit)).unwrap();
    let err = c.etl().run_comments(&MemoryCommentStore::new()).unwrap_err();
    assert!(format!("{err:#}").contains("reddit"));
}

#[test]
fn file_comment_store_persists_between_runs() {
    let c = Corpus::new();
    let d = date("2024-02-01T08:00:00Z");
    c.write_plain(Source::Reddit, "a.jsonl", &[reddit_with_comments("p1", d, &["hello \"world\""])]);
    let path = c.root().join("out").join("reddit_comments.ndjson");

    {
        let store = FileCommentStore::open(&path).unwrap();
        assert_eq!(c.etl().run_comments(&store).unwrap().inserted, 1);
    }
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"comment\":\"hello \\\"world\\\"\"}\n");

    let reopened = FileCommentStore::open(&path).unwrap();
    let report = c.etl().run_comments(&reopened).unwrap();
    assert_eq!((report.inserted, report.duplicates), (0, 1));
}
