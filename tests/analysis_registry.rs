#[path = "common/mod.rs"]
mod common;

use common::*;
use kwetl::{Analysis, AnalysisContext, AnalysisOutput, AnalysisRequest, MemorySummaryStore, Source, TrendHashtagCount};

fn hashtag(trend: &str, hashtag: &str, count: u64) -> TrendHashtagCount {
    TrendHashtagCount { trend: trend.into(), hashtag: hashtag.into(), count }
}

/// Pairs keep the exported spelling; only the self-match test ignores case.
#[test]
fn hashtags_per_trend_excludes_the_trend_itself() {
    let c = Corpus::new();
    let d = date("2024-11-05T15:00:00Z");
    c.write_plain(
        Source::Twitter,
        "a.jsonl",
        &[
            tweet("1", d.clone(), "#Election", &["election", "Vote"]),
            tweet("2", d.clone(), "#Election", &["ELECTION", "vote", "Polls"]),
            tweet("3", d.clone(), "Election", &["Vote"]),
        ],
    );
    c.write_zst(Source::Twitter, "b.jsonl.zst", &[tweet("4", d.clone(), "#Climate", &["climate", "COP29"])]);

    let etl = c.etl();
    let top = etl.hashtags_per_trend(10).unwrap();
    assert_eq!(
        top,
        vec![
            hashtag("Election", "Vote", 2),
            hashtag("Climate", "COP29", 1),
            hashtag("Election", "Polls", 1),
            hashtag("Election", "vote", 1),
        ]
    );
    assert_eq!(etl.hashtags_per_trend(1).unwrap(), vec![hashtag("Election", "Vote", 2)]);
}

#[test]
fn registry_runs_each_analysis() {
    let c = Corpus::new();
    let d = date("2024-11-05T15:00:00Z");
    c.write_plain(Source::Twitter, "a.jsonl", &[tweet("1", d.clone(), "#AI", &["GPU"])]);
    let mut articles = Vec::new();
    for i in 0..3 {
        articles.push(rss(&format!("a{i}"), d.clone(), &["GPU"]));
    }
    c.write_plain(Source::Rss, "feed.jsonl", &articles);

    let store = MemorySummaryStore::new();
    let etl = c.etl().thresholds(kwetl::Thresholds { twitter: 1, reddit: 3, rss: 3 });
    assert!(etl.run(&store).is_complete());
    let ctx = AnalysisContext { store: &store, etl: &etl };

    let candidates = Analysis::KeywordFrequencyTwitter
        .run(&ctx, &AnalysisRequest { min_days: Some(1), ..Default::default() })
        .unwrap();
    assert_eq!(candidates, AnalysisOutput::Candidates(vec!["gpu".into()]));

    let by_key: Analysis = "hashtags_per_trend".parse().unwrap();
    match by_key.run(&ctx, &AnalysisRequest::default()).unwrap() {
        AnalysisOutput::Hashtags(rows) => assert_eq!(rows, vec![hashtag("AI", "GPU", 1)]),
        other => panic!("unexpected output {other:?}"),
    }
}
