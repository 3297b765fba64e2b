//! Keyword/day frequency aggregation and the per-source threshold filter.
//! Partial aggregators are built per export file and merged; every reduction is a
//! sum or a set union so totals do not depend on scheduling order.

use crate::config::Source;
use crate::normalize::{trend_hashtag_pairs, KeywordDay};
use crate::records::Tweet;
use crate::summary::KeywordDayCount;
use ahash::{AHashMap, AHashSet};
use serde::Serialize;

pub trait Aggregator: Send {
    type Item;
    fn ingest(&mut self, item: &Self::Item);
    fn merge(&mut self, other: Self);
}

/// How occurrences of a `(keyword, day)` group are counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountingRule {
    /// Number of distinct documents mentioning the keyword that day.
    DistinctDocuments,
    /// Every occurrence counts, duplicates inside one document included.
    Occurrences,
}

impl CountingRule {
    pub fn for_source(source: Source) -> Self {
        match source {
            Source::Twitter => CountingRule::DistinctDocuments,
            Source::Reddit | Source::Rss => CountingRule::Occurrences,
        }
    }
}

/// A document after normalization.
#[derive(Clone, Debug)]
pub struct NormalizedDoc {
    pub id: String,
    pub pairs: Vec<KeywordDay>,
}

pub struct KeywordDayCounter {
    source: Source,
    rule: CountingRule,
    occurrences: AHashMap<KeywordDay, u64>,
    documents: AHashMap<KeywordDay, AHashSet<String>>,
}

/// Output of the threshold filter for one source.
#[derive(Clone, Debug, Default)]
pub struct Thresholded {
    pub rows: Vec<KeywordDayCount>,
    pub groups: usize,
    pub dropped: usize,
}

impl KeywordDayCounter {
    pub fn for_source(source: Source) -> Self {
        Self {
            source,
            rule: CountingRule::for_source(source),
            occurrences: AHashMap::new(),
            documents: AHashMap::new(),
        }
    }

    /// Final counts per group, before thresholding.
    pub fn counts(&self) -> Vec<(KeywordDay, u64)> {
        let mut v: Vec<(KeywordDay, u64)> = match self.rule {
            CountingRule::DistinctDocuments => self
                .documents
                .iter()
                .map(|(k, ids)| (k.clone(), ids.len() as u64))
                .collect(),
            CountingRule::Occurrences => self.occurrences.iter().map(|(k, n)| (k.clone(), *n)).collect(),
        };
        v.sort();
        v
    }

    /// Keep groups with `count >= threshold`; rows come back sorted by (keyword, day).
    pub fn finish(self, threshold: u64) -> Thresholded {
        let source = self.source;
        let counts = self.counts();
        let groups = counts.len();
        let rows: Vec<KeywordDayCount> = counts
            .into_iter()
            .filter(|(_, n)| *n >= threshold.max(1))
            .map(|(k, n)| KeywordDayCount { keyword: k.keyword, date: k.day, source, count: n })
            .collect();
        let dropped = groups - rows.len();
        Thresholded { rows, groups, dropped }
    }
}

impl Aggregator for KeywordDayCounter {
    type Item = NormalizedDoc;

    fn ingest(&mut self, doc: &NormalizedDoc) {
        match self.rule {
            CountingRule::DistinctDocuments => {
                for p in &doc.pairs {
                    self.documents.entry(p.clone()).or_default().insert(doc.id.clone());
                }
            }
            CountingRule::Occurrences => {
                for p in &doc.pairs {
                    *self.occurrences.entry(p.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    fn merge(&mut self, other: Self) {
        debug_assert_eq!(self.source, other.source);
        for (k, n) in other.occurrences {
            *self.occurrences.entry(k).or_insert(0) += n;
        }
        for (k, ids) in other.documents {
            self.documents.entry(k).or_default().extend(ids);
        }
    }
}

/// How often a hashtag accompanied a trend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrendHashtagCount {
    pub trend: String,
    pub hashtag: String,
    pub count: u64,
}

/// Counts `(trend, hashtag)` pairs across tweets, excluding each trend's own hashtag.
#[derive(Default)]
pub struct HashtagsPerTrend {
    counts: AHashMap<(String, String), u64>,
}

impl HashtagsPerTrend {
    /// Most frequent pairs first; ties broken by trend then hashtag.
    pub fn top(&self, limit: usize) -> Vec<TrendHashtagCount> {
        let mut v: Vec<TrendHashtagCount> = self
            .counts
            .iter()
            .map(|((trend, hashtag), n)| TrendHashtagCount { trend: trend.clone(), hashtag: hashtag.clone(), count: *n })
            .collect();
        v.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.trend.cmp(&b.trend)).then_with(|| a.hashtag.cmp(&b.hashtag)));
        v.truncate(limit);
        v
    }
}

impl Aggregator for HashtagsPerTrend {
    type Item = Tweet;

    fn ingest(&mut self, tweet: &Tweet) {
        for pair in trend_hashtag_pairs(tweet) {
            *self.counts.entry(pair).or_insert(0) += 1;
        }
    }

    fn merge(&mut self, other: Self) {
        for (k, n) in other.counts {
            *self.counts.entry(k).or_insert(0) += n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::Day;

    fn doc(id: &str, kws: &[&str], day: Day) -> NormalizedDoc {
        NormalizedDoc {
            id: id.to_string(),
            pairs: kws.iter().map(|k| KeywordDay { keyword: k.to_string(), day }).collect(),
        }
    }

    #[test]
    fn twitter_counts_distinct_documents() {
        let d = Day::new(2024, 1, 5);
        let mut c = KeywordDayCounter::for_source(Source::Twitter);
        c.ingest(&doc("t1", &["ai", "ai", "rust"], d));
        c.ingest(&doc("t2", &["ai"], d));
        assert_eq!(c.counts(), vec![
            (KeywordDay { keyword: "ai".into(), day: d }, 2),
            (KeywordDay { keyword: "rust".into(), day: d }, 1),
        ]);
    }

    #[test]
    fn occurrences_count_duplicates_within_a_document() {
        let d = Day::new(2024, 1, 5);
        let mut c = KeywordDayCounter::for_source(Source::Reddit);
        c.ingest(&doc("p1", &["policy", "policy"], d));
        assert_eq!(c.counts()[0].1, 2);
    }

    #[test]
    fn merge_is_order_independent() {
        let d = Day::new(2024, 1, 5);
        let docs = [doc("a", &["x"], d), doc("b", &["x", "y"], d), doc("a", &["x"], d)];

        let mut left = KeywordDayCounter::for_source(Source::Twitter);
        left.ingest(&docs[0]);
        let mut right = KeywordDayCounter::for_source(Source::Twitter);
        right.ingest(&docs[1]);
        right.ingest(&docs[2]);
        left.merge(right);

        let mut single = KeywordDayCounter::for_source(Source::Twitter);
        for d in docs.iter().rev() {
            single.ingest(d);
        }
        assert_eq!(left.counts(), single.counts());
    }

    #[test]
    fn threshold_drops_small_groups() {
        let d = Day::new(2024, 1, 5);
        let mut c = KeywordDayCounter::for_source(Source::Rss);
        c.ingest(&doc("a", &["energy", "energy", "energy", "gas"], d));
        let out = c.finish(3);
        assert_eq!(out.groups, 2);
        assert_eq!(out.dropped, 1);
        assert_eq!(out.rows, vec![KeywordDayCount { keyword: "energy".into(), date: d, source: Source::Rss, count: 3 }]);
    }

    #[test]
    fn hashtags_per_trend_ranks_pairs() {
        let tweet = |trend: &str, tags: &[&str]| Tweet {
            trend: Some(trend.to_string()),
            hashtags: tags.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let mut agg = HashtagsPerTrend::default();
        agg.ingest(&tweet("#Election", &["election", "vote"]));
        agg.ingest(&tweet("#Election", &["vote", "Election2024"]));
        let top = agg.top(10);
        assert_eq!(top[0], TrendHashtagCount { trend: "Election".into(), hashtag: "vote".into(), count: 2 });
        assert_eq!(top.len(), 2);
        assert!(top.iter().all(|p| !p.hashtag.eq_ignore_ascii_case("election")));
    }
}
