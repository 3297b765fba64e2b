//! Per-source keyword normalizers: flatten hashtags/trends, keywords and tags
//! into `(keyword, day)` pairs on the shared lower-cased key schema.

use crate::date::Day;
use crate::records::{RedditPost, RssArticle, SourceRecord, Tweet};

/// One normalized keyword occurrence.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeywordDay {
    pub keyword: String,
    pub day: Day,
}

impl KeywordDay {
    fn new(keyword: &str, day: Day) -> Self {
        Self { keyword: keyword.to_lowercase(), day }
    }
}

/// Strip leading `#` characters from a trend name.
#[inline]
pub fn strip_trend_hash(trend: &str) -> &str {
    trend.trim_start_matches('#')
}

/// Trend (without `#`) followed by every hashtag, all lower-cased.
/// Duplicates are kept; distinct-document counting happens in the aggregator.
pub fn normalize_tweet(t: &Tweet) -> Vec<KeywordDay> {
    let Some(day) = t.day() else { return Vec::new() };
    let mut out = Vec::with_capacity(t.hashtags.len() + 1);
    if let Some(trend) = t.trend.as_deref() {
        out.push(KeywordDay::new(strip_trend_hash(trend), day));
    }
    for h in &t.hashtags {
        out.push(KeywordDay::new(h, day));
    }
    out
}

/// Keywords verbatim (lower-cased); empty strings are dropped.
pub fn normalize_reddit(p: &RedditPost) -> Vec<KeywordDay> {
    let Some(day) = p.day() else { return Vec::new() };
    p.keywords
        .iter()
        .filter(|k| !k.is_empty())
        .map(|k| KeywordDay::new(k, day))
        .collect()
}

/// Tags (lower-cased); articles without a real `published` date contribute nothing.
pub fn normalize_rss(a: &RssArticle) -> Vec<KeywordDay> {
    let Some(day) = a.day() else { return Vec::new() };
    a.tags.iter().map(|t| KeywordDay::new(t, day)).collect()
}

pub fn normalize(rec: &SourceRecord) -> Vec<KeywordDay> {
    match rec {
        SourceRecord::Twitter(t) => normalize_tweet(t),
        SourceRecord::Reddit(p) => normalize_reddit(p),
        SourceRecord::Rss(a) => normalize_rss(a),
    }
}

/// `(trend, hashtag)` co-occurrence pairs of a tweet.
///
/// The trend loses its leading `#`; a hashtag equal to the trend ignoring case
/// is the trend itself and is excluded.
pub fn trend_hashtag_pairs(t: &Tweet) -> Vec<(String, String)> {
    let Some(trend) = t.trend.as_deref() else { return Vec::new() };
    let trend = strip_trend_hash(trend);
    let trend_lower = trend.to_lowercase();
    t.hashtags
        .iter()
        .filter(|h| h.to_lowercase() != trend_lower)
        .map(|h| (trend.to_string(), h.clone()))
        .collect()
}
