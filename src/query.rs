//! Cross-source query layer over the summary store (read-only).
//!
//! Both query shapes compare one social source against RSS:
//!  - `candidate_keywords`: keywords seen in both on the same day, on enough distinct days.
//!  - `keyword_series`: the per-day counts of one keyword in both.
//!
//! An empty result is a valid answer and is returned as `Ok(vec![])`.

use crate::config::Source;
use crate::date::{iter_days, Day};
use crate::summary::{SummaryFilter, SummaryStore};
use ahash::AHashMap;
use anyhow::{bail, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One point of a comparison series.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SeriesPoint {
    pub date: Day,
    pub source: Source,
    pub count: u64,
}

fn ensure_comparable(source: Source) -> Result<()> {
    if source == Source::Rss {
        bail!("cross-source queries compare twitter or reddit against rss; got {source}");
    }
    Ok(())
}

/// Keywords present in both `source` and RSS on the same day for at least `min_days` distinct days.
/// Sorted ascending.
pub fn candidate_keywords<S>(store: &S, source: Source, min_days: usize) -> Result<Vec<String>>
where
    S: SummaryStore + ?Sized,
{
    ensure_comparable(source)?;
    let rows = store.scan(&SummaryFilter::all().sources([source, Source::Rss]))?;

    // (keyword, day) -> distinct sources seen
    let mut per_day: BTreeMap<(&str, Day), BTreeSet<Source>> = BTreeMap::new();
    for r in &rows {
        per_day.entry((r.keyword.as_str(), r.date)).or_default().insert(r.source);
    }

    let mut days_per_keyword: BTreeMap<&str, usize> = BTreeMap::new();
    for ((kw, _), sources) in &per_day {
        if sources.len() == 2 {
            *days_per_keyword.entry(*kw).or_insert(0) += 1;
        }
    }

    Ok(days_per_keyword
        .into_iter()
        .filter(|(_, n)| *n >= min_days)
        .map(|(kw, _)| kw.to_string())
        .collect())
}

/// All rows of `keyword` (exact match on the stored lower-cased value) for `source` and RSS,
/// ordered by date then source.
pub fn keyword_series<S>(store: &S, keyword: &str, source: Source) -> Result<Vec<SeriesPoint>>
where
    S: SummaryStore + ?Sized,
{
    ensure_comparable(source)?;
    let rows = store.scan(&SummaryFilter::all().keyword(keyword).sources([source, Source::Rss]))?;
    let mut points: Vec<SeriesPoint> = rows
        .into_iter()
        .map(|r| SeriesPoint { date: r.date, source: r.source, count: r.count })
        .collect();
    points.sort();
    Ok(points)
}

/// One day of a two-line comparison chart; days without a row count zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AlignedPoint {
    pub date: Day,
    pub social: u64,
    pub rss: u64,
}

/// Lay a series out on every day between its first and last point.
pub fn align_series(points: &[SeriesPoint]) -> Vec<AlignedPoint> {
    let (Some(first), Some(last)) = (points.iter().map(|p| p.date).min(), points.iter().map(|p| p.date).max()) else {
        return Vec::new();
    };
    let mut by_day: BTreeMap<Day, AlignedPoint> = iter_days(first, last)
        .map(|date| (date, AlignedPoint { date, social: 0, rss: 0 }))
        .collect();
    for p in points {
        if let Some(slot) = by_day.get_mut(&p.date) {
            match p.source {
                Source::Rss => slot.rss += p.count,
                _ => slot.social += p.count,
            }
        }
    }
    by_day.into_values().collect()
}

/// Distinct days that have at least one summary row for `source`, ascending.
pub fn active_days<S>(store: &S, source: Source) -> Result<Vec<Day>>
where
    S: SummaryStore + ?Sized,
{
    let rows = store.scan(&SummaryFilter::all().sources([source]))?;
    let days: BTreeSet<Day> = rows.into_iter().map(|r| r.date).collect();
    Ok(days.into_iter().collect())
}

struct Entry<T> {
    at: Instant,
    value: T,
}

impl<T: Clone> Entry<T> {
    fn fresh(&self, ttl: Duration) -> Option<T> {
        (self.at.elapsed() < ttl).then(|| self.value.clone())
    }
}

#[derive(Default)]
struct CacheState {
    candidates: AHashMap<(Source, usize), Entry<Vec<String>>>,
    days: AHashMap<Source, Entry<Vec<Day>>>,
}

/// Time-boxed cache in front of the list-style queries.
///
/// Owned by whoever serves the dashboard and passed to callers explicitly.
/// Entries expire after `ttl`; `invalidate` drops everything (call it after a batch run).
/// Series lookups are not cached.
pub struct QueryCache {
    store: Arc<dyn SummaryStore>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl QueryCache {
    pub fn new(store: Arc<dyn SummaryStore>, ttl: Duration) -> Self {
        Self { store, ttl, state: Mutex::new(CacheState::default()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn invalidate(&self) {
        *self.state.lock() = CacheState::default();
        tracing::debug!("Query cache invalidated");
    }

    pub fn candidate_keywords(&self, source: Source, min_days: usize) -> Result<Vec<String>> {
        if let Some(v) = self.state.lock().candidates.get(&(source, min_days)).and_then(|e| e.fresh(self.ttl)) {
            return Ok(v);
        }
        // Query outside the lock; a concurrent refresh at worst computes the same value twice.
        let value = candidate_keywords(self.store.as_ref(), source, min_days)?;
        self.state
            .lock()
            .candidates
            .insert((source, min_days), Entry { at: Instant::now(), value: value.clone() });
        Ok(value)
    }

    pub fn active_days(&self, source: Source) -> Result<Vec<Day>> {
        if let Some(v) = self.state.lock().days.get(&source).and_then(|e| e.fresh(self.ttl)) {
            return Ok(v);
        }
        let value = active_days(self.store.as_ref(), source)?;
        self.state.lock().days.insert(source, Entry { at: Instant::now(), value: value.clone() });
        Ok(value)
    }

    /// Most recent active day of `source`, the natural default selection.
    pub fn latest_day(&self, source: Source) -> Result<Option<Day>> {
        Ok(self.active_days(source)?.last().copied())
    }

    pub fn keyword_series(&self, keyword: &str, source: Source) -> Result<Vec<SeriesPoint>> {
        keyword_series(self.store.as_ref(), keyword, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{KeywordDayCount, MemorySummaryStore};

    fn put(store: &MemorySummaryStore, kw: &str, day: u8, source: Source, count: u64) {
        store
            .upsert(&KeywordDayCount { keyword: kw.into(), date: Day::new(2024, 1, day), source, count })
            .unwrap();
    }

    fn openai_store() -> MemorySummaryStore {
        let store = MemorySummaryStore::new();
        for d in 1..=5 {
            put(&store, "openai", d, Source::Twitter, 20);
        }
        for d in 1..=3 {
            put(&store, "openai", d, Source::Rss, 4);
        }
        store
    }

    #[test]
    fn candidates_respect_min_days() {
        let store = openai_store();
        assert_eq!(candidate_keywords(&store, Source::Twitter, 3).unwrap(), vec!["openai"]);
        assert!(candidate_keywords(&store, Source::Twitter, 4).unwrap().is_empty());
        // reddit never mentions it, so rss alone is not enough
        assert!(candidate_keywords(&store, Source::Reddit, 1).unwrap().is_empty());
    }

    #[test]
    fn rss_is_not_a_comparison_source() {
        let store = openai_store();
        assert!(candidate_keywords(&store, Source::Rss, 1).is_err());
        assert!(keyword_series(&store, "openai", Source::Rss).is_err());
    }

    #[test]
    fn series_is_ordered_and_case_sensitive() {
        let store = openai_store();
        put(&store, "openai", 2, Source::Reddit, 7);
        let s = keyword_series(&store, "openai", Source::Twitter).unwrap();
        assert_eq!(s.len(), 8);
        assert_eq!(s[0], SeriesPoint { date: Day::new(2024, 1, 1), source: Source::Twitter, count: 20 });
        assert_eq!(s[1], SeriesPoint { date: Day::new(2024, 1, 1), source: Source::Rss, count: 4 });
        assert!(keyword_series(&store, "OpenAI", Source::Twitter).unwrap().is_empty());
    }

    #[test]
    fn aligned_series_fills_gaps() {
        let store = MemorySummaryStore::new();
        put(&store, "gpu", 1, Source::Reddit, 4);
        put(&store, "gpu", 3, Source::Rss, 6);
        let aligned = align_series(&keyword_series(&store, "gpu", Source::Reddit).unwrap());
        assert_eq!(
            aligned,
            vec![
                AlignedPoint { date: Day::new(2024, 1, 1), social: 4, rss: 0 },
                AlignedPoint { date: Day::new(2024, 1, 2), social: 0, rss: 0 },
                AlignedPoint { date: Day::new(2024, 1, 3), social: 0, rss: 6 },
            ]
        );
        assert!(align_series(&[]).is_empty());
    }

    #[test]
    fn cache_serves_until_invalidated() {
        let store = Arc::new(openai_store());
        let cache = QueryCache::new(store.clone(), Duration::from_secs(3600));
        assert_eq!(cache.candidate_keywords(Source::Twitter, 3).unwrap(), vec!["openai"]);
        assert_eq!(cache.latest_day(Source::Rss).unwrap(), Some(Day::new(2024, 1, 3)));

        for d in 1..=3 {
            put(&store, "gpu", d, Source::Twitter, 11);
            put(&store, "gpu", d, Source::Rss, 3);
        }
        put(&store, "openai", 9, Source::Rss, 3);
        assert_eq!(cache.candidate_keywords(Source::Twitter, 3).unwrap(), vec!["openai"]);
        assert_eq!(cache.latest_day(Source::Rss).unwrap(), Some(Day::new(2024, 1, 3)));

        cache.invalidate();
        assert_eq!(cache.candidate_keywords(Source::Twitter, 3).unwrap(), vec!["gpu", "openai"]);
        assert_eq!(cache.latest_day(Source::Rss).unwrap(), Some(Day::new(2024, 1, 9)));
    }

    #[test]
    fn zero_ttl_always_refreshes() {
        let store = Arc::new(MemorySummaryStore::new());
        let cache = QueryCache::new(store.clone(), Duration::ZERO);
        assert!(cache.active_days(Source::Reddit).unwrap().is_empty());
        put(&store, "policy", 5, Source::Reddit, 3);
        assert_eq!(cache.active_days(Source::Reddit).unwrap(), vec![Day::new(2024, 1, 5)]);
    }
}
