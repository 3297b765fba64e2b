//! Named analyses offered to the dashboard, grouped by data source.

use crate::aggregate::TrendHashtagCount;
use crate::config::Source;
use crate::pipeline::KeywordETL;
use crate::query::{self, SeriesPoint};
use crate::summary::SummaryStore;
use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Analysis {
    KeywordFrequencyTwitter,
    KeywordFrequencyReddit,
    HashtagsPerTrend,
}

impl Analysis {
    pub const ALL: [Analysis; 3] = [
        Analysis::KeywordFrequencyTwitter,
        Analysis::KeywordFrequencyReddit,
        Analysis::HashtagsPerTrend,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Analysis::KeywordFrequencyTwitter => "keyword_frequency_twitter",
            Analysis::KeywordFrequencyReddit => "keyword_frequency_reddit",
            Analysis::HashtagsPerTrend => "hashtags_per_trend",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Analysis::KeywordFrequencyTwitter => "Keyword frequency in news articles vs Twitter",
            Analysis::KeywordFrequencyReddit => "Keyword frequency in news articles vs Reddit",
            Analysis::HashtagsPerTrend => "Most used hashtags per Twitter trend",
        }
    }

    /// Data source the analysis belongs to.
    pub fn source(self) -> Source {
        match self {
            Analysis::KeywordFrequencyTwitter | Analysis::HashtagsPerTrend => Source::Twitter,
            Analysis::KeywordFrequencyReddit => Source::Reddit,
        }
    }

    pub fn for_source(source: Source) -> Vec<Analysis> {
        Self::ALL.into_iter().filter(|a| a.source() == source).collect()
    }

    pub fn run(self, ctx: &AnalysisContext<'_>, req: &AnalysisRequest) -> Result<AnalysisOutput> {
        match self {
            Analysis::KeywordFrequencyTwitter | Analysis::KeywordFrequencyReddit => {
                let source = self.source();
                match req.keyword.as_deref() {
                    Some(kw) => Ok(AnalysisOutput::Series(query::keyword_series(ctx.store, kw, source)?)),
                    None => {
                        let Some(min_days) = req.min_days else {
                            bail!("{}: min_days is required to list candidate keywords", self.key());
                        };
                        Ok(AnalysisOutput::Candidates(query::candidate_keywords(ctx.store, source, min_days)?))
                    }
                }
            }
            Analysis::HashtagsPerTrend => Ok(AnalysisOutput::Hashtags(ctx.etl.hashtags_per_trend(req.limit)?)),
        }
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Analysis {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.key() == key)
            .ok_or_else(|| format!("unknown analysis {key:?}"))
    }
}

/// What an analysis may read: the summary store and the raw exports.
pub struct AnalysisContext<'a> {
    pub store: &'a dyn SummaryStore,
    pub etl: &'a KeywordETL,
}

#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    /// Selected keyword; without one the keyword analyses list candidates.
    pub keyword: Option<String>,
    pub min_days: Option<usize>,
    /// Row cap for ranked outputs.
    pub limit: usize,
}

impl Default for AnalysisRequest {
    fn default() -> Self {
        Self { keyword: None, min_days: None, limit: 10 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalysisOutput {
    Candidates(Vec<String>),
    Series(Vec<SeriesPoint>),
    Hashtags(Vec<TrendHashtagCount>),
}
