mod config;
mod date;
mod paths;
mod records;
mod normalize;

mod progress;
mod concurrency;
mod util;
mod mem;
mod ndjson;

mod aggregate;
mod summary;
mod upsert;
mod pipeline;
mod comments;

mod query;
mod analysis;

pub use crate::config::{BatchOptions, Source, Thresholds};
pub use crate::date::{day_from_extended_json, iter_days, Day};
pub use crate::records::{RedditPost, RssArticle, SourceRecord, Tweet};
pub use crate::normalize::{normalize, strip_trend_hash, trend_hashtag_pairs, KeywordDay};
pub use crate::pipeline::{BatchReport, KeywordETL, ScanStats, SourceOutcome, SourceSummary};

pub use crate::aggregate::{Aggregator, CountingRule, HashtagsPerTrend, KeywordDayCounter, NormalizedDoc, Thresholded, TrendHashtagCount};

// Summary store trait and the two backends.
pub use crate::summary::{
    FileSummaryStore, KeywordDayCount, MemorySummaryStore, SummaryFilter, SummaryKey, SummaryStore, UpsertOutcome,
};
pub use crate::upsert::{write_rows, UpsertReport, WriteFailure, WritePolicy};

// Reddit comment texts.
pub use crate::comments::{CommentOutcome, CommentReport, CommentStore, FileCommentStore, MemoryCommentStore};

// Dashboard-facing reads.
pub use crate::query::{active_days, align_series, candidate_keywords, keyword_series, AlignedPoint, QueryCache, SeriesPoint};
pub use crate::analysis::{Analysis, AnalysisContext, AnalysisOutput, AnalysisRequest};

// Expose multiprogress so binaries can group the per-source bars.
pub use crate::progress::set_global_multiprogress;

// Expose memory helper for adaptive throttling from the binary.
pub use crate::mem::available_memory_fraction;

pub use crate::ndjson::{Line, NdjsonReader, NdjsonWriter};
pub use crate::paths::{discover_exports, ExportFile};
pub use crate::util::init_tracing_once;
