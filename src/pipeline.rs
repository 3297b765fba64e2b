use crate::comments::{CommentReport, CommentStore};
use crate::aggregate::{Aggregator, HashtagsPerTrend, KeywordDayCounter, NormalizedDoc, TrendHashtagCount};
use crate::config::{BatchOptions, Source, Thresholds};
use crate::concurrency::map_files_limited;
use crate::mem::maybe_throttle_low_memory;
use crate::ndjson::{is_zstd, Line, NdjsonReader};
use crate::normalize::normalize;
use crate::paths::{discover_exports, total_size, ExportFile};
use crate::progress::make_bytes_progress;
use crate::query::QueryCache;
use crate::records::SourceRecord;
use crate::summary::{SummaryFilter, SummaryKey, SummaryStore};
use crate::upsert::{write_rows, UpsertReport, WritePolicy};
use crate::util::init_tracing_once;
use anyhow::{Context, Error, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

/// Batch job that materializes `(keyword, date, source)` counts from the three exports.
#[derive(Clone, Default)]
pub struct KeywordETL {
    pub(crate) opts: BatchOptions,
}

/// Per-file scan counters; merged across files of one source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: u64,
    pub documents: u64,
    /// Lines that were not valid JSON documents of the source's shape.
    pub malformed: u64,
    /// `.zst` files abandoned after a decode error.
    pub corrupt_files: u64,
}

impl ScanStats {
    pub(crate) fn merge(&mut self, o: ScanStats) {
        self.files += o.files;
        self.documents += o.documents;
        self.malformed += o.malformed;
        self.corrupt_files += o.corrupt_files;
    }
}

/// Result of one source pass.
#[derive(Clone, Debug)]
pub struct SourceSummary {
    pub source: Source,
    pub scan: ScanStats,
    /// Documents with a missing or non-date timestamp.
    pub undated: u64,
    pub pairs: u64,
    pub groups: usize,
    pub below_threshold: usize,
    pub upsert: UpsertReport,
    /// Rows of this source still in the store that this run did not produce. Never pruned.
    pub stale_rows: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct SourceOutcome {
    pub source: Source,
    pub result: Result<SourceSummary>,
}

/// Outcome of a full batch: one entry per source, failures isolated.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<SourceOutcome>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> Vec<Source> {
        self.outcomes.iter().filter(|o| o.result.is_ok()).map(|o| o.source).collect()
    }

    pub fn failed(&self) -> Vec<(Source, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.source, e)))
            .collect()
    }

    pub fn summary(&self, source: Source) -> Option<&SourceSummary> {
        self.outcomes.iter().find(|o| o.source == source).and_then(|o| o.result.as_ref().ok())
    }

    pub fn write_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.upsert.failures.len())
            .sum()
    }

    /// Every source ran and every row was written.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.as_ref().is_ok_and(|s| s.upsert.is_clean()))
    }
}

impl KeywordETL {
    pub fn new() -> Self {
        Self { opts: BatchOptions::default() }
    }

    pub fn with_options(opts: BatchOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_data_dir(dir); self }
    pub fn source_dir(mut self, source: Source, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_source_dir(source, dir); self }
    pub fn thresholds(mut self, t: Thresholds) -> Self { self.opts = self.opts.with_thresholds(t); self }
    pub fn file_concurrency(mut self, n: usize) -> Self { self.opts = self.opts.with_file_concurrency(n); self }
    pub fn parallel_sources(mut self, yes: bool) -> Self { self.opts = self.opts.with_parallel_sources(yes); self }
    pub fn parallelism(mut self, threads: usize) -> Self { self.opts = self.opts.with_parallelism(threads); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }
    pub fn write_retries(mut self, n: usize) -> Self { self.opts = self.opts.with_write_retries(n); self }
    pub fn retry_delay_ms(mut self, ms: u64) -> Self { self.opts = self.opts.with_retry_delay_ms(ms); self }
    pub fn low_memory_fraction(mut self, frac: f64) -> Self { self.opts = self.opts.with_low_memory_fraction(frac); self }

    fn init_runtime(&self) {
        init_tracing_once();
        if let Some(n) = self.opts.parallelism {
            if n > 0 { rayon::ThreadPoolBuilder::new().num_threads(n).build_global().ok(); }
        }
    }

    fn write_policy(&self) -> WritePolicy {
        WritePolicy { retries: self.opts.write_retries, delay_ms: self.opts.retry_delay_ms, progress: self.opts.progress }
    }

    /// Run all three sources. A failing source does not stop the others.
    pub fn run<S>(&self, store: &S) -> BatchReport
    where
        S: SummaryStore + ?Sized,
    {
        self.init_runtime();
        let started = Instant::now();
        let run_one = |source: Source| {
            let result = self.run_source(source, store);
            if let Err(e) = &result {
                tracing::error!(%source, error=%format!("{e:#}"), "Source pass failed; re-trigger this source");
            }
            SourceOutcome { source, result }
        };

        let outcomes: Vec<SourceOutcome> = if self.opts.parallel_sources {
            Source::ALL.as_slice().par_iter().map(|s| run_one(*s)).collect()
        } else {
            Source::ALL.iter().map(|s| run_one(*s)).collect()
        };

        let report = BatchReport { outcomes, elapsed: started.elapsed() };
        tracing::info!(
            succeeded=?report.succeeded(),
            failed=report.failed().len(),
            write_failures=report.write_failures(),
            elapsed_ms=report.elapsed.as_millis() as u64,
            "Batch finished"
        );
        report
    }

    /// Run the batch, then drop everything `cache` memoized from the previous state.
    pub fn run_and_invalidate<S>(&self, store: &S, cache: &QueryCache) -> BatchReport
    where
        S: SummaryStore + ?Sized,
    {
        let report = self.run(store);
        cache.invalidate();
        report
    }

    /// Scan one source's exports, threshold the counts and merge them into `store`.
    pub fn run_source<S>(&self, source: Source, store: &S) -> Result<SourceSummary>
    where
        S: SummaryStore + ?Sized,
    {
        init_tracing_once();
        let started = Instant::now();
        tracing::info!(%source, "Start upserting from source");

        let dir = self.opts.source_dir(source);
        let files = discover_exports(source, dir)?;
        if files.is_empty() {
            tracing::warn!(%source, dir=%dir.display(), "No export files found; nothing to aggregate");
        } else {
            tracing::info!(%source, "Planned {} export files for processing.", files.len());
        }

        let pb = self.opts.progress.then(|| make_bytes_progress(total_size(&files), &format!("Scan {source}")));

        let parts = map_files_limited(&files, self.opts.file_concurrency, |file| {
            let mut counter = KeywordDayCounter::for_source(source);
            let mut undated = 0u64;
            let mut pairs = 0u64;
            let stats = scan_export(file, &self.opts, pb.as_ref(), |rec, line_no| {
                if rec.day().is_none() {
                    undated += 1;
                    return;
                }
                let kws = normalize(&rec);
                pairs += kws.len() as u64;
                let id = rec.doc_id(|| file.line_id(line_no));
                counter.ingest(&NormalizedDoc { id, pairs: kws });
            })?;
            Ok((counter, stats, undated, pairs))
        })?;

        if let Some(pb) = pb { pb.finish_with_message(format!("Scan {source} done")); }

        let mut counter = KeywordDayCounter::for_source(source);
        let mut scan = ScanStats::default();
        let (mut undated, mut pairs) = (0u64, 0u64);
        for (part, stats, u, p) in parts {
            counter.merge(part);
            scan.merge(stats);
            undated += u;
            pairs += p;
        }

        let threshold = self.opts.thresholds.for_source(source);
        let out = counter.finish(threshold);
        tracing::info!(%source, groups=out.groups, kept=out.rows.len(), below_threshold=out.dropped, threshold, "Aggregated keyword/day groups");

        let upsert = write_rows(store, &out.rows, self.write_policy());
        store.flush().with_context(|| format!("flush summary store after {source} pass"))?;

        let produced: BTreeSet<SummaryKey> = out.rows.iter().map(|r| r.key()).collect();
        let stale_rows = store
            .scan(&SummaryFilter::all().sources([source]))
            .with_context(|| format!("read back {source} rows"))?
            .iter()
            .filter(|r| !produced.contains(&r.key()))
            .count();

        let summary = SourceSummary {
            source,
            scan,
            undated,
            pairs,
            groups: out.groups,
            below_threshold: out.dropped,
            upsert,
            stale_rows,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            %source,
            documents=summary.scan.documents,
            undated=summary.undated,
            malformed=summary.scan.malformed,
            inserted=summary.upsert.inserted,
            replaced=summary.upsert.replaced,
            unchanged=summary.upsert.unchanged,
            failed=summary.upsert.failures.len(),
            stale_rows,
            "Upserting from source finished"
        );
        Ok(summary)
    }

    /// Store every comment text embedded in the Reddit exports once.
    ///
    /// Texts already present count as duplicates. Posts are read whether or not they
    /// carry a usable date; blank texts are ignored.
    pub fn run_comments<S>(&self, store: &S) -> Result<CommentReport>
    where
        S: CommentStore + ?Sized,
    {
        self.init_runtime();
        let started = Instant::now();
        let source = Source::Reddit;
        tracing::info!("Start inserting Reddit comments");

        let dir = self.opts.source_dir(source);
        let files = discover_exports(source, dir)?;
        if files.is_empty() {
            tracing::warn!(dir=%dir.display(), "No Reddit export files found; no comments to insert");
        }
        let pb = self.opts.progress.then(|| make_bytes_progress(total_size(&files), "Comments"));
        let policy = self.write_policy();

        let parts = map_files_limited(&files, self.opts.file_concurrency, |file| {
            let mut part = CommentReport::default();
            let scan = scan_export(file, &self.opts, pb.as_ref(), |rec, _| {
                if let SourceRecord::Reddit(post) = rec {
                    for text in post.comment_texts.iter().filter(|t| !t.trim().is_empty()) {
                        part.insert(store, text, policy.retries, policy.delay_ms);
                    }
                }
            })?;
            part.scan = scan;
            Ok(part)
        })?;
        if let Some(pb) = pb { pb.finish_with_message("Comments done"); }

        let mut report = CommentReport::default();
        for part in parts {
            report.merge(part);
        }
        store.flush().context("flush comment store")?;
        report.elapsed = started.elapsed();

        tracing::info!(
            posts=report.scan.documents,
            comments=report.comments,
            inserted=report.inserted,
            duplicates=report.duplicates,
            failed=report.failures.len(),
            elapsed_ms=report.elapsed.as_millis() as u64,
            "Inserting Reddit comments finished"
        );
        Ok(report)
    }

    /// Most frequent hashtags accompanying each trend in the Twitter exports.
    pub fn hashtags_per_trend(&self, limit: usize) -> Result<Vec<TrendHashtagCount>> {
        init_tracing_once();
        let files = discover_exports(Source::Twitter, self.opts.source_dir(Source::Twitter))?;
        let parts = map_files_limited(&files, self.opts.file_concurrency, |file| {
            let mut agg = HashtagsPerTrend::default();
            scan_export(file, &self.opts, None, |rec, _| {
                if let SourceRecord::Twitter(t) = rec {
                    agg.ingest(&t);
                }
            })?;
            Ok(agg)
        })?;
        let mut total = HashtagsPerTrend::default();
        for p in parts {
            total.merge(p);
        }
        Ok(total.top(limit))
    }
}

#[inline]
fn warn_decode_skip(path: &Path, e: &io::Error) {
    let abs = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    tracing::warn!(
        path=%abs.display(),
        error=%e,
        "Skipping rest of zstd export after decode error; the file is likely truncated or corrupt"
    );
}

/// Stream one export file, calling `on_record(record, line_no)` for every parsed document.
///
/// Open failures propagate. Unparseable lines and lines with invalid UTF-8 are counted
/// as malformed in either format. A stream error inside a `.zst` file abandons that
/// file with a warning; a read error in a plain file propagates.
fn scan_export(
    file: &ExportFile,
    opts: &BatchOptions,
    pb: Option<&ProgressBar>,
    mut on_record: impl FnMut(SourceRecord, usize),
) -> Result<ScanStats> {
    let mut stats = ScanStats { files: 1, ..Default::default() };
    let mut rdr = NdjsonReader::open(&file.path, opts.read_buffer_bytes)
        .with_context(|| format!("open {}", file.path.display()))?;

    let mut buf = String::with_capacity(16 * 1024);
    let mut line_no = 0usize;
    loop {
        match rdr.next_line(&mut buf) {
            Ok(Line::Eof) => break,
            Ok(Line::Text(_)) => line_no += 1,
            Ok(Line::InvalidUtf8(_)) => {
                line_no += 1;
                stats.malformed += 1;
                tracing::debug!(path=%file.path.display(), line=line_no, "Skipping line with invalid UTF-8");
                continue;
            }
            Err(e) if is_zstd(&file.path) => {
                warn_decode_skip(&file.path, &e);
                stats.corrupt_files += 1;
                break;
            }
            Err(e) => return Err(e).with_context(|| format!("read {}", file.path.display())),
        }
        if buf.trim().is_empty() { continue; }

        match SourceRecord::parse(file.source, &buf) {
            Ok(rec) => {
                stats.documents += 1;
                on_record(rec, line_no);
            }
            Err(e) => {
                stats.malformed += 1;
                tracing::debug!(path=%file.path.display(), line=line_no, error=%e, "Skipping malformed document");
            }
        }
        maybe_throttle_low_memory(opts.low_memory_fraction);
    }

    if let Some(pb) = pb { pb.inc(fs::metadata(&file.path).map(|m| m.len()).unwrap_or(0)); }
    Ok(stats)
}
