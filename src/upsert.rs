//! Best-effort merge of thresholded rows into a summary store.
//!
//! Every row is written independently: a row that keeps failing after its retries is
//! recorded in the report and the remaining rows are still written.

use crate::progress::make_count_progress;
use crate::summary::{KeywordDayCount, SummaryKey, SummaryStore, UpsertOutcome};
use crate::util::backoff_sleep;

#[derive(Clone, Copy, Debug)]
pub struct WritePolicy {
    pub retries: usize,
    pub delay_ms: u64,
    pub progress: bool,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self { retries: 2, delay_ms: 50, progress: false }
    }
}

#[derive(Clone, Debug)]
pub struct WriteFailure {
    pub key: SummaryKey,
    pub error: String,
}

#[derive(Clone, Debug, Default)]
pub struct UpsertReport {
    pub inserted: u64,
    pub replaced: u64,
    pub unchanged: u64,
    pub failures: Vec<WriteFailure>,
}

impl UpsertReport {
    pub fn written(&self) -> u64 {
        self.inserted + self.replaced + self.unchanged
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn write_rows<S>(store: &S, rows: &[KeywordDayCount], policy: WritePolicy) -> UpsertReport
where
    S: SummaryStore + ?Sized,
{
    let pb = policy.progress.then(|| make_count_progress(rows.len() as u64, "Upsert"));
    let mut report = UpsertReport::default();

    for row in rows {
        let mut attempt = 0usize;
        loop {
            match store.upsert(row) {
                Ok(UpsertOutcome::Inserted) => report.inserted += 1,
                Ok(UpsertOutcome::Replaced) => report.replaced += 1,
                Ok(UpsertOutcome::Unchanged) => report.unchanged += 1,
                Err(e) if attempt < policy.retries => {
                    tracing::debug!(keyword=%row.keyword, date=%row.date, source=%row.source, attempt, error=%e, "Upsert failed; retrying");
                    backoff_sleep(attempt, policy.delay_ms);
                    attempt += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(keyword=%row.keyword, date=%row.date, source=%row.source, error=%e, "Upsert failed; row skipped");
                    report.failures.push(WriteFailure { key: row.key(), error: format!("{e:#}") });
                }
            }
            break;
        }
        if let Some(pb) = &pb { pb.inc(1); }
    }

    if let Some(pb) = pb { pb.finish_with_message("Upsert done"); }
    report
}
