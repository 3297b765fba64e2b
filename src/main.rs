use anyhow::{anyhow, bail, Context, Result};
use indicatif::MultiProgress;
use kwetl::{
    align_series, candidate_keywords, keyword_series, BatchOptions, FileCommentStore, FileSummaryStore, KeywordETL,
    Source,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const SUMMARY_PATH: &str = "./data/combined_keyword_analysis.ndjson";
const COMMENTS_PATH: &str = "./data/reddit_comments.ndjson";
const USAGE: &str =
    "usage: kwetl [run | comments | candidates <twitter|reddit> <min_days> | series <keyword> <twitter|reddit>]";

fn path_from_env(var: &str, default: &str) -> PathBuf {
    std::env::var(var)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn summary_path() -> PathBuf {
    path_from_env("KWETL_SUMMARY_PATH", SUMMARY_PATH)
}

fn parse_source(raw: Option<&String>) -> Result<Source> {
    let raw = raw.ok_or_else(|| anyhow!("missing source\n{USAGE}"))?;
    raw.parse::<Source>().map_err(|e| anyhow!(e))
}

fn run_batch() -> Result<bool> {
    let opts = BatchOptions::from_env().context("read KWETL_* configuration")?;
    if opts.parallel_sources && opts.progress {
        // One bar per source at once; group them so they don't overwrite each other.
        kwetl::set_global_multiprogress(Arc::new(MultiProgress::new()));
    }
    let store = FileSummaryStore::open_with_buffers(summary_path(), opts.read_buffer_bytes, opts.write_buffer_bytes)?;
    let report = KeywordETL::with_options(opts).run(&store);

    for o in &report.outcomes {
        match &o.result {
            Ok(s) => println!(
                "{:<8} ok      docs={} kept={} inserted={} replaced={} unchanged={} write_failures={} stale={}",
                o.source,
                s.scan.documents,
                s.upsert.written() + s.upsert.failures.len() as u64,
                s.upsert.inserted,
                s.upsert.replaced,
                s.upsert.unchanged,
                s.upsert.failures.len(),
                s.stale_rows,
            ),
            Err(e) => println!("{:<8} FAILED  {e:#}", o.source),
        }
    }
    println!("Summary store {}; finished in {:.1}s", store.path().display(), report.elapsed.as_secs_f64());
    Ok(report.is_complete())
}

fn run_comments() -> Result<bool> {
    let opts = BatchOptions::from_env().context("read KWETL_* configuration")?;
    let path = path_from_env("KWETL_COMMENTS_PATH", COMMENTS_PATH);
    let store = FileCommentStore::open_with_buffers(path, opts.read_buffer_bytes, opts.write_buffer_bytes)?;
    let report = KeywordETL::with_options(opts).run_comments(&store)?;

    println!("{} entries inserted, {} duplicates were found", report.inserted, report.duplicates);
    println!("Comment store {}; finished in {:.1}s", store.path().display(), report.elapsed.as_secs_f64());
    if !report.is_clean() {
        println!("{} comments could not be written", report.failures.len());
    }
    Ok(report.is_clean())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        None | Some("run") => run_batch(),
        Some("comments") => run_comments(),
        Some("candidates") => candidates(&args[1..]).map(|_| true),
        Some("series") => series(&args[1..]).map(|_| true),
        Some(other) => Err(anyhow!("unknown command {other:?}\n{USAGE}")),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("kwetl: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn candidates(args: &[String]) -> Result<()> {
    let source = parse_source(args.first())?;
    let Some(raw) = args.get(1) else { bail!("missing min_days\n{USAGE}") };
    let min_days: usize = raw.parse().with_context(|| format!("min_days must be a non-negative integer, got {raw:?}"))?;

    let store = FileSummaryStore::open(summary_path())?;
    for kw in candidate_keywords(&store, source, min_days)? {
        println!("{kw}");
    }
    Ok(())
}

fn series(args: &[String]) -> Result<()> {
    let Some(keyword) = args.first() else { bail!("missing keyword\n{USAGE}") };
    let source = parse_source(args.get(1))?;

    let store = FileSummaryStore::open(summary_path())?;
    println!("date\t{source}\trss");
    for p in align_series(&keyword_series(&store, keyword, source)?) {
        println!("{}\t{}\t{}", p.date, p.social, p.rss);
    }
    Ok(())
}
