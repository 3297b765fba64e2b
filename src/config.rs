use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Origin dataset of a record and discriminant of every summary row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Twitter,
    Reddit,
    Rss,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Twitter, Source::Reddit, Source::Rss];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Twitter => "twitter",
            Source::Reddit => "reddit",
            Source::Rss => "rss",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "twitter" => Ok(Source::Twitter),
            "reddit" => Ok(Source::Reddit),
            "rss" => Ok(Source::Rss),
            other => Err(format!("unknown source {other:?} (expected twitter, reddit or rss)")),
        }
    }
}

/// Minimum per-day count a keyword needs before it is written to the summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    pub twitter: u64,
    pub reddit: u64,
    pub rss: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { twitter: 10, reddit: 3, rss: 3 }
    }
}

impl Thresholds {
    pub fn for_source(&self, source: Source) -> u64 {
        match source {
            Source::Twitter => self.twitter,
            Source::Reddit => self.reddit,
            Source::Rss => self.rss,
        }
    }
}

/// Batch options with defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub data_dir: PathBuf,
    pub twitter_dir: PathBuf,
    pub reddit_dir: PathBuf,
    pub rss_dir: PathBuf,
    pub thresholds: Thresholds,
    pub file_concurrency: usize,   // export files scanned in parallel per source
    pub parallel_sources: bool,    // run twitter/reddit/rss passes concurrently
    pub parallelism: Option<usize>, // Some(N) to set rayon threads, None to use default
    pub progress: bool,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,

    // upsert failure policy
    pub write_retries: usize,
    pub retry_delay_ms: u64,

    pub low_memory_fraction: f64,  // 0.0 disables throttling
}

impl Default for BatchOptions {
    fn default() -> Self {
        let base = PathBuf::from("./data");
        Self {
            twitter_dir: base.join(Source::Twitter.as_str()),
            reddit_dir: base.join(Source::Reddit.as_str()),
            rss_dir: base.join(Source::Rss.as_str()),
            data_dir: base,
            thresholds: Thresholds::default(),
            file_concurrency: 1,
            parallel_sources: false,
            parallelism: None,
            progress: true,

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,

            write_retries: 2,
            retry_delay_ms: 50,

            low_memory_fraction: 0.10,
        }
    }
}

impl BatchOptions {
    /// Options from `KWETL_*` environment variables layered over the defaults.
    pub fn from_env() -> Result<Self> {
        let mut opts = Self::default();
        if let Some(dir) = env_str("KWETL_DATA_DIR") {
            opts = opts.with_data_dir(dir);
        }
        if let Some(dir) = env_str("KWETL_TWITTER_DIR") {
            opts = opts.with_source_dir(Source::Twitter, dir);
        }
        if let Some(dir) = env_str("KWETL_REDDIT_DIR") {
            opts = opts.with_source_dir(Source::Reddit, dir);
        }
        if let Some(dir) = env_str("KWETL_RSS_DIR") {
            opts = opts.with_source_dir(Source::Rss, dir);
        }
        if let Some(v) = env_parse::<u64>("KWETL_MIN_TWITTER")? {
            opts.thresholds.twitter = v;
        }
        if let Some(v) = env_parse::<u64>("KWETL_MIN_REDDIT")? {
            opts.thresholds.reddit = v;
        }
        if let Some(v) = env_parse::<u64>("KWETL_MIN_RSS")? {
            opts.thresholds.rss = v;
        }
        if let Some(v) = env_parse::<usize>("KWETL_FILE_CONCURRENCY")? {
            opts = opts.with_file_concurrency(v);
        }
        if let Some(v) = env_parse::<bool>("KWETL_PARALLEL_SOURCES")? {
            opts = opts.with_parallel_sources(v);
        }
        if let Some(v) = env_parse::<bool>("KWETL_PROGRESS")? {
            opts = opts.with_progress(v);
        }
        if let Some(v) = env_parse::<usize>("KWETL_WRITE_RETRIES")? {
            opts = opts.with_write_retries(v);
        }
        Ok(opts)
    }

    pub fn source_dir(&self, source: Source) -> &Path {
        match source {
            Source::Twitter => &self.twitter_dir,
            Source::Reddit => &self.reddit_dir,
            Source::Rss => &self.rss_dir,
        }
    }

    /// Resets every per-source export dir to `<data_dir>/<source>`.
    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
        let base = data_dir.as_ref().to_path_buf();
        self.twitter_dir = base.join(Source::Twitter.as_str());
        self.reddit_dir = base.join(Source::Reddit.as_str());
        self.rss_dir = base.join(Source::Rss.as_str());
        self.data_dir = base;
        self
    }
    pub fn with_source_dir(mut self, source: Source, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        match source {
            Source::Twitter => self.twitter_dir = dir,
            Source::Reddit => self.reddit_dir = dir,
            Source::Rss => self.rss_dir = dir,
        }
        self
    }
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
    pub fn with_file_concurrency(mut self, n: usize) -> Self {
        self.file_concurrency = n.max(1);
        self
    }
    pub fn with_parallel_sources(mut self, yes: bool) -> Self {
        self.parallel_sources = yes;
        self
    }
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }
    pub fn with_write_retries(mut self, retries: usize) -> Self {
        self.write_retries = retries;
        self
    }
    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }
    pub fn with_low_memory_fraction(mut self, frac: f64) -> Self {
        self.low_memory_fraction = frac.clamp(0.0, 1.0);
        self
    }
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env_str(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("{name}: cannot parse {raw:?}")),
    }
}
