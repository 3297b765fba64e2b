use crate::config::Source;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// One export file of a source collection.
#[derive(Clone, Debug)]
pub struct ExportFile {
    pub source: Source,
    pub path: PathBuf,
}

impl ExportFile {
    /// `file.jsonl:<line>` identity for documents that carry no `_id`.
    pub fn line_id(&self, line_no: usize) -> String {
        let name = self.path.file_name().map(|s| s.to_string_lossy()).unwrap_or_default();
        format!("{name}:{line_no}")
    }
}

fn export_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[^.].*\.(jsonl|ndjson|json)(\.zst)?$").expect("static regex"))
}

/// Export files of `source` found directly inside `dir`, sorted by file name.
///
/// A missing or unreadable directory is an error: the source is unreachable,
/// which is different from a reachable source with no documents.
pub fn discover_exports(source: Source, dir: &Path) -> Result<Vec<ExportFile>> {
    if !dir.is_dir() {
        bail!("{source} export directory {} does not exist", dir.display());
    }
    let re = export_name_re();
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let ent = entry.with_context(|| format!("list {}", dir.display()))?;
        if !ent.file_type().is_file() { continue; }
        if let Some(name) = ent.file_name().to_str() {
            if re.is_match(name) {
                files.push(ExportFile { source, path: ent.path().to_path_buf() });
            }
        }
    }
    Ok(files)
}

pub fn total_size(files: &[ExportFile]) -> u64 {
    files
        .iter()
        .map(|f| std::fs::metadata(&f.path).map(|m| m.len()).unwrap_or(0))
        .sum()
}
