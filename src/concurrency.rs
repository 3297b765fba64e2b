//! Bounded parallelism over export files with order-preserving results.

use crate::paths::ExportFile;
use anyhow::Result;
use rayon::prelude::*;

/// Map `f` over `files` with at most `limit` files in flight.
/// Results come back in input order so downstream merges are deterministic.
pub fn map_files_limited<T, F>(files: &[ExportFile], limit: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Sync + Fn(&ExportFile) -> Result<T>,
{
    if limit <= 1 {
        return files.iter().map(&f).collect();
    }
    let mut out = Vec::with_capacity(files.len());
    for chunk in files.chunks(limit) {
        let part = chunk.par_iter().map(&f).collect::<Result<Vec<_>>>()?;
        out.extend(part);
    }
    Ok(out)
}
