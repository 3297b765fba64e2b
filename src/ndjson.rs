use crate::util::{create_with_backoff, open_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use zstd::stream::read::Decoder;

/// True for `*.zst` exports.
pub fn is_zstd(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("zst")).unwrap_or(false)
}

/// Buffered NDJSON reader over plain or zstd-compressed files.
/// Compression is chosen from the `.zst` extension.
pub struct NdjsonReader {
    rdr: Box<dyn BufRead + Send>,
    bytes: Vec<u8>,
}

/// One step of `NdjsonReader::next_line`.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    Eof,
    /// A line was read into the buffer; carries the raw byte length.
    Text(usize),
    /// The line was consumed but is not UTF-8; the buffer is left empty.
    InvalidUtf8(usize),
}

impl NdjsonReader {
    pub fn open(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = open_with_backoff(path, 16, 50)?;
        let cap = buf_bytes.max(8 * 1024);
        let rdr: Box<dyn BufRead + Send> = if is_zstd(path) {
            let mut decoder = Decoder::new(f)?;
            // Large exports may be written with long-distance matching.
            decoder.window_log_max(31)?;
            Box::new(BufReader::with_capacity(cap, decoder))
        } else {
            Box::new(BufReader::with_capacity(cap, f))
        };
        Ok(Self { rdr, bytes: Vec::with_capacity(16 * 1024) })
    }

    /// Read the next line into `buf`, stripping trailing `\r?\n`.
    ///
    /// Errors come only from the underlying stream (I/O or zstd decode).
    /// A line with invalid UTF-8 is consumed and reported as `Line::InvalidUtf8`.
    pub fn next_line(&mut self, buf: &mut String) -> io::Result<Line> {
        buf.clear();
        self.bytes.clear();
        let n = self.rdr.read_until(b'\n', &mut self.bytes)?;
        if n == 0 { return Ok(Line::Eof); }
        if self.bytes.ends_with(b"\n") {
            self.bytes.pop();
            if self.bytes.ends_with(b"\r") { self.bytes.pop(); }
        }
        match std::str::from_utf8(&self.bytes) {
            Ok(text) => {
                buf.push_str(text);
                Ok(Line::Text(n))
            }
            Err(_) => Ok(Line::InvalidUtf8(n)),
        }
    }

    /// Like `next_line`, with invalid UTF-8 as an `InvalidData` error. Returns 0 on EOF.
    pub fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        match self.next_line(buf)? {
            Line::Eof => Ok(0),
            Line::Text(n) => Ok(n),
            Line::InvalidUtf8(_) => Err(io::Error::new(io::ErrorKind::InvalidData, "line is not valid UTF-8")),
        }
    }
}

/// Buffered NDJSON writer; `write_line` appends the `\n` terminator.
pub struct NdjsonWriter {
    path: PathBuf,
    w: Option<BufWriter<File>>,
}

impl NdjsonWriter {
    pub fn create(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = create_with_backoff(path, 16, 50)?;
        Ok(Self { path: path.to_path_buf(), w: Some(BufWriter::with_capacity(buf_bytes.max(8 * 1024), f)) })
    }

    #[inline]
    pub fn write_line(&mut self, s: &str) -> io::Result<()> {
        if let Some(w) = &mut self.w {
            w.write_all(s.as_bytes())?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flush and atomically promote the temp file to `final_path`.
    pub fn finish_atomic(mut self, final_path: &Path) -> Result<()> {
        if let Some(mut w) = self.w.take() {
            w.flush().with_context(|| format!("flush {}", self.path.display()))?;
            w.get_ref().sync_all().with_context(|| format!("sync {}", self.path.display()))?;
        }
        replace_file_atomic_backoff(&self.path, final_path)
    }
}
