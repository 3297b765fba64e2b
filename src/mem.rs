//! Cooperative low-memory backoff for long export scans.

use parking_lot::Mutex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use sysinfo::{System, SystemExt};

const REFRESH_EVERY: Duration = Duration::from_millis(500);
const BACKOFF: Duration = Duration::from_millis(25);

struct Watcher {
    sys: System,
    checked_at: Instant,
    available_frac: f64, // available / total, 0.0..=1.0
}

static WATCHER: OnceLock<Mutex<Watcher>> = OnceLock::new();

/// Recent estimate of available memory as a fraction of total.
/// The underlying probe runs at most every `REFRESH_EVERY`.
pub fn available_memory_fraction() -> f64 {
    let cell = WATCHER.get_or_init(|| {
        Mutex::new(Watcher {
            sys: System::new(),
            checked_at: Instant::now() - REFRESH_EVERY * 2,
            available_frac: 1.0,
        })
    });
    let mut w = cell.lock();
    if w.checked_at.elapsed() >= REFRESH_EVERY {
        w.sys.refresh_memory();
        let total = w.sys.total_memory() as f64;
        let avail = w.sys.available_memory() as f64;
        w.available_frac = if total > 0.0 { (avail / total).clamp(0.0, 1.0) } else { 1.0 };
        w.checked_at = Instant::now();
    }
    w.available_frac
}

/// Sleep briefly when available memory is under `threshold`. `0.0` disables the check.
pub fn maybe_throttle_low_memory(threshold: f64) {
    if threshold > 0.0 && available_memory_fraction() < threshold {
        std::thread::sleep(BACKOFF);
    }
}
