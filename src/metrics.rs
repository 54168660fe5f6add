use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Performance metrics for monitoring
#[derive(Clone)]
pub struct Metrics {
    pub scans_uploaded: Arc<AtomicUsize>,
    pub analyses_started: Arc<AtomicUsize>,
    pub analyses_completed: Arc<AtomicUsize>,
    pub analyses_failed: Arc<AtomicUsize>,
    pub analyses_cancelled: Arc<AtomicUsize>,
    pub bytes_stored: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_uploaded: Arc::new(AtomicUsize::new(0)),
            analyses_started: Arc::new(AtomicUsize::new(0)),
            analyses_completed: Arc::new(AtomicUsize::new(0)),
            analyses_failed: Arc::new(AtomicUsize::new(0)),
            analyses_cancelled: Arc::new(AtomicUsize::new(0)),
            bytes_stored: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_scans_uploaded(&self) {
        self.scans_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_analyses_started(&self) {
        self.analyses_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_analyses_completed(&self) {
        self.analyses_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_analyses_failed(&self) {
        self.analyses_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_analyses_cancelled(&self) {
        self.analyses_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_stored(&self, bytes: u64) {
        self.bytes_stored.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans_uploaded: self.scans_uploaded.load(Ordering::Relaxed),
            analyses_started: self.analyses_started.load(Ordering::Relaxed),
            analyses_completed: self.analyses_completed.load(Ordering::Relaxed),
            analyses_failed: self.analyses_failed.load(Ordering::Relaxed),
            analyses_cancelled: self.analyses_cancelled.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub scans_uploaded: usize,
    pub analyses_started: usize,
    pub analyses_completed: usize,
    pub analyses_failed: usize,
    pub analyses_cancelled: usize,
    pub bytes_stored: u64,
    pub uptime_seconds: u64,
}
