//! Statistics tracking for the relay.
//!
//! Counts datagrams, parse outcomes and upload outcomes, and keeps an HDR
//! histogram of upload latency.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe statistics collector.
#[derive(Debug)]
pub struct RelayStats {
    /// Datagrams received on the listener
    pub datagrams: AtomicU64,

    /// Total payload bytes received
    pub bytes_received: AtomicU64,

    /// Datagrams that produced a record
    pub qsos_parsed: AtomicU64,

    /// Datagrams the parser could not turn into a record
    pub unprocessed: AtomicU64,

    pub uploads_succeeded: AtomicU64,

    pub uploads_failed: AtomicU64,

    /// Settings could not be read
    pub processing_errors: AtomicU64,

    /// Upload round-trip time in milliseconds
    upload_latency: RwLock<Histogram<u64>>,

    /// Datagrams per software profile
    by_software: RwLock<HashMap<String, u64>>,

    start_time: Instant,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            datagrams: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            qsos_parsed: AtomicU64::new(0),
            unprocessed: AtomicU64::new(0),
            uploads_succeeded: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
            processing_errors: AtomicU64::new(0),
            // 1 ms to 10 minutes, 3 significant figures
            upload_latency: RwLock::new(
                Histogram::new_with_bounds(1, 600_000, 3)
                    .expect("Failed to create latency histogram"),
            ),
            by_software: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a received datagram attributed to `software`.
    pub fn record_datagram(&self, software: &str, bytes: usize) {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);

        if let Ok(mut map) = self.by_software.write() {
            *map.entry(software.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_parsed(&self) {
        self.qsos_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unprocessed(&self) {
        self.unprocessed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of an upload attempt that reached the uploader.
    pub fn record_upload(&self, success: bool, latency: Duration) {
        if success {
            self.uploads_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.uploads_failed.fetch_add(1, Ordering::Relaxed);
        }

        let millis = (latency.as_millis() as u64).clamp(1, 600_000);
        if let Ok(mut hist) = self.upload_latency.write() {
            let _ = hist.record(millis);
        }
    }

    /// Record an upload that was refused before reaching the uploader.
    pub fn record_upload_refused(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processing_error(&self) {
        self.processing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn summary(&self) -> StatsSummary {
        let latency_ms = self
            .upload_latency
            .read()
            .ok()
            .filter(|h| !h.is_empty())
            .map(|h| LatencyPercentiles {
                p50: h.value_at_quantile(0.50),
                p90: h.value_at_quantile(0.90),
                p99: h.value_at_quantile(0.99),
                min: h.min(),
                max: h.max(),
                mean: h.mean(),
            });

        let by_software = self
            .by_software
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();

        StatsSummary {
            elapsed_secs: self.elapsed().as_secs_f64(),
            datagrams: self.datagrams.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            qsos_parsed: self.qsos_parsed.load(Ordering::Relaxed),
            unprocessed: self.unprocessed.load(Ordering::Relaxed),
            uploads_succeeded: self.uploads_succeeded.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            processing_errors: self.processing_errors.load(Ordering::Relaxed),
            latency_ms,
            by_software,
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile values from the latency histogram.
#[derive(Debug, Clone, Serialize)]
pub struct LatencyPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Summary of collected statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub elapsed_secs: f64,
    pub datagrams: u64,
    pub bytes_received: u64,
    pub qsos_parsed: u64,
    pub unprocessed: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub processing_errors: u64,
    pub latency_ms: Option<LatencyPercentiles>,
    pub by_software: HashMap<String, u64>,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f, "                 QSO RELAY STATISTICS")?;
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f)?;
        writeln!(f, "Runtime: {:.1}s", self.elapsed_secs)?;
        writeln!(f, "Datagrams: {} ({} bytes)", self.datagrams, self.bytes_received)?;
        writeln!(f, "QSOs parsed: {}", self.qsos_parsed)?;
        writeln!(f, "Not processed: {}", self.unprocessed)?;
        writeln!(f, "Uploads succeeded: {}", self.uploads_succeeded)?;
        writeln!(f, "Uploads failed: {}", self.uploads_failed)?;
        writeln!(f, "Processing errors: {}", self.processing_errors)?;
        writeln!(f)?;

        if let Some(ref p) = self.latency_ms {
            writeln!(f, "Upload Latency (ms):")?;
            writeln!(f, "  Min: {}, Max: {}, Mean: {:.1}", p.min, p.max, p.mean)?;
            writeln!(f, "  P50: {}, P90: {}, P99: {}", p.p50, p.p90, p.p99)?;
            writeln!(f)?;
        }

        if !self.by_software.is_empty() {
            writeln!(f, "Datagrams by Software:")?;
            let mut software: Vec<_> = self.by_software.iter().collect();
            software.sort_by(|a, b| b.1.cmp(a.1));
            for (name, count) in software {
                writeln!(f, "  {}: {}", name, count)?;
            }
        }

        Ok(())
    }
}
