//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Uplinks received from the transport (monotonic)
    reports_received: AtomicU64,
    /// Uplinks dropped because the ingest queue was full (monotonic)
    reports_dropped: AtomicU64,
    /// Uplinks that could not be decoded (monotonic)
    reports_malformed: AtomicU64,
    /// Reports without a GPS fix (monotonic)
    no_fix_total: AtomicU64,
    /// Reports with an out-of-range coordinate (monotonic)
    invalid_coordinate_total: AtomicU64,
    /// Cells discovered (monotonic)
    discoveries_total: AtomicU64,
    /// Reports landing on an already visited cell (monotonic)
    revisits_total: AtomicU64,
    /// Claims lost to a concurrent discovery (monotonic)
    claims_lost_total: AtomicU64,
    /// Store operations that failed (monotonic)
    store_errors_total: AtomicU64,
    /// Reports scored since last report (reset on report)
    scored_since_report: AtomicU64,
    /// Sum of scoring latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max scoring latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Scoring latency histogram buckets (cumulative since start)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            reports_received: AtomicU64::new(0),
            reports_dropped: AtomicU64::new(0),
            reports_malformed: AtomicU64::new(0),
            no_fix_total: AtomicU64::new(0),
            invalid_coordinate_total: AtomicU64::new(0),
            discoveries_total: AtomicU64::new(0),
            revisits_total: AtomicU64::new(0),
            claims_lost_total: AtomicU64::new(0),
            store_errors_total: AtomicU64::new(0),
            scored_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_report_received(&self) {
        self.reports_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_dropped(&self) {
        self.reports_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_malformed(&self) {
        self.reports_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_no_fix(&self) {
        self.no_fix_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalid_coordinate(&self) {
        self.invalid_coordinate_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_discovery(&self) {
        self.discoveries_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_revisit(&self) {
        self.revisits_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_claim_lost(&self) {
        self.claims_lost_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_error(&self) {
        self.store_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent scoring one report
    #[inline]
    pub fn record_scoring_latency(&self, latency_us: u64) {
        self.scored_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    /// Produce a summary. Resets the per-interval average and max.
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last);
            *last = now;
            elapsed
        };

        let scored = self.scored_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = load_buckets(&self.latency_buckets);

        let secs = elapsed.as_secs_f64();
        MetricsSummary {
            reports_received: self.reports_received.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            reports_malformed: self.reports_malformed.load(Ordering::Relaxed),
            no_fix_total: self.no_fix_total.load(Ordering::Relaxed),
            invalid_coordinate_total: self.invalid_coordinate_total.load(Ordering::Relaxed),
            discoveries_total: self.discoveries_total.load(Ordering::Relaxed),
            revisits_total: self.revisits_total.load(Ordering::Relaxed),
            claims_lost_total: self.claims_lost_total.load(Ordering::Relaxed),
            store_errors_total: self.store_errors_total.load(Ordering::Relaxed),
            reports_per_sec: if secs > 0.0 { scored as f64 / secs } else { 0.0 },
            avg_latency_us: if scored > 0 { latency_sum / scored } else { 0 },
            max_latency_us: latency_max,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
        }
    }

    /// Snapshot of the monotonic counters without resetting interval stats
    pub fn peek(&self) -> MetricsSummary {
        let lat_buckets = load_buckets(&self.latency_buckets);
        let scored = self.scored_since_report.load(Ordering::Relaxed);
        MetricsSummary {
            reports_received: self.reports_received.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            reports_malformed: self.reports_malformed.load(Ordering::Relaxed),
            no_fix_total: self.no_fix_total.load(Ordering::Relaxed),
            invalid_coordinate_total: self.invalid_coordinate_total.load(Ordering::Relaxed),
            discoveries_total: self.discoveries_total.load(Ordering::Relaxed),
            revisits_total: self.revisits_total.load(Ordering::Relaxed),
            claims_lost_total: self.claims_lost_total.load(Ordering::Relaxed),
            store_errors_total: self.store_errors_total.load(Ordering::Relaxed),
            reports_per_sec: 0.0,
            avg_latency_us: if scored > 0 {
                self.latency_sum_us.load(Ordering::Relaxed) / scored
            } else {
                0
            },
            max_latency_us: self.latency_max_us.load(Ordering::Relaxed),
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
        }
    }
}

/// Point-in-time metrics values
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub reports_received: u64,
    pub reports_dropped: u64,
    pub reports_malformed: u64,
    pub no_fix_total: u64,
    pub invalid_coordinate_total: u64,
    pub discoveries_total: u64,
    pub revisits_total: u64,
    pub claims_lost_total: u64,
    pub store_errors_total: u64,
    pub reports_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub lat_buckets: [u64; NUM_BUCKETS],
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            reports = %self.reports_received,
            dropped = %self.reports_dropped,
            malformed = %self.reports_malformed,
            no_fix = %self.no_fix_total,
            invalid = %self.invalid_coordinate_total,
            discoveries = %self.discoveries_total,
            revisits = %self.revisits_total,
            claims_lost = %self.claims_lost_total,
            store_errors = %self.store_errors_total,
            reports_per_sec = %format!("{:.2}", self.reports_per_sec),
            avg_us = %self.avg_latency_us,
            max_us = %self.max_latency_us,
            p99_us = %self.lat_p99_us,
            "metrics"
        );
    }
}
