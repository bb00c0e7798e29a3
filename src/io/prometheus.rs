//! Prometheus text exposition of service metrics and exploration gauges

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::query::ExplorationStats;
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge)
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {count}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, stats: &ExplorationStats) -> String {
    let summary = metrics.peek();
    let mut output = String::with_capacity(4096);

    write_report_metrics(&mut output, &summary);
    write_scoring_metrics(&mut output, &summary);
    write_exploration_gauges(&mut output, stats);

    output
}

fn write_report_metrics(output: &mut String, summary: &MetricsSummary) {
    let counters = [
        ("wavemap_reports_total", "Uplinks decoded into location reports", summary.reports_received),
        ("wavemap_reports_dropped_total", "Reports dropped because the ingest queue was full", summary.reports_dropped),
        ("wavemap_reports_malformed_total", "Uplinks that could not be decoded", summary.reports_malformed),
        ("wavemap_reports_no_fix_total", "Reports without a GPS fix", summary.no_fix_total),
        ("wavemap_reports_invalid_coordinate_total", "Reports with an out-of-range coordinate", summary.invalid_coordinate_total),
    ];
    for (name, help, val) in counters {
        write_metric(output, name, help, MetricType::Counter, val);
    }
}

fn write_scoring_metrics(output: &mut String, summary: &MetricsSummary) {
    let counters = [
        ("wavemap_discoveries_total", "Cells discovered", summary.discoveries_total),
        ("wavemap_revisits_total", "Reports on already visited cells", summary.revisits_total),
        ("wavemap_claims_lost_total", "Cell claims lost to a concurrent discovery", summary.claims_lost_total),
        ("wavemap_store_errors_total", "Store operations that failed", summary.store_errors_total),
    ];
    for (name, help, val) in counters {
        write_metric(output, name, help, MetricType::Counter, val);
    }

    write_histogram(
        output,
        "wavemap_scoring_latency_us",
        "Report scoring latency in microseconds",
        &summary.lat_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.avg_latency_us,
    );
}

fn write_exploration_gauges(output: &mut String, stats: &ExplorationStats) {
    write_metric(
        output,
        "wavemap_visited_cells",
        "Number of visited cells",
        MetricType::Gauge,
        stats.visited_cells as u64,
    );
    write_metric(
        output,
        "wavemap_trackers",
        "Number of known trackers",
        MetricType::Gauge,
        stats.trackers as u64,
    );
    write_metric(
        output,
        "wavemap_total_score",
        "Sum of all cell scores",
        MetricType::Gauge,
        stats.total_score,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_report_received();
        metrics.record_discovery();
        metrics.record_scoring_latency(150);
        metrics.record_scoring_latency(250);

        let stats = ExplorationStats { visited_cells: 4, trackers: 2, total_score: 9 };
        let output = format_prometheus_metrics(&metrics, &stats);

        assert!(output.contains("wavemap_reports_total 1"));
        assert!(output.contains("wavemap_discoveries_total 1"));
        assert!(output.contains("# TYPE wavemap_scoring_latency_us histogram"));
        assert!(output.contains("wavemap_scoring_latency_us_bucket{le=\"+Inf\"} 2"));
        assert!(output.contains("wavemap_visited_cells 4"));
        assert!(output.contains("wavemap_trackers 2"));
        assert!(output.contains("wavemap_total_score 9"));
    }
}
