//! Ingestion pipeline - turns transport reports into scoring events
//!
//! The transport adapter hands reports over through a bounded channel so its
//! delivery loop never waits on scoring. Each report is scored exactly once.

use crate::domain::error::{ExplorationError, Result};
use crate::domain::types::LocationReport;
use crate::infra::metrics::Metrics;
use crate::services::scoring::{ScoreOutcome, ScoringEngine};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Create the bounded report channel between transport and pipeline
pub fn create_report_channel(
    capacity: usize,
) -> (mpsc::Sender<LocationReport>, mpsc::Receiver<LocationReport>) {
    mpsc::channel(capacity)
}

pub struct IngestionPipeline {
    engine: ScoringEngine,
    metrics: Arc<Metrics>,
    default_display_name: String,
}

impl IngestionPipeline {
    pub fn new(engine: ScoringEngine, metrics: Arc<Metrics>, default_display_name: &str) -> Self {
        Self { engine, metrics, default_display_name: default_display_name.to_string() }
    }

    /// Score one report.
    ///
    /// Reports with an out-of-range coordinate are logged and discarded
    /// (`Ok(None)`). Only store failures come back as errors.
    pub fn ingest(&self, report: &LocationReport) -> Result<Option<ScoreOutcome>> {
        let start = Instant::now();

        let display_name = report
            .display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(self.default_display_name.as_str());

        let result =
            self.engine.process(&report.dev_eui, display_name, report.fix(), report.timestamp);

        self.metrics.record_scoring_latency(start.elapsed().as_micros() as u64);

        match result {
            Ok(outcome) => {
                match outcome {
                    ScoreOutcome::Discovered { .. } => self.metrics.record_discovery(),
                    ScoreOutcome::AlreadyVisited { .. } => self.metrics.record_revisit(),
                    ScoreOutcome::ClaimLost { .. } => self.metrics.record_claim_lost(),
                    ScoreOutcome::NoFix => {
                        self.metrics.record_no_fix();
                        debug!(dev_eui = %report.dev_eui, "report_no_fix");
                    }
                }
                Ok(Some(outcome))
            }
            Err(ExplorationError::InvalidCoordinate { latitude, longitude }) => {
                self.metrics.record_invalid_coordinate();
                warn!(
                    dev_eui = %report.dev_eui,
                    latitude = %latitude,
                    longitude = %longitude,
                    "report_invalid_coordinate"
                );
                Ok(None)
            }
            Err(e) => {
                self.metrics.record_store_error();
                error!(dev_eui = %report.dev_eui, error = %e, "report_scoring_failed");
                Err(e)
            }
        }
    }

    /// Consume reports until every sender is gone
    pub async fn run(&self, mut report_rx: mpsc::Receiver<LocationReport>) {
        info!("ingest_pipeline_started");

        while let Some(report) = report_rx.recv().await {
            // Errors are logged and counted in ingest()
            let _ = self.ingest(&report);
        }

        info!("ingest_pipeline_stopped");
    }
}
