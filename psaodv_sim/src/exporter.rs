//! JSON export of finished runs.
//!
//! One export file holds every variant run of a scenario so AODV and
//! PS-AODV results on the same traffic can be compared offline.

use crate::error::SimError;
use crate::runner::{RunOutcome, Termination};
use psaodv_core::{MetricsReport, RunReport, Variant};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One exported run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedRun {
    pub variant: Variant,
    pub termination: Termination,
    pub report: RunReport,
}

/// Complete export container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    /// Scenario name, or the trace path for replayed runs
    pub scenario: String,

    /// Master seed
    pub seed: u64,

    pub runs: Vec<ExportedRun>,
}

impl RunExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            runs: Vec::new(),
        }
    }

    /// Adds a finished run.
    pub fn add_run(&mut self, outcome: &RunOutcome) {
        self.runs.push(ExportedRun {
            variant: outcome.report.variant,
            termination: outcome.termination.clone(),
            report: outcome.report.clone(),
        });
    }

    /// Metrics of the run for `variant`, if present.
    pub fn metrics(&self, variant: Variant) -> Option<&MetricsReport> {
        self.runs
            .iter()
            .find(|run| run.variant == variant)
            .map(|run| &run.report.metrics)
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
