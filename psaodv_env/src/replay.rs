//! Trace-replay mobility source.
//!
//! Replays a floating-car-data trace recorded from an external traffic
//! simulator. The trace is JSON lines, one [`PositionSample`] per line;
//! blank lines and lines starting with `#` are ignored.

use crate::error::EnvError;
use crate::mobility::MobilitySource;
use crate::types::{Position, PositionSample, VehicleId};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Mobility source backed by a recorded trace.
///
/// Steps are contiguous from 0 to the last recorded step; a step without
/// records simply has no active vehicles.
pub struct TraceReplay {
    /// Positions per step, ids sorted for deterministic iteration
    steps: BTreeMap<u64, BTreeMap<VehicleId, Position>>,

    /// Last step each vehicle appears in
    last_seen: HashMap<VehicleId, u64>,

    /// Step currently exposed (None before the first advance)
    current: Option<u64>,

    /// Final recorded step
    last_step: Option<u64>,

    closed: bool,
}

impl TraceReplay {
    /// Builds a replay from already-parsed samples.
    pub fn from_samples(samples: impl IntoIterator<Item = PositionSample>) -> Self {
        let mut steps: BTreeMap<u64, BTreeMap<VehicleId, Position>> = BTreeMap::new();
        let mut last_seen: HashMap<VehicleId, u64> = HashMap::new();

        for sample in samples {
            let position = sample.position();
            let seen = last_seen.entry(sample.id.clone()).or_insert(sample.step);
            *seen = (*seen).max(sample.step);

            let previous = steps
                .entry(sample.step)
                .or_default()
                .insert(sample.id.clone(), position);
            if previous.is_some() {
                warn!("Duplicate trace record for {} at step {}, keeping the last one", sample.id, sample.step);
            }
        }

        let last_step = steps.keys().next_back().copied();

        Self {
            steps,
            last_seen,
            current: None,
            last_step,
            closed: false,
        }
    }

    /// Parses a JSON-lines trace from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, EnvError> {
        let mut samples = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let sample: PositionSample =
                serde_json::from_str(trimmed).map_err(|e| EnvError::trace(index + 1, e))?;
            samples.push(sample);
        }

        debug!("Parsed {} trace records", samples.len());
        Ok(Self::from_samples(samples))
    }

    /// Opens a trace file.
    ///
    /// A file that cannot be opened means the source failed to start.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| EnvError::unavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Returns the step currently exposed, if any.
    pub fn current_step(&self) -> Option<u64> {
        self.current
    }

    /// Returns the number of distinct vehicles in the trace.
    pub fn vehicle_count(&self) -> usize {
        self.last_seen.len()
    }

    /// Returns true once `close()` has succeeded.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn current_positions(&self) -> Option<&BTreeMap<VehicleId, Position>> {
        self.current.and_then(|step| self.steps.get(&step))
    }
}

impl MobilitySource for TraceReplay {
    fn active_node_ids(&self) -> Vec<VehicleId> {
        self.current_positions()
            .map(|positions| positions.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn position(&self, id: &VehicleId) -> Option<Position> {
        self.current_positions()?.get(id).copied()
    }

    fn advance_step(&mut self) -> Result<(), EnvError> {
        if self.closed {
            return Err(EnvError::unavailable("trace replay is closed"));
        }

        let next = self.current.map_or(0, |step| step + 1);
        match self.last_step {
            Some(last) if next <= last => {
                self.current = Some(next);
                Ok(())
            }
            _ => Err(EnvError::unavailable(format!("trace exhausted at step {}", next))),
        }
    }

    fn remaining_expected_nodes(&self) -> usize {
        if self.closed {
            return 0;
        }
        match self.current {
            None => self.last_seen.len(),
            Some(step) => self.last_seen.values().filter(|&&last| last > step).count(),
        }
    }

    fn close(&mut self) -> Result<(), EnvError> {
        if self.closed {
            return Err(EnvError::AlreadyClosed);
        }
        self.closed = true;
        debug!("Trace replay closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TRACE: &str = r#"
# step, id, x, y
{"step":0,"id":"veh0","x":0.0,"y":0.0}
{"step":0,"id":"veh1","x":10.0,"y":0.0}
{"step":1,"id":"veh0","x":5.0,"y":0.0}
{"step":2,"id":"veh0","x":10.0,"y":0.0}
"#;

    fn replay() -> TraceReplay {
        TraceReplay::from_reader(TRACE.as_bytes()).unwrap()
    }

    #[test]
    fn test_replay_before_first_step() {
        let trace = replay();

        assert_eq!(trace.vehicle_count(), 2);
        assert_eq!(trace.remaining_expected_nodes(), 2);
        assert!(trace.active_node_ids().is_empty());
        assert_eq!(trace.current_step(), None);
    }

    #[test]
    fn test_replay_steps_through_trace() {
        let mut trace = replay();

        trace.advance_step().unwrap();
        assert_eq!(trace.active_node_ids().len(), 2);
        // veh1 leaves after step 0
        assert_eq!(trace.remaining_expected_nodes(), 1);

        trace.advance_step().unwrap();
        let pos = trace.position(&VehicleId::from("veh0")).unwrap();
        assert_relative_eq!(pos.x, 5.0);
        assert!(trace.position(&VehicleId::from("veh1")).is_none());

        trace.advance_step().unwrap();
        assert_eq!(trace.remaining_expected_nodes(), 0);
    }

    #[test]
    fn test_replay_exhausted_is_unavailable() {
        let mut trace = replay();
        for _ in 0..3 {
            trace.advance_step().unwrap();
        }

        let err = trace.advance_step().unwrap_err();
        assert!(matches!(err, EnvError::SourceUnavailable(_)));
    }

    #[test]
    fn test_replay_close_once() {
        let mut trace = replay();

        assert!(trace.close().is_ok());
        assert!(trace.is_closed());
        assert!(matches!(trace.close(), Err(EnvError::AlreadyClosed)));
        assert!(trace.advance_step().is_err());
        assert_eq!(trace.remaining_expected_nodes(), 0);
    }

    #[test]
    fn test_replay_bad_line_reports_line_number() {
        let input = "{\"step\":0,\"id\":\"a\",\"x\":0.0,\"y\":0.0}\nnot json\n";
        let err = TraceReplay::from_reader(input.as_bytes()).err().unwrap();

        match err {
            EnvError::Trace { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_replay_missing_file() {
        let err = TraceReplay::open("/nonexistent/trace.jsonl").err().unwrap();
        assert!(matches!(err, EnvError::SourceUnavailable(_)));
    }

    #[test]
    fn test_snapshot_skips_nothing_when_positions_known() {
        let mut trace = replay();
        trace.advance_step().unwrap();

        let snapshot = trace.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].0, VehicleId::from("veh0"));
    }
}
