//! Run driver: lock-step loop between a mobility source and a session.

use crate::context::SimContext;
use crate::error::SimError;
use psaodv_core::{ProtocolConfig, RunReport, SimulationSession, TriggerPolicy, Variant};
use psaodv_env::{EnvError, MobilitySource};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Step cap of the reference pseudonymous run.
pub const REFERENCE_PSAODV_MAX_STEPS: u64 = 5000;

/// Loop limits and logging cadence.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Stop after this many steps (None = until the source runs dry)
    pub max_steps: Option<u64>,

    /// Steps between progress lines
    pub progress_interval: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            progress_interval: 100,
        }
    }
}

impl RunnerConfig {
    /// Reference limits for `variant`: plain runs until the source is
    /// exhausted, pseudonymous runs are capped at 5000 steps.
    pub fn reference(variant: Variant) -> Self {
        let max_steps = match variant {
            Variant::Plain => None,
            Variant::Pseudonymous => Some(REFERENCE_PSAODV_MAX_STEPS),
        };
        Self {
            max_steps,
            ..Self::default()
        }
    }

    pub fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No more vehicles expected
    SourceExhausted,

    /// Step cap reached
    MaxSteps,

    /// Stop flag raised (e.g. Ctrl-C)
    Interrupted,

    /// The mobility source failed while advancing
    SourceFailed(String),
}

impl Termination {
    pub fn is_failure(&self) -> bool {
        matches!(self, Termination::SourceFailed(_))
    }
}

/// Result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub seed: u64,
    pub termination: Termination,
    pub report: RunReport,
}

/// Drives one session against one mobility source.
pub struct SimulationRunner {
    context: SimContext,
    config: RunnerConfig,
    stop: Arc<AtomicBool>,
}

impl SimulationRunner {
    /// Creates a runner whose protocol randomness derives from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            context: SimContext::new(seed),
            config: RunnerConfig::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an externally owned stop flag.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Handle that interrupts the run when set to true.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn seed(&self) -> u64 {
        self.context.seed()
    }

    /// Runs until the source is exhausted, the step cap is hit, the stop
    /// flag is raised or the source fails.
    ///
    /// The source is closed exactly once on every path and a report of
    /// whatever was processed is always returned.
    pub fn run<M, P>(&mut self, session: &mut SimulationSession<P>, source: &mut M) -> RunOutcome
    where
        M: MobilitySource,
        P: TriggerPolicy,
    {
        let variant = session.config().variant;
        info!(
            "Starting {} run (seed={}, max_steps={:?})",
            variant,
            self.context.seed(),
            self.config.max_steps
        );

        let termination = self.drive(session, source);

        match source.close() {
            Ok(()) => {}
            Err(e) if !e.is_fatal() => debug!("Mobility source was already closed"),
            Err(e) => warn!("Failed to close mobility source: {}", e),
        }

        let report = session.report();
        info!(
            "{} run finished after {} steps ({:?}), {} vehicles tracked",
            variant,
            report.steps,
            termination,
            report.vehicles.len()
        );
        if report.metrics.delivery_unconfirmed {
            warn!("No delivery confirmations recorded; PDR is reported as 0");
        }

        RunOutcome {
            seed: self.context.seed(),
            termination,
            report,
        }
    }

    /// Validates `config`, then opens the source with `open` and runs it.
    ///
    /// An invalid config is rejected before `open` is called, so a source
    /// is never left open without a run that closes it.
    pub fn run_config<M, F>(&mut self, config: ProtocolConfig, open: F) -> Result<RunOutcome, SimError>
    where
        M: MobilitySource,
        F: FnOnce() -> Result<M, EnvError>,
    {
        let mut session = SimulationSession::new(config)?;
        let mut source = open()?;
        Ok(self.run(&mut session, &mut source))
    }

    fn drive<M, P>(&mut self, session: &mut SimulationSession<P>, source: &mut M) -> Termination
    where
        M: MobilitySource,
        P: TriggerPolicy,
    {
        let mut step: u64 = 0;

        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Stop requested at step {}", step);
                return Termination::Interrupted;
            }
            if source.remaining_expected_nodes() == 0 {
                return Termination::SourceExhausted;
            }
            if self.config.max_steps.is_some_and(|max| step >= max) {
                return Termination::MaxSteps;
            }

            if let Err(e) = source.advance_step() {
                error!("Mobility source failed at step {}: {}", step, e);
                return Termination::SourceFailed(e.to_string());
            }

            if self.config.progress_interval > 0 && step % self.config.progress_interval == 0 {
                info!("Simulation step: {}", step);
            }

            let snapshot = source.snapshot();
            let outcome = session.process_step(step, &snapshot, self.context.rng());
            if !outcome.interceptions.is_empty() {
                debug!("Step {}: {} new interceptions", step, outcome.interceptions.len());
            }

            step += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psaodv_core::ConfigError;
    use psaodv_env::{Position, VehicleId};
    use std::cell::Cell;
    use std::rc::Rc;

    /// Two fixed vehicles for `steps` steps, optionally failing.
    struct MockSource {
        step: Option<u64>,
        steps: u64,
        fail_at: Option<u64>,
        closes: usize,
        closed_total: Option<Rc<Cell<usize>>>,
    }

    impl MockSource {
        fn new(steps: u64) -> Self {
            Self {
                step: None,
                steps,
                fail_at: None,
                closes: 0,
                closed_total: None,
            }
        }
    }

    impl MobilitySource for MockSource {
        fn active_node_ids(&self) -> Vec<VehicleId> {
            if self.step.is_some() {
                vec![VehicleId::from("a"), VehicleId::from("b")]
            } else {
                Vec::new()
            }
        }

        fn position(&self, id: &VehicleId) -> Option<Position> {
            let step = self.step? as f64;
            match id.as_str() {
                "a" => Some(Position::new(step, 0.0)),
                "b" => Some(Position::new(0.0, step)),
                _ => None,
            }
        }

        fn advance_step(&mut self) -> Result<(), EnvError> {
            let next = self.step.map_or(0, |s| s + 1);
            if self.fail_at == Some(next) {
                return Err(EnvError::unavailable("connection lost"));
            }
            self.step = Some(next);
            Ok(())
        }

        fn remaining_expected_nodes(&self) -> usize {
            let done = self.step.map_or(0, |s| s + 1);
            if done < self.steps {
                2
            } else {
                0
            }
        }

        fn close(&mut self) -> Result<(), EnvError> {
            self.closes += 1;
            if let Some(total) = &self.closed_total {
                total.set(total.get() + 1);
            }
            Ok(())
        }
    }

    fn session() -> SimulationSession {
        SimulationSession::new(ProtocolConfig::psaodv()).unwrap()
    }

    #[test]
    fn test_runs_until_exhausted() {
        let mut source = MockSource::new(25);
        let mut session = session();
        let outcome = SimulationRunner::new(42).run(&mut session, &mut source);

        assert_eq!(outcome.termination, Termination::SourceExhausted);
        assert_eq!(outcome.report.steps, 25);
        assert_eq!(source.closes, 1);
        // HELLO at steps 0, 10, 20 for two vehicles
        assert_eq!(outcome.report.metrics.counters.hello_count, 6);
    }

    #[test]
    fn test_max_steps() {
        let mut source = MockSource::new(1000);
        let mut session = session();
        let mut runner =
            SimulationRunner::new(1).with_config(RunnerConfig::default().with_max_steps(Some(30)));
        let outcome = runner.run(&mut session, &mut source);

        assert_eq!(outcome.termination, Termination::MaxSteps);
        assert_eq!(outcome.report.steps, 30);
        assert_eq!(source.closes, 1);
    }

    #[test]
    fn test_source_failure_still_reports_and_closes() {
        let mut source = MockSource::new(100);
        source.fail_at = Some(12);
        let mut session = session();
        let outcome = SimulationRunner::new(7).run(&mut session, &mut source);

        assert!(outcome.termination.is_failure());
        assert_eq!(outcome.report.steps, 12);
        assert_eq!(outcome.report.vehicles.len(), 2);
        assert_eq!(source.closes, 1);
    }

    #[test]
    fn test_interrupt_closes_once() {
        let mut source = MockSource::new(100);
        let mut session = session();
        let mut runner = SimulationRunner::new(3);
        runner.stop_handle().store(true, Ordering::SeqCst);

        let outcome = runner.run(&mut session, &mut source);

        assert_eq!(outcome.termination, Termination::Interrupted);
        assert_eq!(outcome.report.steps, 0);
        assert_eq!(source.closes, 1);
    }

    #[test]
    fn test_same_seed_same_report() {
        let run = |seed| {
            let mut source = MockSource::new(80);
            let mut session = session();
            SimulationRunner::new(seed).run(&mut session, &mut source).report.metrics
        };

        let a = run(99);
        let b = run(99);
        assert_eq!(a.counters.prreq_count, b.counters.prreq_count);
        assert_eq!(a.counters.prrep_count, b.counters.prrep_count);
        assert_eq!(a.counters.pseudonym_refreshes, b.counters.pseudonym_refreshes);
    }

    #[test]
    fn test_reference_limits() {
        assert_eq!(RunnerConfig::reference(Variant::Plain).max_steps, None);
        assert_eq!(RunnerConfig::reference(Variant::Pseudonymous).max_steps, Some(5000));
    }

    #[test]
    fn test_invalid_config_never_opens_source() {
        let opened = Cell::new(false);
        let config = ProtocolConfig::psaodv().with_request_probability(1.5);

        let result = SimulationRunner::new(5).run_config(config, || {
            opened.set(true);
            Ok(MockSource::new(10))
        });

        assert!(matches!(
            result,
            Err(SimError::Config(ConfigError::Probability { name: "request_probability", .. }))
        ));
        assert!(!opened.get());
    }

    #[test]
    fn test_run_config_closes_opened_source_once() {
        let closes = Rc::new(Cell::new(0));
        let handle = Rc::clone(&closes);

        let outcome = SimulationRunner::new(5)
            .run_config(ProtocolConfig::aodv(), move || {
                let mut source = MockSource::new(15);
                source.closed_total = Some(handle);
                Ok(source)
            })
            .unwrap();

        assert_eq!(outcome.termination, Termination::SourceExhausted);
        assert_eq!(outcome.report.steps, 15);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_run_config_open_failure() {
        let result = SimulationRunner::new(5).run_config(ProtocolConfig::aodv(), || {
            Err::<MockSource, _>(EnvError::unavailable("no trace"))
        });

        assert!(matches!(result, Err(SimError::Env(EnvError::SourceUnavailable(_)))));
    }

    #[test]
    fn test_already_closed_source_still_reports() {
        let traffic = crate::traffic::TrafficConfig::default().with_vehicles(3);
        let mut source = crate::traffic::SyntheticTraffic::new(&traffic, 1).unwrap();
        source.close().unwrap();

        let mut session = session();
        let outcome = SimulationRunner::new(1).run(&mut session, &mut source);

        assert_eq!(outcome.termination, Termination::SourceExhausted);
        assert_eq!(outcome.report.steps, 0);
        assert!(source.is_closed());
    }
}
