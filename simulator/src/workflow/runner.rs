use crate::generator::hydrophones::SimulatedHydrophones;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use pingercore::processing::azimuth::Azimuths;
use pingercore::prelude::Channel;
use pingercore::telemetry::MetricsSnapshot;
use pingercore::{AzimuthReport, CycleOrchestrator, CycleOutcome};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct WorkflowResult {
    pub cycles_run: u64,
    pub locked: bool,
    pub reports: Vec<AzimuthReport>,
    pub final_azimuth: Option<Azimuths>,
    pub metrics: MetricsSnapshot,
    pub final_gain: f64,
    /// Simulated acquisition time at the end of the run [s].
    pub elapsed: f64,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    realtime: bool,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            realtime: false,
        }
    }

    pub fn realtime(mut self, enabled: bool) -> Self {
        self.realtime = enabled;
        self
    }

    pub fn build(&self) -> anyhow::Result<CycleOrchestrator<SimulatedHydrophones>> {
        let hydrophones = SimulatedHydrophones::new(&self.config.pinger, &self.config.scenario)
            .context("building simulated hydrophones")?
            .realtime(self.realtime);
        log::debug!(
            "first pulse reaches channel 1 at {:.6} s",
            hydrophones.next_arrival(Channel::One, 0.0)
        );
        CycleOrchestrator::new(self.config.pinger.clone(), hydrophones)
            .context("building cycle orchestrator")
    }

    /// Runs the configured cycles, or until `stop` is raised when `cycles` is 0.
    pub fn execute_until<F>(&self, stop: &AtomicBool, mut on_report: F) -> anyhow::Result<WorkflowResult>
    where
        F: FnMut(&AzimuthReport),
    {
        let mut orchestrator = self.build()?;
        let mut reports = Vec::new();
        let mut cycles_run = 0;

        while !stop.load(Ordering::SeqCst)
            && (self.config.cycles == 0 || cycles_run < self.config.cycles)
        {
            let outcome = orchestrator
                .step()
                .with_context(|| format!("running cycle {}", cycles_run + 1))?;
            cycles_run += 1;
            if let Some(CycleOutcome::Emitted(report)) = outcome {
                on_report(&report);
                reports.push(report);
            }
        }

        Ok(WorkflowResult {
            cycles_run,
            locked: orchestrator.sync().is_locked(),
            final_azimuth: orchestrator.azimuth().smoothed(),
            metrics: orchestrator.metrics(),
            final_gain: orchestrator.hardware().gain(),
            elapsed: orchestrator.hardware().clock(),
            reports,
        })
    }
}
