//! Simulated transfer: fabricated progress at a fixed sampling cadence.
//!
//! Stands in for the network during demos and tests. Each sample adds a
//! random step in `[min_step, max_step]` percent and reports the speed that
//! step implies; an optional per-sample failure rate injects faults.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

use super::{Observed, Progress, TransferError, TransferExecutor, TransferHandle, TransferRequest};
use crate::config::UdqConfig;

#[derive(Debug, Clone)]
pub struct SimulatedTransfer {
    sample_interval: Duration,
    min_step: f64,
    max_step: f64,
    failure_rate: f64,
}

impl SimulatedTransfer {
    pub fn new(sample_interval: Duration) -> Self {
        Self {
            sample_interval,
            min_step: 2.0,
            max_step: 10.0,
            failure_rate: 0.0,
        }
    }

    pub fn from_config(cfg: &UdqConfig) -> Self {
        Self::new(cfg.sample_interval())
            .with_steps(cfg.simulated.min_step_percent, cfg.simulated.max_step_percent)
            .with_failure_rate(cfg.simulated.failure_rate)
    }

    /// Step bounds in percent per sample. Equal bounds give a deterministic pace.
    pub fn with_steps(mut self, min_step: f64, max_step: f64) -> Self {
        let min_step = min_step.max(0.01);
        self.min_step = min_step;
        self.max_step = max_step.max(min_step);
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    fn next_step(&self) -> f64 {
        if self.max_step <= self.min_step {
            return self.min_step;
        }
        rand::thread_rng().gen_range(self.min_step..=self.max_step)
    }

    fn should_fail(&self) -> bool {
        self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate)
    }
}

#[async_trait]
impl TransferExecutor for SimulatedTransfer {
    async fn transfer(
        &self,
        request: TransferRequest,
        handle: TransferHandle,
    ) -> Result<(), TransferError> {
        let interval_secs = self.sample_interval.as_secs_f64().max(f64::EPSILON);
        let mut percent = 0.0;
        loop {
            tokio::time::sleep(self.sample_interval).await;
            match handle.observe() {
                Observed::Cancelled => return Err(TransferError::Cancelled),
                Observed::Paused => continue,
                Observed::Active => {}
            }
            if self.should_fail() {
                return Err(TransferError::Fault(format!(
                    "simulated fault while fetching {}",
                    request.filename
                )));
            }

            let step = self.next_step();
            percent += step;
            if percent >= 100.0 {
                tracing::debug!(job_id = %request.job_id, "simulated transfer finished");
                return Ok(());
            }
            let speed_bps = request.total_bytes as f64 * step / 100.0 / interval_secs;
            handle.record_progress(Progress { percent, speed_bps });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_bounded() {
        let sim = SimulatedTransfer::new(Duration::from_millis(10)).with_steps(3.0, 7.0);
        for _ in 0..200 {
            let s = sim.next_step();
            assert!((3.0..=7.0).contains(&s));
        }
        let fixed = SimulatedTransfer::new(Duration::from_millis(10)).with_steps(5.0, 5.0);
        assert_eq!(fixed.next_step(), 5.0);
    }

    #[test]
    fn inverted_or_invalid_bounds_are_normalised() {
        let sim = SimulatedTransfer::new(Duration::from_millis(10))
            .with_steps(8.0, 2.0)
            .with_failure_rate(f64::NAN);
        assert_eq!(sim.next_step(), 8.0);
        assert!(!sim.should_fail());
        assert!(SimulatedTransfer::new(Duration::from_millis(1))
            .with_failure_rate(5.0)
            .should_fail());
    }
}
