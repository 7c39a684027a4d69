use tandem_core::{FmuStateId, Instance, Status, StatusKind};

use crate::{config::RetryPolicy, sampler::Sampler};

use super::{Driver, Progress, StepError};

/// Fixed-step driver for co-simulation components.
///
/// Each call to [`Driver::step`] asks the component to cover the whole
/// interval with one `do_step`. A discarded step means one of two things:
///
/// - the component has terminated, which ends the run normally
/// - the step was too large, in which case the state saved before the step
///   is restored and the rest of the interval is covered with smaller steps
#[derive(Debug, Clone)]
pub struct CoSimulation {
    retry: RetryPolicy,
    time: f64,
    saved: Option<FmuStateId>,
}

impl CoSimulation {
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            time: 0.0,
            saved: None,
        }
    }

    fn has_terminated(instance: &mut Instance) -> Result<bool, StepError> {
        let (status, terminated) = instance.get_boolean_status(StatusKind::Terminated)?;
        Ok(status == Status::Ok && terminated)
    }

    fn last_successful_time(instance: &mut Instance) -> Option<f64> {
        match instance.get_real_status(StatusKind::LastSuccessfulTime) {
            Ok((Status::Ok, time)) => Some(time),
            _ => None,
        }
    }
}

impl Driver for CoSimulation {
    fn start(&mut self, _instance: &mut Instance, time: f64) -> Result<Progress, StepError> {
        self.time = time;
        Ok(Progress::at(time))
    }

    fn step(
        &mut self,
        instance: &mut Instance,
        t_end: f64,
        _sampler: Option<&Sampler>,
    ) -> Result<Progress, StepError> {
        let rollback = self.retry.max_retries > 0 && instance.can_rollback();
        let eps = 1e-12 * t_end.abs().max(1.0);

        let mut t = self.time;
        let mut h = t_end - t;
        let mut retries = 0;

        while t_end - t > eps {
            h = h.min(t_end - t);
            let saved = if rollback {
                Some(self.snapshot(instance)?)
            } else {
                None
            };

            let status = instance.do_step(t, h, !rollback)?;
            if status.is_success() {
                t = if t_end - (t + h) <= eps { t_end } else { t + h };
                self.time = t;
                continue;
            }

            if Self::has_terminated(instance)? {
                let time = Self::last_successful_time(instance).unwrap_or(t);
                tracing::info!(instance = %instance.name(), time, "component terminated the run");
                self.time = time;
                return Ok(Progress {
                    terminated: true,
                    ..Progress::at(time)
                });
            }

            let Some(saved) = saved else {
                return Err(StepError::Discarded { time: t, step: h });
            };
            retries += 1;
            if retries > self.retry.max_retries {
                return Err(StepError::RetriesExhausted {
                    time: t,
                    retries: self.retry.max_retries,
                });
            }
            h *= self.retry.reduction_factor;
            if h < self.retry.min_step {
                return Err(StepError::StepTooSmall { time: t, step: h });
            }

            tracing::warn!(instance = %instance.name(), time = t, step = h, retries, "step discarded, retrying");
            self.restore(instance, saved)?;
        }

        Ok(Progress::at(t))
    }

    fn snapshot(&mut self, instance: &mut Instance) -> Result<FmuStateId, StepError> {
        let id = instance.get_fmu_state(self.saved)?;
        self.saved = Some(id);
        Ok(id)
    }

    fn restore(&mut self, instance: &mut Instance, state: FmuStateId) -> Result<(), StepError> {
        instance.set_fmu_state(state)?;
        Ok(())
    }

    fn time(&self) -> f64 {
        self.time
    }
}
