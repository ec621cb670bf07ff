//! Step counting and time-remaining estimates for long-running workflows.

use std::future::Future;
use std::time::Duration;

use fisheye_core::Real;
use tokio::time::Instant;

use crate::cancel::with_timeout;
use crate::device::Presenter;
use crate::PipelineResult;

/// Progress after some units of work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEstimate {
    /// Completed units, possibly fractional while a unit is in flight.
    pub processed: Real,
    pub total: usize,
    /// Completion in `[0, 100]`.
    pub percentage: Real,
    /// `None` until there is something to extrapolate from.
    pub remaining: Option<Duration>,
}

/// Estimate from completed-unit durations.
///
/// Remaining time is the mean observed duration times the units left.
pub fn estimate(processed: usize, total: usize, history: &[Duration]) -> ProgressEstimate {
    let left = total.saturating_sub(processed);
    let remaining = mean_duration(history).map(|mean| mean.saturating_mul(saturating_u32(left)));
    ProgressEstimate {
        processed: processed as Real,
        total,
        percentage: percentage(processed as Real, total),
        remaining,
    }
}

fn mean_duration(history: &[Duration]) -> Option<Duration> {
    if history.is_empty() {
        return None;
    }
    let sum = history
        .iter()
        .fold(Duration::ZERO, |acc, d| acc.saturating_add(*d));
    Some(sum / saturating_u32(history.len()))
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Non-negative seconds as a duration, saturating at [`Duration::MAX`].
fn duration_from_secs(secs: Real) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

fn percentage(processed: Real, total: usize) -> Real {
    if total == 0 {
        100.0
    } else {
        (processed / total as Real * 100.0).clamp(0.0, 100.0)
    }
}

/// Human-readable remaining time.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.2} seconds")
    } else {
        let whole = remaining.as_secs();
        format!("{} min {} s", whole / 60, whole % 60)
    }
}

/// `"<message> <i>/<n>"` plus an ETA line when one is known.
pub fn step_message(message: &str, index: usize, total: usize, remaining: Option<Duration>) -> String {
    match remaining {
        Some(r) => format!(
            "{message} {index}/{total}\nestimated time left {}",
            format_remaining(r)
        ),
        None => format!("{message} {index}/{total}"),
    }
}

/// Times units of work and produces rolling estimates.
#[derive(Debug, Clone)]
pub struct EtaTracker {
    total: usize,
    history: Vec<Duration>,
    current: Option<Instant>,
}

impl EtaTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            history: Vec::with_capacity(total),
            current: None,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.history.len()
    }

    pub fn begin_item(&mut self) {
        self.current = Some(Instant::now());
    }

    /// Close the running unit and return the updated estimate.
    pub fn complete_item(&mut self) -> ProgressEstimate {
        if let Some(started) = self.current.take() {
            self.history.push(started.elapsed());
        }
        self.estimate()
    }

    pub fn estimate(&self) -> ProgressEstimate {
        estimate(self.history.len(), self.total, &self.history)
    }

    /// Estimate while the running unit is `fraction` done.
    ///
    /// Before any unit has completed, the running unit's own pace is
    /// extrapolated over everything left.
    pub fn estimate_within_item(&self, fraction: Real) -> ProgressEstimate {
        let fraction = fraction.clamp(0.0, 1.0);
        let done = self.history.len();
        let processed = done as Real + fraction;
        let elapsed = self.current.map(|t| t.elapsed()).unwrap_or_default();
        let left = self.total.saturating_sub(done) as Real;

        let remaining = match mean_duration(&self.history) {
            Some(mean) => Some(duration_from_secs(
                mean.as_secs_f64() * left - elapsed.as_secs_f64(),
            )),
            None if fraction > 0.0 => {
                let per_item = elapsed.as_secs_f64() / fraction;
                Some(duration_from_secs(per_item * left - elapsed.as_secs_f64()))
            }
            None => None,
        };
        ProgressEstimate {
            processed,
            total: self.total,
            percentage: percentage(processed, self.total),
            remaining,
        }
    }
}

/// Show an indeterminate indicator for the duration of one device round-trip.
///
/// The indicator is dismissed when the call finishes, fails, or exceeds
/// `timeout`; a stalled call yields [`PipelineError::Timeout`](crate::PipelineError::Timeout).
pub async fn with_nonstop_progress<P, T>(
    presenter: &mut P,
    id: &str,
    message: &str,
    timeout: Duration,
    fut: impl Future<Output = PipelineResult<T>>,
) -> PipelineResult<T>
where
    P: Presenter,
{
    presenter.open_nonstop(id, message);
    let result = with_timeout(timeout, fut).await;
    presenter.dismiss(id);
    result
}
