use std::time::Duration;

/// Fixed-interval polling bounded by a total wait, measured in elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedPoll {
    interval: Duration,
    budget: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Reached { waited: Duration },
    TimedOut { waited: Duration },
}

impl BoundedPoll {
    pub fn new(interval: Duration, budget: Duration) -> Self {
        Self { interval, budget }
    }

    /// Upper bound on sleeps: `ceil(budget / interval)`.
    pub fn max_sleeps(&self) -> u64 {
        if self.budget.is_zero() {
            return 0;
        }
        if self.interval.is_zero() {
            return 1;
        }
        let budget = self.budget.as_millis();
        let interval = self.interval.as_millis().max(1);
        u64::try_from(budget.div_ceil(interval)).unwrap_or(u64::MAX)
    }

    /// Probe, then sleep one interval, until the probe succeeds or the
    /// budget is spent. The final sleep is shortened so the total wait never
    /// exceeds the budget.
    pub fn run<F, S>(&self, mut probe: F, mut sleep: S) -> PollOutcome
    where
        F: FnMut() -> bool,
        S: FnMut(Duration),
    {
        let mut waited = Duration::ZERO;
        loop {
            if probe() {
                return PollOutcome::Reached { waited };
            }
            let remaining = self.budget.saturating_sub(waited);
            if remaining.is_zero() {
                return PollOutcome::TimedOut { waited };
            }
            let step = if self.interval.is_zero() {
                remaining
            } else {
                self.interval.min(remaining)
            };
            sleep(step);
            waited += step;
        }
    }
}
