use std::time::Duration;

use tokio::time::Instant;

/// Latest deadline a budget can name, about thirty years out.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Wall-clock budget of one run.
///
/// Fixed when the run starts; every turn derives its timeout from the same
/// deadline. The global deadline is a hard ceiling: a turn never gets more
/// time than `remaining - safety_margin`, so the margin is always left over
/// for finalization.
#[derive(Debug, Clone)]
pub struct RunBudget {
    started: Instant,
    deadline: Instant,
    per_turn_timeout: Duration,
    safety_margin: Duration,
}

impl RunBudget {
    pub fn start(total: Duration, per_turn_timeout: Duration, safety_margin: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started.checked_add(total.min(FAR_FUTURE)).unwrap_or(started + FAR_FUTURE),
            per_turn_timeout,
            safety_margin,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Time left before the safety margin is reached.
    pub fn work_window(&self) -> Duration {
        self.remaining().saturating_sub(self.safety_margin)
    }

    /// Timeout for the next turn, or `None` when no turn may start.
    pub fn turn_timeout(&self) -> Option<Duration> {
        let usable = self.remaining().checked_sub(self.safety_margin)?;
        if usable.is_zero() {
            return None;
        }
        Some(usable.min(self.per_turn_timeout))
    }
}
