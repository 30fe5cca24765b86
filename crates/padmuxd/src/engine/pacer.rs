use std::time::{Duration, Instant};

const MEASURE_WINDOW: Duration = Duration::from_secs(1);

/// What to do with the time left before a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    Sleep(Duration),
    Spin,
    Done,
}

/// Coarse sleep while more than `spin_threshold` remains, busy-wait after.
pub(crate) fn plan(now: Instant, deadline: Instant, spin_threshold: Duration) -> Wait {
    let remaining = deadline.saturating_duration_since(now);
    if remaining.is_zero() {
        Wait::Done
    } else if remaining > spin_threshold {
        Wait::Sleep(remaining - spin_threshold)
    } else {
        Wait::Spin
    }
}

/// Fixed-rate tick scheduler with a measured frequency.
#[derive(Debug)]
pub struct Pacer {
    period: Duration,
    spin_threshold: Duration,
    next: Instant,
    window_start: Instant,
    cycles: u32,
}

impl Pacer {
    pub fn new(period: Duration, spin_threshold: Duration, now: Instant) -> Self {
        Self {
            period,
            spin_threshold,
            next: now,
            window_start: now,
            cycles: 0,
        }
    }

    /// Advance the deadline by one period. A pacer more than a whole period
    /// late starts over from `now` instead of racing to catch up.
    pub(crate) fn advance(&mut self, now: Instant) -> Instant {
        self.next += self.period;
        if now.saturating_duration_since(self.next) > self.period {
            self.next = now;
        }
        self.next
    }

    /// Count a finished cycle. Returns the rate in Hz once per window.
    pub(crate) fn count(&mut self, now: Instant) -> Option<f64> {
        self.cycles += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < MEASURE_WINDOW {
            return None;
        }
        let hz = f64::from(self.cycles) / elapsed.as_secs_f64();
        self.cycles = 0;
        self.window_start = now;
        Some(hz)
    }

    /// Block until the next tick.
    pub fn wait(&mut self) -> Option<f64> {
        let deadline = self.advance(Instant::now());
        loop {
            match plan(Instant::now(), deadline, self.spin_threshold) {
                Wait::Sleep(duration) => std::thread::sleep(duration),
                Wait::Spin => std::hint::spin_loop(),
                Wait::Done => break,
            }
        }
        self.count(Instant::now())
    }
}
