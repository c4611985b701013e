//! Execution phase timings reported by the `-t` option.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Tracks the durations of the processing phases.
#[derive(Debug)]
pub struct Timing {
    mark: Instant,
    /// Input network loading time.
    pub loadnet: Duration,
    /// Evaluated clusters loading time.
    pub loadcls: Duration,
    /// Clustering time.
    pub cluster: Duration,
    /// Evaluation time.
    pub evaluate: Duration,
    /// Results serialization time.
    pub outpfile: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self::new()
    }
}

impl Timing {
    /// Starts the measurement.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mark: Instant::now(),
            loadnet: Duration::ZERO,
            loadcls: Duration::ZERO,
            cluster: Duration::ZERO,
            evaluate: Duration::ZERO,
            outpfile: Duration::ZERO,
        }
    }

    /// Updates the timestamp, returning the duration since the last update.
    pub fn update(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now - self.mark;
        self.mark = now;
        elapsed
    }

    /// Renders the non-zero phase timings, one line each.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("-execute(), timings:\n");
        for (label, value) in [
            ("input network loading", self.loadnet),
            ("clusters loading", self.loadcls),
            ("clustering", self.cluster),
            ("evaluation", self.evaluate),
            ("results serialization", self.outpfile),
        ] {
            if !value.is_zero() {
                let _ = writeln!(
                    out,
                    "-  {label}: {}.{:06} sec",
                    value.as_secs(),
                    value.subsec_micros()
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_accumulates_forward() {
        let mut timing = Timing::new();
        timing.loadnet = timing.update();
        timing.cluster = timing.update();
        let rendered = timing.render();
        assert!(rendered.starts_with("-execute(), timings:"));
    }

    #[test]
    fn zero_phases_are_omitted() {
        let timing = Timing::new();
        let rendered = timing.render();
        assert!(!rendered.contains("evaluation"));
    }
}
