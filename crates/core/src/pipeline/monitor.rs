//! Progress reporting and cooperative cancellation
//!
//! The pipeline polls [`RunMonitor::is_cancelled`] once before every interval
//! and reports progress after every interval. Nothing is preempted.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

/// The two calls a host needs to observe and stop a run
pub trait RunMonitor {
    /// Fraction of intervals completed, in percent
    fn report_progress(&self, percent: f64);

    /// Whether the host asked the run to stop
    fn is_cancelled(&self) -> bool;
}

/// Shared abort flag
///
/// Clones share the flag, so a host thread can cancel a run in progress.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl RunMonitor for CancellationToken {
    fn report_progress(&self, _percent: f64) {}

    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}

/// Monitor that never cancels and ignores progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl RunMonitor for NoopMonitor {
    fn report_progress(&self, _percent: f64) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Logs progress every `step_percent` and honours a cancellation token
#[derive(Debug)]
pub struct LoggingMonitor {
    token: CancellationToken,
    step_percent: u32,
    next_report: AtomicU32,
}

impl LoggingMonitor {
    pub fn new(token: CancellationToken) -> Self {
        Self::with_step(token, 10)
    }

    pub fn with_step(token: CancellationToken, step_percent: u32) -> Self {
        let step_percent = step_percent.clamp(1, 100);
        Self {
            token,
            step_percent,
            next_report: AtomicU32::new(step_percent),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl RunMonitor for LoggingMonitor {
    fn report_progress(&self, percent: f64) {
        let whole = percent.clamp(0.0, 100.0).floor() as u32;
        let next = self.next_report.load(Ordering::Relaxed);
        if whole >= next {
            info!(progress = whole, "Run progress {whole}%");
            let following = (whole / self.step_percent + 1) * self.step_percent;
            self.next_report.store(following, Ordering::Relaxed);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_clones_share_flag() {
        let token = CancellationToken::new();
        let host = token.clone();
        assert!(!RunMonitor::is_cancelled(&token));
        host.cancel();
        assert!(RunMonitor::is_cancelled(&token));
    }

    #[test]
    fn test_logging_monitor_advances_threshold() {
        let monitor = LoggingMonitor::with_step(CancellationToken::new(), 25);
        monitor.report_progress(10.0);
        assert_eq!(monitor.next_report.load(Ordering::Relaxed), 25);
        monitor.report_progress(60.0);
        assert_eq!(monitor.next_report.load(Ordering::Relaxed), 75);
        monitor.report_progress(100.0);
        assert_eq!(monitor.next_report.load(Ordering::Relaxed), 125);
        assert!(!monitor.is_cancelled());
        monitor.token().cancel();
        assert!(monitor.is_cancelled());
    }
}
