//! Progress reporting from the engine back to the caller

use crate::utils::format_bytes;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Receives conversion progress.
///
/// Called with the fraction done in [0, 1] and the bytes written so far. May be
/// called from an engine thread.
pub trait ProgressCallback: Send + Sync {
    fn record_progress(&self, progress: f32, total_bytes_written: u64);
}

impl<F> ProgressCallback for F
where
    F: Fn(f32, u64) + Send + Sync,
{
    fn record_progress(&self, progress: f32, total_bytes_written: u64) {
        self(progress, total_bytes_written)
    }
}

/// Tracks the last forwarded integer percentage of one output stream
#[derive(Debug)]
pub struct ProgressThrottle {
    last_percentage: AtomicI32,
    step: i32,
}

impl ProgressThrottle {
    /// Minimum percentage advance between two notifications
    pub const DEFAULT_STEP: i32 = 5;

    pub fn new() -> Self {
        Self::with_step(Self::DEFAULT_STEP)
    }

    pub fn with_step(step: i32) -> Self {
        Self {
            last_percentage: AtomicI32::new(0),
            step: step.max(1),
        }
    }

    /// Integer percentage of a progress fraction, truncated; `None` for NaN.
    ///
    /// Computed in double precision: 0.06f32 is slightly below 0.06 and maps to 5.
    pub fn percentage(progress: f32) -> Option<i32> {
        if progress.is_nan() {
            return None;
        }
        Some((f64::from(progress.clamp(0.0, 1.0)) * 100.0) as i32)
    }

    /// Returns the percentage to report if it advanced by at least one step.
    ///
    /// Backward moves are ignored and never lower the stored value.
    pub fn advance(&self, progress: f32) -> Option<i32> {
        let percentage = Self::percentage(progress)?;
        let mut last = self.last_percentage.load(Ordering::Acquire);
        loop {
            if percentage - last < self.step {
                return None;
            }
            match self.last_percentage.compare_exchange_weak(
                last,
                percentage,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(percentage),
                Err(current) => last = current,
            }
        }
    }

    /// Last percentage that was forwarded
    pub fn last_percentage(&self) -> i32 {
        self.last_percentage.load(Ordering::Acquire)
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new()
    }
}

/// Throttles engine progress and forwards it to the caller's callback.
///
/// One forwarder belongs to one session, so each output file has its own
/// throttle state.
pub struct ProgressForwarder {
    callback: Arc<dyn ProgressCallback>,
    throttle: ProgressThrottle,
    log_progress: bool,
    session_id: Uuid,
}

impl ProgressForwarder {
    pub fn new(callback: Arc<dyn ProgressCallback>, session_id: Uuid, log_progress: bool) -> Self {
        Self {
            callback,
            throttle: ProgressThrottle::new(),
            log_progress,
            session_id,
        }
    }

    /// Entry point for the engine
    pub fn report(&self, progress: f32, total_bytes_written: u64) {
        let Some(percentage) = self.throttle.advance(progress) else {
            return;
        };

        if self.log_progress {
            log::info!(
                "[{}] progress {}% [{}]",
                self.session_id,
                percentage,
                format_bytes(total_bytes_written as usize)
            );
        }
        self.callback.record_progress(progress, total_bytes_written);
    }

    pub fn last_percentage(&self) -> i32 {
        self.throttle.last_percentage()
    }
}

impl fmt::Debug for ProgressForwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressForwarder")
            .field("session_id", &self.session_id)
            .field("last_percentage", &self.throttle.last_percentage())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_forwards_every_five_percent() {
        let throttle = ProgressThrottle::new();
        let forwarded: Vec<i32> = [0.0, 0.01, 0.02, 0.03, 0.04, 0.05, 0.06]
            .iter()
            .filter_map(|&p| throttle.advance(p))
            .collect();
        assert_eq!(forwarded, vec![5]);
        assert_eq!(throttle.last_percentage(), 5);
    }

    #[test]
    fn test_percentage_truncates_in_double_precision() {
        assert_eq!(ProgressThrottle::percentage(0.06), Some(5));
        assert_eq!(ProgressThrottle::percentage(0.29), Some(28));
        assert_eq!(ProgressThrottle::percentage(0.05), Some(5));
        assert_eq!(ProgressThrottle::percentage(0.5), Some(50));
        assert_eq!(ProgressThrottle::percentage(1.0), Some(100));
        assert_eq!(ProgressThrottle::percentage(-0.2), Some(0));

        let throttle = ProgressThrottle::new();
        assert_eq!(throttle.advance(0.06), Some(5));
        assert_eq!(throttle.last_percentage(), 5);
        assert_eq!(throttle.advance(0.1), Some(10));
    }

    #[test]
    fn test_backward_progress_not_forwarded() {
        let throttle = ProgressThrottle::new();
        assert_eq!(throttle.advance(0.5), Some(50));
        assert_eq!(throttle.advance(0.2), None);
        assert_eq!(throttle.advance(0.52), None);
        assert_eq!(throttle.last_percentage(), 50);
        assert_eq!(throttle.advance(0.55), Some(55));
    }

    #[test]
    fn test_large_jumps_and_bounds() {
        let throttle = ProgressThrottle::new();
        assert_eq!(throttle.advance(0.37), Some(37));
        assert_eq!(throttle.advance(1.5), Some(100));
        assert_eq!(throttle.advance(f32::NAN), None);
        assert_eq!(throttle.advance(1.0), None);
    }

    #[test]
    fn test_concurrent_advance_reports_each_percentage_once() {
        let throttle = Arc::new(ProgressThrottle::new());
        let reported = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let throttle = Arc::clone(&throttle);
                let reported = Arc::clone(&reported);
                std::thread::spawn(move || {
                    for i in 0..=100 {
                        if let Some(p) = throttle.advance(i as f32 / 100.0) {
                            reported.lock().push(p);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut reported = reported.lock().clone();
        let len = reported.len();
        reported.sort_unstable();
        reported.dedup();
        assert_eq!(reported.len(), len);
        assert_eq!(throttle.last_percentage(), 100);
    }

    #[test]
    fn test_forwarder_calls_callback() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let forwarder = ProgressForwarder::new(
            Arc::new(move |p: f32, bytes: u64| sink.lock().push((p, bytes))),
            Uuid::new_v4(),
            false,
        );

        for i in 0..=20u64 {
            forwarder.report((i * 5) as f32 / 100.0 + 0.001, i * 1024);
        }

        let calls = calls.lock();
        assert_eq!(calls.len(), 20);
        assert_eq!(calls[0].1, 1024);
        assert_eq!(forwarder.last_percentage(), 100);
    }
}
