//! Progress reporting plumbing.
//!
//! Progress is surfaced through an optional caller-supplied callback. The
//! callback is purely informational: a caller that ignores it still gets
//! correct results, and the pipeline never blocks on it.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Progress callback: a fraction in `[0, 1]` and a status message.
pub type ProgressFn = dyn Fn(f64, &str) + Send + Sync;

/// Handle used by the pipeline to report progress.
///
/// Reported fractions are clamped to `[0, 1]` and forced monotonically
/// non-decreasing across the whole run, so callers can drive progress bars
/// directly. [`Progress::span`] derives a handle that maps its `[0, 1]` input
/// onto a sub-range, letting a phase report its own fraction without knowing
/// where it sits in the run.
#[derive(Clone)]
pub struct Progress {
    callback: Option<Arc<ProgressFn>>,
    // Shared across spans so monotonicity holds run-wide.
    high_water: Arc<Mutex<f64>>,
    start: f64,
    end: f64,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("callback", &self.callback.as_ref().map(|_| "configured"))
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

impl Progress {
    /// Creates a handle around an optional callback.
    #[must_use]
    pub fn new(callback: Option<Arc<ProgressFn>>) -> Self {
        Self {
            callback,
            high_water: Arc::new(Mutex::new(0.0)),
            start: 0.0,
            end: 1.0,
        }
    }

    /// Creates a handle that reports nowhere.
    #[must_use]
    pub fn none() -> Self {
        Self::new(None)
    }

    /// Derives a handle covering the `[start, end]` slice of this one.
    #[must_use]
    pub fn span(&self, start: f64, end: f64) -> Self {
        let width = self.end - self.start;
        Self {
            callback: self.callback.clone(),
            high_water: Arc::clone(&self.high_water),
            start: self.start + width * start.clamp(0.0, 1.0),
            end: self.start + width * end.clamp(0.0, 1.0),
        }
    }

    /// Reports progress; `fraction` is relative to this handle's range.
    pub fn report(&self, fraction: f64, message: &str) {
        let Some(callback) = &self.callback else {
            return;
        };

        let absolute = self.start + (self.end - self.start) * fraction.clamp(0.0, 1.0);
        let clamped = {
            let mut high = self
                .high_water
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *high = high.max(absolute);
            *high
        };
        callback(clamped, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (Progress, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(Some(Arc::new(move |fraction, _| {
            sink.lock().unwrap().push(fraction);
        })));
        (progress, seen)
    }

    #[test]
    fn test_fractions_are_monotonic() {
        let (progress, seen) = recording();
        progress.report(0.5, "half");
        progress.report(0.25, "rewind attempt");
        progress.report(1.0, "done");

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_span_maps_into_subrange() {
        let (progress, seen) = recording();
        let fetch = progress.span(0.25, 0.75);
        fetch.report(0.0, "start");
        fetch.report(1.0, "end");

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![0.25, 0.75]);
    }

    #[test]
    fn test_out_of_range_input_is_clamped() {
        let (progress, seen) = recording();
        progress.report(7.0, "overshoot");

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![1.0]);
    }

    #[test]
    fn test_none_handle_is_silent() {
        // Must not panic or require a callback.
        Progress::none().report(0.5, "ignored");
    }
}
