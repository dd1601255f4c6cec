//! Single-use timers for duration-flavoured histograms and summaries.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use meterd_common::error::Result;

use crate::labels::LabelVector;

/// Instruments a [`Timer`] can report into.
pub trait Observe: Send + Sync {
    fn observe(&self, labels: &LabelVector, value: f64) -> Result<()>;
}

/// Captures a monotonic start instant plus the labels known at start.
///
/// Stopping consumes the timer, so it records at most once. A timer that is
/// dropped without being stopped records nothing.
#[must_use = "a timer records nothing unless it is stopped"]
pub struct Timer<M: Observe> {
    metric: Arc<M>,
    labels: LabelVector,
    started_at: Instant,
}

impl<M: Observe> Timer<M> {
    pub(crate) fn start(metric: Arc<M>, labels: LabelVector) -> Self {
        Self {
            metric,
            labels,
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn labels(&self) -> &LabelVector {
        &self.labels
    }

    /// Observes the elapsed seconds with the start labels and returns them.
    pub fn stop(self) -> Result<f64> {
        self.stop_with(&LabelVector::new())
    }

    /// Observes the elapsed seconds with `extra` merged over the start labels.
    pub fn stop_with(self, extra: &LabelVector) -> Result<f64> {
        let seconds = self.started_at.elapsed().as_secs_f64();
        let labels = self.labels.merge(extra);
        self.metric.observe(&labels, seconds)?;
        Ok(seconds)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::labels;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(LabelVector, f64)>>,
    }

    impl Observe for Recorder {
        fn observe(&self, labels: &LabelVector, value: f64) -> Result<()> {
            self.seen
                .lock()
                .expect("recorder lock")
                .push((labels.clone(), value));
            Ok(())
        }
    }

    #[test]
    fn stop_merges_labels_and_records_once() {
        let recorder = Arc::new(Recorder::default());
        let timer = Timer::start(
            Arc::clone(&recorder),
            labels! { "method" => "GET", "route" => "/hello" },
        );
        std::thread::sleep(Duration::from_millis(5));
        let seconds = timer.stop_with(&labels! { "code" => 200 }).expect("stop");

        let seen = recorder.seen.lock().expect("recorder lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].0,
            labels! { "method" => "GET", "route" => "/hello", "code" => 200 }
        );
        assert_eq!(seen[0].1, seconds);
        assert!(seconds >= 0.005);
    }

    #[test]
    fn exposes_start_labels_and_elapsed_before_stopping() {
        let recorder = Arc::new(Recorder::default());
        let timer = Timer::start(Arc::clone(&recorder), labels! { "route" => "/hello" });
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(timer.labels(), &labels! { "route" => "/hello" });
        let elapsed = timer.elapsed();
        assert!(elapsed >= Duration::from_millis(2));
        assert!(recorder.seen.lock().expect("recorder lock").is_empty());

        let seconds = timer.stop().expect("stop");
        assert!(seconds >= elapsed.as_secs_f64());
    }

    #[test]
    fn dropped_timer_records_nothing() {
        let recorder = Arc::new(Recorder::default());
        drop(Timer::start(Arc::clone(&recorder), LabelVector::new()));
        assert!(recorder.seen.lock().expect("recorder lock").is_empty());
    }
}
