//! Progress reporting for long-running pipeline steps.
//!
//! Every step that moves a meaningful amount of bytes takes a
//! [`ProgressObserver`] and polls [`ProgressObserver::is_canceled`] as it
//! goes. Cancellation is cooperative: once per buffer during byte copies,
//! once per record during archive extraction.

/// Receives progress callbacks from the download and extraction steps.
pub trait ProgressObserver {
    /// A new long-running step has started. `total_work` is the expected
    /// number of work units (usually bytes), or 0 if unknown.
    fn begin_task(&mut self, name: &str, total_work: u64);

    /// Work has progressed to `amount` cumulative units since `begin_task`.
    fn worked(&mut self, amount: u64);

    /// Polled cooperatively; returning `true` aborts the current step with
    /// a cancellation error.
    fn is_canceled(&self) -> bool;

    /// The current step has finished.
    fn done(&mut self);
}

/// A [`ProgressObserver`] that ignores everything and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressObserver for NullProgress {
    fn begin_task(&mut self, _name: &str, _total_work: u64) {}

    fn worked(&mut self, _amount: u64) {}

    fn is_canceled(&self) -> bool {
        false
    }

    fn done(&mut self) {}
}
