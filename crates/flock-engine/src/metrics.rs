//! Per-batch timings and cumulative scheduler counters.
//!
//! [`BatchMetrics`] describes one executed `run_batch()`.
//! [`SchedulerStats`] accumulates over the scheduler's lifetime.

/// Timing data for one executed batch.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchMetrics {
    /// Agents decided by this batch.
    pub batch_size: usize,
    /// Backend `forward` calls made (more than one when
    /// `max_batch_size` splits the batch).
    pub chunks: usize,
    /// Time spent building input tensors, in microseconds.
    pub assemble_us: u64,
    /// Time spent inside backend `forward`, in microseconds.
    pub forward_us: u64,
    /// Time spent selecting actions from outputs, in microseconds.
    pub decode_us: u64,
    /// Wall-clock time for the entire batch, in microseconds.
    pub total_us: u64,
}

/// Cumulative counters for one scheduler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Batches that ran inference.
    pub batches_run: u64,
    /// `run_batch()` calls that found nothing pending.
    pub idempotent_skips: u64,
    /// Total agents decided across all batches.
    pub agents_decided: u64,
    /// Observations accepted into the pending batch.
    pub observations_buffered: u64,
    /// Accepted observations that replaced an earlier one for the same agent.
    pub overwrites: u64,
    /// Observations rejected for not fitting the behavior spec.
    pub rejected_submissions: u64,
    /// Backend `forward` calls.
    pub forward_calls: u64,
    /// Failed batches. At most one, since a failure is terminal.
    pub failed_batches: u64,
}

impl SchedulerStats {
    pub(crate) fn record_batch(&mut self, metrics: &BatchMetrics) {
        self.batches_run += 1;
        self.agents_decided += metrics.batch_size as u64;
        self.forward_calls += metrics.chunks as u64;
    }
}
