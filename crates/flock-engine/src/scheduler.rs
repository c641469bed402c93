//! The shared inference scheduler.
//!
//! [`InferenceScheduler`] owns one loaded model and one backend context.
//! Requesters buffer observations keyed by agent; a trigger runs one
//! batched inference pass over everything buffered and publishes a new
//! [`DecidedBatch`] that replaces the previous one.
//!
//! # Step cycle
//!
//! ```text
//! Idle ──buffer──▶ Accumulating ──run_batch──▶ BatchReady ──buffer──▶ Accumulating
//!                                    │
//!                                    └─ backend error ─▶ Failed (terminal)
//! ```
//!
//! Any state moves to `Disposed` on [`dispose()`](InferenceScheduler::dispose).
//!
//! # Concurrency
//!
//! All mutable state sits behind one mutex. A buffer call either lands in
//! the pending batch before a trigger snapshots it or after, never during.
//! The disposed flag is an atomic checked before taking the lock and again
//! under it, so no work starts once disposal has begun.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use flock_backend::{
    Backend, BatchInputs, BatchOutputs, BatchTensor, Device, ModelAsset, ModelHandle,
    ModelMetadata,
};
use flock_core::{
    ActionResult, AgentId, AgentObservation, BackendError, BatchInferenceError, BehaviorSpec,
    ModelId, ModelLoadError, ShapeMismatchError,
};
use smallvec::smallvec;
use thiserror::Error;

use crate::batch::{DecidedBatch, PendingBatch};
use crate::carry::AgentCarry;
use crate::config::SchedulerConfig;
use crate::decode::{ActionSelector, AgentOutputs};
use crate::metrics::{BatchMetrics, SchedulerStats};

// Compile-time assertion: schedulers are shared across simulation workers.
const _: () = {
    #[allow(dead_code)]
    fn assert_send_sync<T: Send + Sync>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send_sync::<InferenceScheduler>();
        assert_send_sync::<SchedulerHandle>();
    }
};

// ── SchedulerError ──────────────────────────────────────────────

/// Errors returned by scheduler operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The observation does not fit the scheduler's behavior spec. Only
    /// this submission is rejected.
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),
    /// This trigger's forward pass failed. The scheduler is now failed.
    #[error(transparent)]
    Inference(#[from] BatchInferenceError),
    /// An earlier forward pass failed; the scheduler accepts no more work.
    #[error("scheduler is failed: {0}")]
    Failed(BatchInferenceError),
    /// The scheduler has been disposed.
    #[error("scheduler has been disposed")]
    Disposed,
}

// ── SchedulerPhase ──────────────────────────────────────────────

/// Where a scheduler is in its step cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Nothing pending and no decisions published.
    Idle,
    /// Observations are buffered and waiting for a trigger.
    Accumulating,
    /// The last trigger's decisions are available; nothing new is pending.
    BatchReady,
    /// A forward pass failed. Terminal.
    Failed,
    /// Disposed. Terminal.
    Disposed,
}

/// Result of [`InferenceScheduler::run_batch()`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing was pending; the previous decisions are untouched.
    Skipped,
    /// Inference ran and a new decided batch was published.
    Ran(BatchMetrics),
}

// ── InferenceScheduler ──────────────────────────────────────────

struct SchedulerState {
    backend: Box<dyn Backend>,
    /// `None` once released by disposal.
    model: Option<ModelHandle>,
    pending: PendingBatch,
    decided: DecidedBatch,
    carry: AgentCarry,
    selector: ActionSelector,
    failure: Option<BatchInferenceError>,
    stats: SchedulerStats,
    last_metrics: Option<BatchMetrics>,
}

/// Batches observations from many agents through one shared model.
pub struct InferenceScheduler {
    model_id: ModelId,
    spec: BehaviorSpec,
    config: SchedulerConfig,
    metadata: ModelMetadata,
    backend_name: String,
    disposed: AtomicBool,
    state: Mutex<SchedulerState>,
}

impl InferenceScheduler {
    /// Load `asset` into `backend` and build a scheduler for `spec`.
    ///
    /// # Errors
    ///
    /// [`ModelLoadError`] if the spec or config is invalid, the backend
    /// rejects the model, or the model's inputs and outputs do not fit
    /// `spec`. On incompatibility the model is released before returning.
    pub fn new(
        asset: &ModelAsset,
        spec: BehaviorSpec,
        mut backend: Box<dyn Backend>,
        config: SchedulerConfig,
    ) -> Result<Self, ModelLoadError> {
        spec.validate()?;
        config
            .validate()
            .map_err(|e| ModelLoadError::InvalidConfig {
                reason: e.to_string(),
            })?;

        let model_id = asset.id();
        let loaded = backend
            .load_model(asset)
            .map_err(|source| ModelLoadError::Backend {
                model: model_id,
                source,
            })?;

        let failures = loaded.metadata.check_compatibility(&spec);
        if !failures.is_empty() {
            if let Err(e) = backend.release(loaded.handle) {
                tracing::warn!(model = %model_id, error = %e, "release after failed compatibility check");
            }
            return Err(ModelLoadError::Incompatible {
                model: model_id,
                failures,
            });
        }

        tracing::info!(
            model = %model_id,
            name = asset.name(),
            behavior = %spec.name,
            backend = backend.name(),
            device = %config.device,
            deterministic = config.deterministic,
            memory = loaded.metadata.memory_size,
            "inference scheduler created"
        );

        let backend_name = backend.name().to_owned();
        let selector = ActionSelector::new(&config);
        Ok(Self {
            model_id,
            spec,
            config,
            metadata: loaded.metadata,
            backend_name,
            disposed: AtomicBool::new(false),
            state: Mutex::new(SchedulerState {
                backend,
                model: Some(loaded.handle),
                pending: PendingBatch::new(),
                decided: DecidedBatch::new(),
                carry: AgentCarry::default(),
                selector,
                failure: None,
                stats: SchedulerStats::default(),
                last_metrics: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock and check that the scheduler still accepts work.
    fn lock_live(&self) -> Result<MutexGuard<'_, SchedulerState>, SchedulerError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(SchedulerError::Disposed);
        }
        let state = self.lock();
        if self.disposed.load(Ordering::Acquire) {
            return Err(SchedulerError::Disposed);
        }
        if let Some(err) = &state.failure {
            return Err(SchedulerError::Failed(err.clone()));
        }
        Ok(state)
    }

    /// Buffer `agent`'s observation for the next trigger, replacing any
    /// earlier observation for `agent` this step.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ShapeMismatch`] if `observation` does not fit the
    /// behavior spec (nothing is buffered), [`SchedulerError::Failed`] or
    /// [`SchedulerError::Disposed`] if the scheduler accepts no work.
    pub fn buffer_observation(
        &self,
        agent: AgentId,
        observation: AgentObservation,
    ) -> Result<(), SchedulerError> {
        let mut state = self.lock_live()?;
        if let Err(e) = self.spec.check_observation(&observation) {
            state.stats.rejected_submissions += 1;
            tracing::debug!(model = %self.model_id, agent = %agent, error = %e, "observation rejected");
            return Err(e.into());
        }
        if state.pending.insert(agent, observation) {
            state.stats.overwrites += 1;
        }
        state.stats.observations_buffered += 1;
        Ok(())
    }

    /// Take `agent` out of the current step: its pending observation and
    /// its decision from the latest batch are both dropped, so a read
    /// before the next trigger yields [`ActionResult::empty()`]. Carry
    /// state is kept. Returns whether anything was removed.
    pub fn withdraw(&self, agent: AgentId) -> bool {
        let mut state = self.lock();
        let pending = state.pending.remove(agent).is_some();
        let decided = state.decided.remove(agent).is_some();
        pending || decided
    }

    /// Drop everything held for `agent`, including recurrent memory and
    /// previous action. For agents that leave without a terminal step.
    pub fn forget_agent(&self, agent: AgentId) {
        let mut state = self.lock();
        state.pending.remove(agent);
        state.decided.remove(agent);
        state.carry.reset(agent);
    }

    /// Run one batched inference pass over everything buffered.
    ///
    /// A no-op returning [`BatchOutcome::Skipped`] when nothing is
    /// pending, so polling requesters never cause redundant passes.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Inference`] if the backend fails; the scheduler is
    /// then failed for good and publishes no decisions.
    /// [`SchedulerError::Failed`] or [`SchedulerError::Disposed`] if the
    /// scheduler accepts no work.
    pub fn run_batch(&self) -> Result<BatchOutcome, SchedulerError> {
        let mut state = self.lock_live()?;
        self.run_locked(&mut state)
    }

    /// A copy of `agent`'s most recent decision, or
    /// [`ActionResult::empty()`] if `agent` was not in the most recent
    /// batch. Never triggers inference.
    pub fn get_action(&self, agent: AgentId) -> ActionResult {
        self.lock().decided.get(agent)
    }

    /// Trigger if anything is pending, then return `agent`'s decision.
    ///
    /// Trigger and lookup happen under one lock, so a concurrent trigger
    /// cannot replace the batch in between.
    pub fn decide(&self, agent: AgentId) -> Result<ActionResult, SchedulerError> {
        let mut state = self.lock_live()?;
        self.run_locked(&mut state)?;
        Ok(state.decided.get(agent))
    }

    fn run_locked(&self, state: &mut SchedulerState) -> Result<BatchOutcome, SchedulerError> {
        if state.pending.is_empty() {
            state.stats.idempotent_skips += 1;
            tracing::trace!(model = %self.model_id, "run_batch skipped, nothing pending");
            return Ok(BatchOutcome::Skipped);
        }
        let Some(handle) = state.model else {
            return Err(SchedulerError::Disposed);
        };

        let start = Instant::now();
        let rows = state.pending.take();
        let mut metrics = BatchMetrics {
            batch_size: rows.len(),
            ..BatchMetrics::default()
        };

        match self.infer(state, handle, &rows, &mut metrics) {
            Ok(decided) => {
                state.decided = decided;
                metrics.total_us = start.elapsed().as_micros() as u64;
                state.stats.record_batch(&metrics);
                tracing::debug!(
                    model = %self.model_id,
                    agents = metrics.batch_size,
                    chunks = metrics.chunks,
                    forward_us = metrics.forward_us,
                    total_us = metrics.total_us,
                    "batch decided"
                );
                state.last_metrics = Some(metrics.clone());
                Ok(BatchOutcome::Ran(metrics))
            }
            Err(source) => {
                let err = BatchInferenceError {
                    model: self.model_id,
                    agent_count: rows.len(),
                    source,
                };
                tracing::error!(
                    model = %self.model_id,
                    backend = %self.backend_name,
                    error = %err,
                    "batch inference failed, scheduler disabled"
                );
                state.decided.clear();
                state.carry.clear();
                state.stats.failed_batches += 1;
                state.failure = Some(err.clone());
                Err(SchedulerError::Inference(err))
            }
        }
    }

    /// Run every chunk of `rows` and decode the results. Nothing is
    /// published unless every chunk succeeds.
    fn infer(
        &self,
        state: &mut SchedulerState,
        handle: ModelHandle,
        rows: &[(AgentId, AgentObservation)],
        metrics: &mut BatchMetrics,
    ) -> Result<DecidedBatch, BackendError> {
        let chunk_len = self.config.max_batch_size.unwrap_or(rows.len()).max(1);
        let mut decided = DecidedBatch::new();
        for chunk in rows.chunks(chunk_len) {
            let t = Instant::now();
            let inputs = self.assemble(&state.carry, chunk)?;
            metrics.assemble_us += t.elapsed().as_micros() as u64;

            let t = Instant::now();
            let outputs = state.backend.forward(handle, &inputs)?;
            outputs.check(chunk.len(), &self.metadata)?;
            metrics.forward_us += t.elapsed().as_micros() as u64;
            metrics.chunks += 1;

            let t = Instant::now();
            self.decode(state, chunk, &outputs, &mut decided);
            metrics.decode_us += t.elapsed().as_micros() as u64;
        }
        Ok(decided)
    }

    /// Build batched input tensors, rows in `chunk` order.
    fn assemble(
        &self,
        carry: &AgentCarry,
        chunk: &[(AgentId, AgentObservation)],
    ) -> Result<BatchInputs, BackendError> {
        let n = chunk.len();
        let sensors = self
            .metadata
            .sensor_shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| {
                BatchTensor::from_rows(shape, chunk.iter().map(|(_, obs)| obs.sensors[i].as_slice()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let m = self.metadata.memory_size;
        let memory = if m > 0 {
            let mut data = Vec::with_capacity(n * m);
            for (agent, _) in chunk {
                carry.write_memory(*agent, m, &mut data);
            }
            Some(BatchTensor::new(smallvec![n, m], data)?)
        } else {
            None
        };

        let branches = self.metadata.discrete_branches.len();
        let previous_action = if self.metadata.uses_previous_action {
            let mut data = Vec::with_capacity(n * branches);
            for (agent, _) in chunk {
                carry.write_previous_action(*agent, branches, &mut data);
            }
            Some(BatchTensor::new(smallvec![n, branches], data)?)
        } else {
            None
        };

        Ok(BatchInputs {
            sensors,
            memory,
            previous_action,
        })
    }

    fn decode(
        &self,
        state: &mut SchedulerState,
        chunk: &[(AgentId, AgentObservation)],
        outputs: &BatchOutputs,
        decided: &mut DecidedBatch,
    ) {
        for (r, (agent, obs)) in chunk.iter().enumerate() {
            let action = state.selector.select(
                &self.spec.actions,
                AgentOutputs {
                    mean: outputs.continuous_mean.row(r).unwrap_or(&[]),
                    log_std: outputs.continuous_log_std.as_ref().and_then(|t| t.row(r)),
                    logits: outputs.discrete_logits.row(r).unwrap_or(&[]),
                    mask: obs.action_mask.as_ref(),
                },
            );
            let memory = if self.metadata.memory_size > 0 {
                outputs.memory.as_ref().and_then(|t| t.row(r))
            } else {
                None
            };
            let previous = self.metadata.uses_previous_action.then_some(action.discrete());
            state.carry.update(*agent, obs.done, memory, previous);
            decided.insert(*agent, action);
        }
    }

    /// Release the backend model and stop accepting work. Idempotent.
    ///
    /// A trigger already holding the lock finishes first and is the last
    /// forward pass this scheduler executes.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.lock();
        let state = &mut *state;
        if let Some(handle) = state.model.take() {
            if let Err(e) = state.backend.release(handle) {
                tracing::warn!(model = %self.model_id, error = %e, "model release failed");
            }
        }
        state.pending.clear();
        state.decided.clear();
        state.carry.clear();
        tracing::info!(
            model = %self.model_id,
            behavior = %self.spec.name,
            batches = state.stats.batches_run,
            "inference scheduler disposed"
        );
    }

    /// Current step-cycle phase.
    pub fn phase(&self) -> SchedulerPhase {
        if self.disposed.load(Ordering::Acquire) {
            return SchedulerPhase::Disposed;
        }
        let state = self.lock();
        if state.failure.is_some() {
            SchedulerPhase::Failed
        } else if !state.pending.is_empty() {
            SchedulerPhase::Accumulating
        } else if !state.decided.is_empty() {
            SchedulerPhase::BatchReady
        } else {
            SchedulerPhase::Idle
        }
    }

    /// Number of agents buffered for the next trigger.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of agents with a decision from the most recent trigger.
    pub fn decided_len(&self) -> usize {
        self.lock().decided.len()
    }

    /// The error that failed this scheduler, if any.
    pub fn failure(&self) -> Option<BatchInferenceError> {
        self.lock().failure.clone()
    }

    /// Whether [`dispose()`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Cumulative counters.
    pub fn stats(&self) -> SchedulerStats {
        self.lock().stats.clone()
    }

    /// Metrics of the most recent executed batch.
    pub fn last_metrics(&self) -> Option<BatchMetrics> {
        self.lock().last_metrics.clone()
    }

    /// Fingerprint of the loaded model.
    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    /// Behavior this scheduler decides for.
    pub fn spec(&self) -> &BehaviorSpec {
        &self.spec
    }

    /// Construction-time configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Execution device.
    pub fn device(&self) -> Device {
        self.config.device
    }

    /// What the loaded model consumes and produces.
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

impl Drop for InferenceScheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for InferenceScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceScheduler")
            .field("model_id", &self.model_id)
            .field("behavior", &self.spec.name)
            .field("backend", &self.backend_name)
            .field("config", &self.config)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

// ── SchedulerHandle ─────────────────────────────────────────────

/// Shared reference to a scheduler. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SchedulerHandle(Arc<InferenceScheduler>);

impl SchedulerHandle {
    /// Wrap a scheduler for sharing.
    pub fn new(scheduler: InferenceScheduler) -> Self {
        Self(Arc::new(scheduler))
    }

    /// Whether both handles refer to the same scheduler instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for SchedulerHandle {
    type Target = InferenceScheduler;

    fn deref(&self) -> &InferenceScheduler {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flock_test_utils::{fixtures, MockBackend};

    fn scheduler(spec: BehaviorSpec, config: SchedulerConfig) -> (InferenceScheduler, MockBackend) {
        let backend = MockBackend::new();
        let probe = backend.clone();
        let s = InferenceScheduler::new(&fixtures::model_asset(&spec), spec, Box::new(backend), config)
            .unwrap();
        (s, probe)
    }

    fn deterministic() -> SchedulerConfig {
        SchedulerConfig::deterministic(Device::CpuVectorized)
    }

    #[test]
    fn single_agent_continuous_scenario() {
        let (s, _) = scheduler(fixtures::continuous_spec(3, 2), deterministic());
        s.buffer_observation(AgentId(7), fixtures::vector_obs(&[1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(s.phase(), SchedulerPhase::Accumulating);
        assert!(matches!(s.run_batch(), Ok(BatchOutcome::Ran(_))));
        assert_eq!(s.phase(), SchedulerPhase::BatchReady);
        assert_eq!(s.get_action(AgentId(7)).continuous().len(), 2);
        assert!(s.get_action(AgentId(8)).is_empty());
    }

    #[test]
    fn two_agents_share_one_forward_call() {
        let (s, probe) = scheduler(fixtures::continuous_spec(2, 2), deterministic());
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[1.0, 0.0]))
            .unwrap();
        s.buffer_observation(AgentId(2), fixtures::vector_obs(&[5.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        assert_eq!(probe.forward_calls(), 1);
        assert_eq!(probe.batch_sizes(), vec![2]);
        // mock echoes the first sensor value into every continuous slot
        assert_eq!(s.get_action(AgentId(1)).continuous(), &[1.0, 1.0]);
        assert_eq!(s.get_action(AgentId(2)).continuous(), &[5.0, 5.0]);
    }

    #[test]
    fn run_batch_without_new_observations_is_a_no_op() {
        let (s, probe) = scheduler(fixtures::continuous_spec(2, 1), deterministic());
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[3.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        let first = s.get_action(AgentId(1));
        assert_eq!(s.run_batch(), Ok(BatchOutcome::Skipped));
        assert_eq!(s.get_action(AgentId(1)), first);
        assert_eq!(probe.forward_calls(), 1);
        assert_eq!(s.stats().idempotent_skips, 1);
    }

    #[test]
    fn new_batch_replaces_previous_decisions() {
        let (s, _) = scheduler(fixtures::continuous_spec(2, 1), deterministic());
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[1.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        s.buffer_observation(AgentId(2), fixtures::vector_obs(&[2.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        assert!(s.get_action(AgentId(1)).is_empty());
        assert_eq!(s.get_action(AgentId(2)).continuous(), &[2.0]);
    }

    #[test]
    fn shape_mismatch_rejects_only_that_submission() {
        let (s, _) = scheduler(fixtures::continuous_spec(2, 1), deterministic());
        let err = s
            .buffer_observation(AgentId(1), fixtures::vector_obs(&[1.0]))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ShapeMismatch(_)));
        assert_eq!(s.pending_len(), 0);
        s.buffer_observation(AgentId(2), fixtures::vector_obs(&[1.0, 1.0]))
            .unwrap();
        assert!(s.run_batch().is_ok());
        assert_eq!(s.stats().rejected_submissions, 1);
    }

    #[test]
    fn backend_failure_is_terminal() {
        let (s, probe) = scheduler(fixtures::continuous_spec(2, 1), deterministic());
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[1.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        probe.fail_next_forward("device lost");
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[2.0, 0.0]))
            .unwrap();
        match s.run_batch() {
            Err(SchedulerError::Inference(e)) => {
                assert_eq!(e.agent_count, 1);
                assert_eq!(e.model, s.model_id());
            }
            other => panic!("expected inference error, got {other:?}"),
        }
        assert_eq!(s.phase(), SchedulerPhase::Failed);
        assert!(s.get_action(AgentId(1)).is_empty());
        assert!(matches!(
            s.buffer_observation(AgentId(1), fixtures::vector_obs(&[2.0, 0.0])),
            Err(SchedulerError::Failed(_))
        ));
        assert!(matches!(s.run_batch(), Err(SchedulerError::Failed(_))));
    }

    #[test]
    fn malformed_output_fails_the_batch() {
        let (s, probe) = scheduler(fixtures::continuous_spec(2, 2), deterministic());
        probe.truncate_outputs(true);
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[1.0, 0.0]))
            .unwrap();
        match s.run_batch() {
            Err(SchedulerError::Inference(e)) => {
                assert!(matches!(e.source, BackendError::MalformedOutput { .. }))
            }
            other => panic!("expected malformed output, got {other:?}"),
        }
    }

    #[test]
    fn max_batch_size_splits_forward_calls() {
        let config = SchedulerConfig {
            max_batch_size: Some(2),
            ..deterministic()
        };
        let (s, probe) = scheduler(fixtures::continuous_spec(2, 1), config);
        for id in 0..5u64 {
            s.buffer_observation(AgentId(id), fixtures::vector_obs(&[id as f32, 0.0]))
                .unwrap();
        }
        let Ok(BatchOutcome::Ran(m)) = s.run_batch() else {
            panic!("batch did not run");
        };
        assert_eq!(m.chunks, 3);
        assert_eq!(probe.batch_sizes(), vec![2, 2, 1]);
        for id in 0..5u64 {
            assert_eq!(s.get_action(AgentId(id)).continuous(), &[id as f32]);
        }
    }

    #[test]
    fn decide_triggers_and_reads_atomically() {
        let (s, probe) = scheduler(fixtures::continuous_spec(2, 1), deterministic());
        s.buffer_observation(AgentId(4), fixtures::vector_obs(&[4.0, 0.0]))
            .unwrap();
        assert_eq!(s.decide(AgentId(4)).unwrap().continuous(), &[4.0]);
        assert_eq!(s.decide(AgentId(4)).unwrap().continuous(), &[4.0]);
        assert_eq!(probe.forward_calls(), 1);
    }

    #[test]
    fn dispose_releases_model_and_rejects_work() {
        let (s, probe) = scheduler(fixtures::continuous_spec(2, 1), deterministic());
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[1.0, 0.0]))
            .unwrap();
        s.dispose();
        s.dispose();
        assert_eq!(probe.released(), 1);
        assert_eq!(s.phase(), SchedulerPhase::Disposed);
        assert_eq!(s.pending_len(), 0);
        assert_eq!(
            s.buffer_observation(AgentId(1), fixtures::vector_obs(&[1.0, 0.0])),
            Err(SchedulerError::Disposed)
        );
        assert_eq!(s.run_batch(), Err(SchedulerError::Disposed));
    }

    #[test]
    fn drop_releases_model() {
        let (s, probe) = scheduler(fixtures::continuous_spec(2, 1), deterministic());
        drop(s);
        assert_eq!(probe.released(), 1);
    }

    #[test]
    fn incompatible_model_is_released_and_reported() {
        let backend = MockBackend::with_metadata(ModelMetadata {
            sensor_shapes: vec![smallvec![5]],
            continuous_size: 3,
            ..ModelMetadata::default()
        });
        let probe = backend.clone();
        let spec = fixtures::continuous_spec(2, 1);
        let err = InferenceScheduler::new(
            &fixtures::model_asset(&spec),
            spec,
            Box::new(backend),
            deterministic(),
        )
        .unwrap_err();
        match err {
            ModelLoadError::Incompatible { failures, .. } => assert_eq!(failures.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(probe.released(), 1);
    }

    #[test]
    fn invalid_config_never_loads() {
        let backend = MockBackend::new();
        let probe = backend.clone();
        let config = SchedulerConfig {
            max_batch_size: Some(0),
            ..SchedulerConfig::default()
        };
        let spec = fixtures::continuous_spec(2, 1);
        let err = InferenceScheduler::new(
            &fixtures::model_asset(&spec),
            spec,
            Box::new(backend),
            config,
        )
        .unwrap_err();
        assert!(matches!(err, ModelLoadError::InvalidConfig { .. }));
        assert_eq!(probe.loads(), 0);
    }

    #[test]
    fn recurrent_memory_resets_on_terminal() {
        let backend = MockBackend::recurrent(1);
        let probe = backend.clone();
        let spec = fixtures::continuous_spec(2, 1);
        let s = InferenceScheduler::new(
            &fixtures::model_asset(&spec),
            spec,
            Box::new(backend),
            deterministic(),
        )
        .unwrap();
        // mock writes memory = previous memory + first sensor value
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[2.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[3.0, 0.0]).terminal())
            .unwrap();
        s.run_batch().unwrap();
        assert_eq!(probe.last_memory_input(), vec![2.0]);
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[1.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        assert_eq!(probe.last_memory_input(), vec![0.0]);
    }

    #[test]
    fn feed_forward_model_tracks_no_carry() {
        let (s, _) = scheduler(fixtures::hybrid_spec(2, 1, &[3]), deterministic());
        for step in 0..20u64 {
            for i in 0..10u64 {
                s.buffer_observation(AgentId(step * 10 + i), fixtures::vector_obs(&[1.0, 0.0]))
                    .unwrap();
            }
            s.run_batch().unwrap();
        }
        assert_eq!(s.decided_len(), 10);
        assert_eq!(s.lock().carry.tracked_agents(), 0);
    }

    #[test]
    fn previous_action_tracked_only_when_consumed() {
        let spec = fixtures::discrete_spec(2, &[3]);
        let backend = MockBackend::with_metadata(ModelMetadata {
            uses_previous_action: true,
            ..ModelMetadata::for_spec(&spec)
        });
        let s = InferenceScheduler::new(
            &fixtures::model_asset(&spec),
            spec,
            Box::new(backend),
            deterministic(),
        )
        .unwrap();
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[2.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        assert_eq!(s.get_action(AgentId(1)).discrete(), &[2]);
        assert_eq!(s.lock().carry.tracked_agents(), 1);
    }

    #[test]
    fn withdraw_hides_latest_decision() {
        let (s, probe) = scheduler(fixtures::continuous_spec(2, 1), deterministic());
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[1.0, 0.0]))
            .unwrap();
        s.buffer_observation(AgentId(2), fixtures::vector_obs(&[2.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        assert!(s.withdraw(AgentId(1)));
        assert!(!s.withdraw(AgentId(1)));
        assert!(s.get_action(AgentId(1)).is_empty());
        assert_eq!(s.get_action(AgentId(2)).continuous(), &[2.0]);
        assert_eq!(s.decide(AgentId(1)), Ok(ActionResult::empty()));
        assert_eq!(probe.forward_calls(), 1);
    }

    #[test]
    fn forget_agent_evicts_memory() {
        let backend = MockBackend::recurrent(1);
        let probe = backend.clone();
        let spec = fixtures::continuous_spec(2, 1);
        let s = InferenceScheduler::new(
            &fixtures::model_asset(&spec),
            spec,
            Box::new(backend),
            deterministic(),
        )
        .unwrap();
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[2.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        assert_eq!(s.lock().carry.tracked_agents(), 1);

        s.forget_agent(AgentId(1));
        assert_eq!(s.lock().carry.tracked_agents(), 0);
        assert!(s.get_action(AgentId(1)).is_empty());
        s.buffer_observation(AgentId(1), fixtures::vector_obs(&[1.0, 0.0]))
            .unwrap();
        s.run_batch().unwrap();
        assert_eq!(probe.last_memory_input(), vec![0.0]);
    }
}
