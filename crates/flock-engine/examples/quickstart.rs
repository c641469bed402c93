//! A small flock of agents deciding through one shared scheduler.
//!
//! Run with `RUST_LOG=flock_engine=debug` to see batch timings.

use std::thread;

use crossbeam_channel::unbounded;
use flock_backend::{DenseModel, DenseProvider, Device, ModelMetadata};
use flock_core::{ActionSpec, AgentId, AgentObservation, BehaviorSpec, ObservationSpec};
use flock_engine::{RegistryConfig, SchedulerRegistry};
use tracing_subscriber::EnvFilter;

const AGENTS: u64 = 64;
const WORKERS: u64 = 4;
const STEPS: u64 = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let spec = BehaviorSpec::new(
        "boid",
        ObservationSpec::vector(4),
        ActionSpec::hybrid(2, &[3]),
    );
    let mut meta = ModelMetadata::for_spec(&spec);
    meta.has_log_std = true;
    let mut model = DenseModel::zeros(meta);
    // steer toward the observed heading
    for k in 0..2 {
        if let Some(w) = model.weight_mut(k, k) {
            *w = 1.0;
        }
    }
    let asset = model.to_asset("boid-policy");

    let registry = SchedulerRegistry::new(DenseProvider, RegistryConfig::default())?;
    let policy = registry.requester(&asset, &spec, Device::GpuCompute, false)?;

    for step in 0..STEPS {
        let (tx, rx) = unbounded();
        thread::scope(|s| {
            for w in 0..WORKERS {
                let tx = tx.clone();
                let policy = &policy;
                s.spawn(move || {
                    for id in (w..AGENTS).step_by(WORKERS as usize) {
                        let phase = (id + step) as f32 * 0.1;
                        let obs = AgentObservation::new(vec![vec![phase.cos(), phase.sin(), 0.0, 1.0]]);
                        tx.send(policy.submit_observation(AgentId(id), obs)).ok();
                    }
                });
            }
        });
        drop(tx);
        let rejected = rx.iter().filter(Result::is_err).count();

        let first = policy.decide_action(AgentId(0))?;
        let stats = policy.scheduler().map(|s| s.stats()).unwrap_or_default();
        println!(
            "step {step}: agent 0 -> continuous {:?} discrete {:?} ({} rejected, {} batches)",
            first.continuous(),
            first.discrete(),
            rejected,
            stats.batches_run
        );
    }

    registry.dispose_all();
    Ok(())
}
