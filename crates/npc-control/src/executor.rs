//! Behavior Executor
//!
//! The behavior-tree / HTN runtime lives in the host. The controller only
//! starts and stops trees through [`BehaviorExecutor`] and hears back through
//! `report_plan_failed` / `report_plan_started`.

use bevy_ecs::entity::Entity;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::blackboard::Blackboard;

/// Host behavior-tree runtime.
pub trait BehaviorExecutor: Send + Sync {
    /// Begin running `tree` for `actor` with the given facts.
    fn start(&mut self, actor: Entity, tree: &str, facts: &Blackboard);

    /// Abandon whatever `actor` is running. No-op when idle.
    fn stop(&mut self, actor: Entity);

    /// Run a completion tree synchronously; it may update the facts.
    fn run_to_completion(&mut self, actor: Entity, tree: &str, facts: &mut Blackboard);
}

/// A call the controller made on the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorCall {
    Start { actor: Entity, tree: String },
    Stop { actor: Entity },
    Complete { actor: Entity, tree: String },
}

/// Executor that only records calls. Clones share the same record, so a
/// test can keep a handle after boxing one into the controller.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<ExecutorCall>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExecutorCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.lock().clone()
    }

    /// Trees started for `actor`, oldest first
    pub fn started(&self, actor: Entity) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                ExecutorCall::Start { actor: a, tree } if *a == actor => Some(tree.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl BehaviorExecutor for RecordingExecutor {
    fn start(&mut self, actor: Entity, tree: &str, _facts: &Blackboard) {
        tracing::debug!(?actor, tree, "Executor start");
        self.lock().push(ExecutorCall::Start {
            actor,
            tree: tree.to_string(),
        });
    }

    fn stop(&mut self, actor: Entity) {
        tracing::debug!(?actor, "Executor stop");
        self.lock().push(ExecutorCall::Stop { actor });
    }

    fn run_to_completion(&mut self, actor: Entity, tree: &str, _facts: &mut Blackboard) {
        tracing::debug!(?actor, tree, "Executor completion tree");
        self.lock().push(ExecutorCall::Complete {
            actor,
            tree: tree.to_string(),
        });
    }
}

/// Executor for hosts without a behavior runtime: logs calls and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExecutor;

impl BehaviorExecutor for LogExecutor {
    fn start(&mut self, actor: Entity, tree: &str, facts: &Blackboard) {
        tracing::info!(?actor, tree, facts = facts.len(), "Starting behavior");
    }

    fn stop(&mut self, actor: Entity) {
        tracing::debug!(?actor, "Stopping behavior");
    }

    fn run_to_completion(&mut self, actor: Entity, tree: &str, _facts: &mut Blackboard) {
        tracing::info!(?actor, tree, "Running completion behavior");
    }
}
