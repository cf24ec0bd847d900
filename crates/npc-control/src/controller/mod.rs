//! Task Assignment Controller
//!
//! Owns every piece of mutable task state: per-actor task records and fact
//! stores, the per-target performer index, passive marks, and failure
//! cooldowns. All of it lives in one [`TaskController`] per world, stored as
//! an ECS resource and driven from exclusive systems.
//!
//! Per actor the state machine is `Idle -> Assigned -> Finished -> Idle`.
//! Whether the host executor is planning or executing is its own business;
//! the controller only knows whether a task is active.

mod assign;
mod index;
mod tick;

pub use assign::TaskResolution;
pub use index::TaskAssignmentIndex;

use bevy_ecs::prelude::*;
use npc_messages::{ControllerId, Coordinates, SimTime, TaskId};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::blackboard::Blackboard;
use crate::catalog::{TaskCatalog, TaskDefinition};
use crate::config::ControllerConfig;
use crate::error::{CatalogError, TaskError};
use crate::executor::BehaviorExecutor;
use crate::registry::ComponentRegistry;
use crate::scheduler::PassiveMarks;

/// How an assignment came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOrigin {
    /// Ordered by a controlling user
    Order,
    /// Picked from the actor's routine list
    Routine { finish_on_failed: bool },
}

/// The task an actor is currently performing.
///
/// Everything needed to clean up is copied in at assignment, so finishing
/// still works after the definition vanishes in a catalog reload.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTask {
    pub task_id: TaskId,
    pub target: Option<Entity>,
    pub coordinates: Option<Coordinates>,
    pub origin: AssignmentOrigin,
    pub started_at: SimTime,
    target_key: String,
    coordinates_key: String,
    delete_keys_on_finish: bool,
    on_finish_task: Option<String>,
    fail_cooldown: Duration,
    fail_await_time: Duration,
    last_finish_check: SimTime,
    plan_failed_deadline: Option<SimTime>,
}

impl ActiveTask {
    fn new(
        def: &TaskDefinition,
        target: Option<Entity>,
        coordinates: Option<Coordinates>,
        origin: AssignmentOrigin,
        now: SimTime,
    ) -> Self {
        Self {
            task_id: def.id.clone(),
            target,
            coordinates,
            origin,
            started_at: now,
            target_key: def.target_key.clone(),
            coordinates_key: def.target_coordinates_key.clone(),
            delete_keys_on_finish: def.delete_keys_on_finish,
            on_finish_task: def.on_finish_task.clone(),
            fail_cooldown: def.fail_cooldown(),
            fail_await_time: def.fail_await_time(),
            last_finish_check: now,
            plan_failed_deadline: None,
        }
    }

    /// When a pending plan failure turns into a task failure
    pub fn plan_failed_deadline(&self) -> Option<SimTime> {
        self.plan_failed_deadline
    }
}

/// Per-actor record.
#[derive(Debug, Clone)]
pub struct ActorTaskState {
    pub controllers: Vec<ControllerId>,
    pub active: Option<ActiveTask>,
    pub blackboard: Blackboard,
    next_routine_scan: SimTime,
}

impl ActorTaskState {
    fn new(actor: Entity, controllers: Vec<ControllerId>) -> Self {
        Self {
            controllers,
            active: None,
            blackboard: Blackboard::for_actor(actor),
            next_routine_scan: SimTime::ZERO,
        }
    }
}

/// Something clients should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The actor's task changed; `task_id == None` means idle
    TaskChanged {
        actor: Entity,
        task_id: Option<TaskId>,
        target: Option<Entity>,
        coordinates: Option<Coordinates>,
        recipients: Vec<ControllerId>,
    },
    TaskFinished {
        actor: Entity,
        task_id: TaskId,
        failed: bool,
        recipients: Vec<ControllerId>,
    },
}

/// Resource: all task assignment state for one world.
#[derive(Resource)]
pub struct TaskController {
    catalog: TaskCatalog,
    config: ControllerConfig,
    executor: Box<dyn BehaviorExecutor>,
    actors: BTreeMap<Entity, ActorTaskState>,
    index: TaskAssignmentIndex,
    pub(crate) passive: PassiveMarks,
    /// Autonomous selection blocked until the stored time
    cooldowns: HashMap<(Entity, TaskId), SimTime>,
    /// Routine entries held back after a failure
    routine_holds: HashMap<(Entity, TaskId), SimTime>,
    now: SimTime,
    events: Vec<ControllerEvent>,
}

impl TaskController {
    pub fn new(
        catalog: TaskCatalog,
        config: ControllerConfig,
        executor: Box<dyn BehaviorExecutor>,
    ) -> Self {
        Self {
            catalog,
            config,
            executor,
            actors: BTreeMap::new(),
            index: TaskAssignmentIndex::default(),
            passive: PassiveMarks::default(),
            cooldowns: HashMap::new(),
            routine_holds: HashMap::new(),
            now: SimTime::ZERO,
            events: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Moves the controller clock forward without running checks.
    pub fn set_time(&mut self, now: SimTime) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Swaps in new definitions. Active tasks whose id disappeared, and
    /// performers beyond a lowered `max_performers`, are failed on the next
    /// tick.
    pub fn reload_catalog(
        &mut self,
        definitions: Vec<TaskDefinition>,
        registry: &ComponentRegistry,
    ) -> Result<(), CatalogError> {
        self.catalog.reload(definitions, registry)
    }

    // ---- actor lifecycle ----

    /// Makes an actor controllable, or replaces its controller list.
    pub fn register_actor(&mut self, actor: Entity, controllers: Vec<ControllerId>) {
        match self.actors.get_mut(&actor) {
            Some(state) => state.controllers = controllers,
            None => {
                tracing::debug!(?actor, ?controllers, "Registered actor");
                self.actors
                    .insert(actor, ActorTaskState::new(actor, controllers));
            }
        }
    }

    /// Fails the actor's task and forgets the actor.
    pub fn unregister_actor(&mut self, actor: Entity) {
        if !self.actors.contains_key(&actor) {
            return;
        }
        self.finish(actor, true);
        self.actors.remove(&actor);
        self.cooldowns.retain(|(a, _), _| *a != actor);
        self.routine_holds.retain(|(a, _), _| *a != actor);
        tracing::debug!(?actor, "Unregistered actor");
    }

    pub fn is_registered(&self, actor: Entity) -> bool {
        self.actors.contains_key(&actor)
    }

    pub fn grant_control(&mut self, actor: Entity, controller: ControllerId) -> Result<(), TaskError> {
        let state = self.actors.get_mut(&actor).ok_or(TaskError::UnknownActor)?;
        if !state.controllers.contains(&controller) {
            state.controllers.push(controller);
        }
        Ok(())
    }

    pub fn revoke_control(&mut self, actor: Entity, controller: ControllerId) -> Result<(), TaskError> {
        let state = self.actors.get_mut(&actor).ok_or(TaskError::UnknownActor)?;
        state.controllers.retain(|c| *c != controller);
        Ok(())
    }

    pub fn can_control(&self, controller: ControllerId, actor: Entity) -> bool {
        self.actors
            .get(&actor)
            .is_some_and(|s| s.controllers.contains(&controller))
    }

    /// [`can_control`](Self::can_control) as a `Result`
    pub fn check_control(&self, controller: ControllerId, actor: Entity) -> Result<(), TaskError> {
        if self.can_control(controller, actor) {
            Ok(())
        } else {
            Err(TaskError::PermissionDenied(controller))
        }
    }

    /// Whether the user controls at least one actor
    pub fn controls_any(&self, controller: ControllerId) -> bool {
        self.actors
            .values()
            .any(|s| s.controllers.contains(&controller))
    }

    pub fn controllers_of(&self, actor: Entity) -> &[ControllerId] {
        self.actors
            .get(&actor)
            .map(|s| s.controllers.as_slice())
            .unwrap_or_default()
    }

    pub fn actors(&self) -> impl Iterator<Item = Entity> + '_ {
        self.actors.keys().copied()
    }

    // ---- observation ----

    pub fn current_task(&self, actor: Entity) -> Option<&ActiveTask> {
        self.actors.get(&actor).and_then(|s| s.active.as_ref())
    }

    pub fn is_idle(&self, actor: Entity) -> bool {
        self.current_task(actor).is_none()
    }

    pub fn blackboard(&self, actor: Entity) -> Option<&Blackboard> {
        self.actors.get(&actor).map(|s| &s.blackboard)
    }

    pub fn blackboard_mut(&mut self, actor: Entity) -> Option<&mut Blackboard> {
        self.actors.get_mut(&actor).map(|s| &mut s.blackboard)
    }

    pub fn index(&self) -> &TaskAssignmentIndex {
        &self.index
    }

    pub fn performers(&self, target: Entity, task: &TaskId) -> usize {
        self.index.performers(target, task).len()
    }

    pub fn passive_marks(&self) -> &PassiveMarks {
        &self.passive
    }

    /// Whether autonomous selection of `task` is blocked for `actor`
    pub fn on_cooldown(&self, actor: Entity, task: &TaskId) -> bool {
        let key = (actor, task.clone());
        let blocked = |until: Option<&SimTime>| until.is_some_and(|&t| self.now < t);
        blocked(self.cooldowns.get(&key)) || blocked(self.routine_holds.get(&key))
    }

    /// Takes the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- executor signals ----

    /// The executor could not find a plan. The first report arms the
    /// task's fail-await timer; later ones leave it alone.
    pub fn report_plan_failed(&mut self, actor: Entity, now: SimTime) {
        self.set_time(now);
        if let Some(active) = self.actors.get_mut(&actor).and_then(|s| s.active.as_mut()) {
            if active.plan_failed_deadline.is_none() {
                let deadline = now + active.fail_await_time;
                tracing::debug!(?actor, task = %active.task_id, %deadline, "Plan failed, awaiting replan");
                active.plan_failed_deadline = Some(deadline);
            }
        }
    }

    /// The executor has a plan again; disarms the fail-await timer.
    pub fn report_plan_started(&mut self, actor: Entity) {
        if let Some(active) = self.actors.get_mut(&actor).and_then(|s| s.active.as_mut()) {
            active.plan_failed_deadline = None;
        }
    }

    /// Claims the actor's routine scan slot if it is due, pushing the next
    /// one back by the configured interval.
    pub(crate) fn take_routine_scan(&mut self, actor: Entity) -> bool {
        let now = self.now;
        let interval = self.config.routine.scan_interval();
        match self.actors.get_mut(&actor) {
            Some(state) if state.active.is_none() && now >= state.next_routine_scan => {
                state.next_routine_scan = now + interval;
                true
            }
            _ => false,
        }
    }

    fn push_task_changed(&mut self, actor: Entity) {
        if !self.config.controller.broadcast_task_info {
            return;
        }
        let Some(state) = self.actors.get(&actor) else {
            return;
        };
        let active = state.active.as_ref();
        self.events.push(ControllerEvent::TaskChanged {
            actor,
            task_id: active.map(|a| a.task_id.clone()),
            target: active.and_then(|a| a.target),
            coordinates: active.and_then(|a| a.coordinates),
            recipients: state.controllers.clone(),
        });
    }
}
