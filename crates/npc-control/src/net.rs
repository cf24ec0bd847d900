//! Client message handling.
//!
//! Turns [`ClientMessage`]s into controller calls and controller events into
//! [`ServerMessage`]s. Every request passes the permission gate before any
//! state changes; requests that fail it are dropped without a reply.

use bevy_ecs::entity::Entity;
use npc_messages::{
    ClientMessage, ControllerId, Coordinates, NetEntity, PassiveTaskMessage,
    PassiveTaskRemoveRequest, PassiveTaskRemovedMessage, PassiveTaskRequest, ServerMessage,
    TaskContextMenu, TaskFinishMessage, TaskId, TaskInfo, TaskRequest, TaskSelect,
};

use crate::controller::{ControllerEvent, TaskController, TaskResolution};
use crate::orders::{plan_move_order, MoveOrderPlan};
use crate::world_view::WorldView;

pub fn to_net(entity: Entity) -> NetEntity {
    NetEntity(entity.to_bits())
}

/// `None` for values that are not a valid entity encoding
pub fn from_net(entity: NetEntity) -> Option<Entity> {
    Entity::try_from_bits(entity.0).ok()
}

/// Handles one client message and returns the direct replies. Task changes
/// caused by it show up later as controller events.
pub fn handle_client_message(
    controller: &mut TaskController,
    message: &ClientMessage,
    world: &dyn WorldView,
) -> Vec<ServerMessage> {
    match message {
        ClientMessage::TaskRequest(request) => handle_task_request(controller, request, world),
        ClientMessage::TaskSelect(select) => {
            handle_task_select(controller, select, world);
            Vec::new()
        }
        ClientMessage::PassiveTaskRequest(request) => handle_passive_request(controller, request, world),
        ClientMessage::PassiveTaskRemoveRequest(request) => handle_passive_remove(controller, request),
    }
}

/// Actors the requester may command, capped at the configured request size
fn permitted_actors(controller: &TaskController, requester: ControllerId, actors: &[NetEntity]) -> Vec<Entity> {
    let limit = controller.config().controller.max_actors_per_request;
    let mut permitted = Vec::new();
    for &net in actors.iter().take(limit) {
        let Some(actor) = from_net(net) else {
            tracing::debug!(%requester, actor = %net, "Undecodable actor");
            continue;
        };
        match controller.check_control(requester, actor) {
            Ok(()) if !permitted.contains(&actor) => permitted.push(actor),
            Ok(()) => {}
            Err(err) => tracing::debug!(actor = %net, %err, "Dropping actor from request"),
        }
    }
    permitted
}

/// Per-actor coordinates: a spread-out move order when several actors go
/// to bare coordinates, the requested coordinates otherwise.
fn destinations(
    controller: &TaskController,
    actors: &[Entity],
    target: Option<Entity>,
    coordinates: Option<Coordinates>,
    world: &dyn WorldView,
) -> Option<Vec<(Entity, Option<Coordinates>)>> {
    match (target, coordinates) {
        (None, Some(destination)) if actors.len() > 1 => {
            let MoveOrderPlan { slots, skipped } =
                match plan_move_order(actors, destination, &controller.config().move_orders, world) {
                    Ok(plan) => plan,
                    Err(err) => {
                        tracing::debug!(%err, "Move order rejected");
                        return None;
                    }
                };
            if !skipped.is_empty() {
                tracing::debug!(?skipped, "Actors left out of move order");
            }
            Some(slots.into_iter().map(|(a, c)| (a, Some(c))).collect())
        }
        _ => Some(actors.iter().map(|&a| (a, coordinates)).collect()),
    }
}

/// Resolves a target handle; a handle that does not decode drops the request
fn resolve_target(target: Option<NetEntity>) -> Result<Option<Entity>, ()> {
    match target {
        None => Ok(None),
        Some(net) => from_net(net).map(Some).ok_or(()),
    }
}

fn handle_task_request(
    controller: &mut TaskController,
    request: &TaskRequest,
    world: &dyn WorldView,
) -> Vec<ServerMessage> {
    let actors = permitted_actors(controller, request.requester, &request.actors);
    if actors.is_empty() {
        return Vec::new();
    }
    let Ok(target) = resolve_target(request.target) else {
        tracing::debug!(target = ?request.target, "Undecodable target");
        return Vec::new();
    };
    let Some(slots) = destinations(controller, &actors, target, request.coordinates, world) else {
        return Vec::new();
    };

    let mut resolved = Vec::with_capacity(slots.len());
    for (actor, coordinates) in slots {
        match controller.request_task(actor, target, coordinates, world) {
            Ok(resolution) => resolved.push((actor, coordinates, resolution)),
            Err(err) => tracing::debug!(?actor, %err, "Task request skipped"),
        }
    }

    let ambiguous = resolved
        .iter()
        .any(|(_, _, r)| matches!(r, TaskResolution::AmbiguousNeedsUI(_)));
    if ambiguous {
        let options = shared_options(resolved.iter().map(|(_, _, r)| r.options()));
        if options.is_empty() {
            return Vec::new();
        }
        return vec![ServerMessage::TaskContextMenu(TaskContextMenu {
            recipient: request.requester,
            actors: resolved.iter().map(|(a, _, _)| to_net(*a)).collect(),
            target: request.target,
            coordinates: request.coordinates,
            options,
        })];
    }

    for (actor, coordinates, resolution) in resolved {
        if let Some(task) = resolution.automatic() {
            if let Err(err) = controller.assign(actor, task, target, coordinates, world) {
                tracing::debug!(?actor, %task, %err, "Direct assignment failed");
            }
        }
    }
    Vec::new()
}

/// Tasks every actor could do, in the first actor's order
fn shared_options<'a>(mut lists: impl Iterator<Item = &'a [TaskId]>) -> Vec<TaskId> {
    let Some(first) = lists.next() else {
        return Vec::new();
    };
    let mut shared: Vec<TaskId> = first.to_vec();
    for list in lists {
        shared.retain(|id| list.contains(id));
    }
    shared
}

fn handle_task_select(controller: &mut TaskController, select: &TaskSelect, world: &dyn WorldView) {
    let actors = permitted_actors(controller, select.requester, &select.actors);
    if actors.is_empty() {
        return;
    }
    let Ok(target) = resolve_target(select.target) else {
        return;
    };
    let Some(slots) = destinations(controller, &actors, target, select.coordinates, world) else {
        return;
    };
    for (actor, coordinates) in slots {
        if let Err(err) = controller.assign(actor, &select.task_id, target, coordinates, world) {
            tracing::debug!(?actor, task = %select.task_id, %err, "Selected task not assigned");
        }
    }
}

fn handle_passive_request(
    controller: &mut TaskController,
    request: &PassiveTaskRequest,
    world: &dyn WorldView,
) -> Vec<ServerMessage> {
    if !controller.controls_any(request.requester) {
        tracing::debug!(requester = %request.requester, "Passive request from user without actors");
        return Vec::new();
    }
    let targets: Vec<Entity> = request.targets.iter().filter_map(|&t| from_net(t)).collect();
    match controller.mark_passive(request.requester, &request.task_id, &targets, world) {
        Ok(marked) => vec![ServerMessage::PassiveTaskMessage(PassiveTaskMessage {
            recipient: request.requester,
            task_id: request.task_id.clone(),
            targets: marked.into_iter().map(to_net).collect(),
        })],
        Err(err) => {
            tracing::debug!(task = %request.task_id, %err, "Passive request rejected");
            Vec::new()
        }
    }
}

fn handle_passive_remove(controller: &mut TaskController, request: &PassiveTaskRemoveRequest) -> Vec<ServerMessage> {
    let targets: Vec<Entity> = request.targets.iter().filter_map(|&t| from_net(t)).collect();
    let removed = controller.unmark_passive(request.requester, &request.task_id, &targets);
    vec![ServerMessage::PassiveTaskRemovedMessage(PassiveTaskRemovedMessage {
        recipient: request.requester,
        task_id: request.task_id.clone(),
        targets: removed.into_iter().map(to_net).collect(),
    })]
}

/// One message per recipient of the event.
pub fn event_messages(event: &ControllerEvent) -> Vec<ServerMessage> {
    match event {
        ControllerEvent::TaskChanged {
            actor,
            task_id,
            target,
            coordinates,
            recipients,
        } => recipients
            .iter()
            .map(|&recipient| {
                ServerMessage::TaskInfo(TaskInfo {
                    recipient,
                    actor: to_net(*actor),
                    task_id: task_id.clone(),
                    target: target.map(to_net),
                    coordinates: *coordinates,
                })
            })
            .collect(),
        ControllerEvent::TaskFinished {
            actor,
            task_id,
            failed,
            recipients,
        } => recipients
            .iter()
            .map(|&recipient| {
                ServerMessage::TaskFinishMessage(TaskFinishMessage {
                    recipient,
                    task_id: task_id.clone(),
                    actor: to_net(*actor),
                    failed: *failed,
                })
            })
            .collect(),
    }
}
