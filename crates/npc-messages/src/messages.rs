//! Message Types
//!
//! Request/response shapes between controlling clients and the task
//! controller. Everything here is informational on the client side; the
//! controller never trusts a client message beyond the request it carries.

use serde::{Deserialize, Serialize};

use crate::{ControllerId, Coordinates, NetEntity, TaskId};

/// "These actors, act on this target / at these coordinates."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub requester: ControllerId,
    pub actors: Vec<NetEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<NetEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// A task picked from a [`TaskContextMenu`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSelect {
    pub requester: ControllerId,
    pub actors: Vec<NetEntity>,
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<NetEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// Mark targets as passive opportunities for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassiveTaskRequest {
    pub requester: ControllerId,
    pub task_id: TaskId,
    pub targets: Vec<NetEntity>,
}

/// Remove passive marks previously placed by the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassiveTaskRemoveRequest {
    pub requester: ControllerId,
    pub task_id: TaskId,
    pub targets: Vec<NetEntity>,
}

/// Messages sent by controlling clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    TaskRequest(TaskRequest),
    TaskSelect(TaskSelect),
    PassiveTaskRequest(PassiveTaskRequest),
    PassiveTaskRemoveRequest(PassiveTaskRemoveRequest),
}

impl ClientMessage {
    /// The user that sent this message
    pub fn requester(&self) -> ControllerId {
        match self {
            ClientMessage::TaskRequest(m) => m.requester,
            ClientMessage::TaskSelect(m) => m.requester,
            ClientMessage::PassiveTaskRequest(m) => m.requester,
            ClientMessage::PassiveTaskRemoveRequest(m) => m.requester,
        }
    }
}

/// Several tasks qualify; the client must pick one and answer with [`TaskSelect`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContextMenu {
    pub recipient: ControllerId,
    pub actors: Vec<NetEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<NetEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    pub options: Vec<TaskId>,
}

/// An actor's current task changed. `task_id == None` means the actor is idle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub recipient: ControllerId,
    pub actor: NetEntity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<NetEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// Acknowledges a [`PassiveTaskRequest`] with the targets actually marked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassiveTaskMessage {
    pub recipient: ControllerId,
    pub task_id: TaskId,
    pub targets: Vec<NetEntity>,
}

/// Acknowledges a [`PassiveTaskRemoveRequest`] with the targets actually unmarked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassiveTaskRemovedMessage {
    pub recipient: ControllerId,
    pub task_id: TaskId,
    pub targets: Vec<NetEntity>,
}

/// An actor finished (or abandoned) a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFinishMessage {
    pub recipient: ControllerId,
    pub task_id: TaskId,
    pub actor: NetEntity,
    pub failed: bool,
}

/// Messages sent by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    TaskContextMenu(TaskContextMenu),
    TaskInfo(TaskInfo),
    PassiveTaskMessage(PassiveTaskMessage),
    PassiveTaskRemovedMessage(PassiveTaskRemovedMessage),
    TaskFinishMessage(TaskFinishMessage),
}

impl ServerMessage {
    /// The user this message is addressed to
    pub fn recipient(&self) -> ControllerId {
        match self {
            ServerMessage::TaskContextMenu(m) => m.recipient,
            ServerMessage::TaskInfo(m) => m.recipient,
            ServerMessage::PassiveTaskMessage(m) => m.recipient,
            ServerMessage::PassiveTaskRemovedMessage(m) => m.recipient,
            ServerMessage::TaskFinishMessage(m) => m.recipient,
        }
    }
}
