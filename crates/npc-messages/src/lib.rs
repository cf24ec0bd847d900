//! Shared message types for NPC task control.
//!
//! This crate contains pure data structures with no control logic: simulation
//! time, network-safe ids, map coordinates, and the request/response shapes
//! exchanged between controlling clients and the task controller.

pub mod coords;
pub mod ids;
pub mod messages;
pub mod time;

// Re-export time types
pub use time::SimTime;

// Re-export id types
pub use ids::{ControllerId, NetEntity, TaskId};

// Re-export coordinate types
pub use coords::{Coordinates, TilePos};

// Re-export message types
pub use messages::{
    ClientMessage, PassiveTaskMessage, PassiveTaskRemoveRequest, PassiveTaskRemovedMessage,
    PassiveTaskRequest, ServerMessage, TaskContextMenu, TaskFinishMessage, TaskInfo, TaskRequest,
    TaskSelect,
};
