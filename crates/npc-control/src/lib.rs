//! NPC Task Control
//!
//! Decides which task each controllable NPC performs: a data-driven task
//! catalog, declarative preconditions over world state and actor facts,
//! utility queries for autonomous target discovery, a controller that
//! assigns, tracks and finishes tasks, and routine/passive scheduling for
//! idle actors. The behavior runtime itself lives in the host and is reached
//! through [`BehaviorExecutor`].

pub mod blackboard;
pub mod catalog;
pub mod components;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod net;
pub mod orders;
pub mod preconditions;
pub mod query;
pub mod registry;
pub mod scheduler;
pub mod setup;
pub mod systems;
pub mod world_view;

pub use blackboard::{Blackboard, FactOverlay, FactSource, FactValue};
pub use catalog::{CatalogFormat, EntityWhitelist, TargetKind, TaskCatalog, TaskDefinition};
pub use config::ControllerConfig;
pub use controller::{ActiveTask, AssignmentOrigin, ControllerEvent, TaskController, TaskResolution};
pub use error::{CatalogError, ConfigError, TaskError};
pub use executor::{BehaviorExecutor, LogExecutor, RecordingExecutor};
pub use preconditions::{EvalContext, Precondition};
pub use query::{QueryContext, QueryFilter, QuerySource, UtilityQuery};
pub use registry::{ComponentRef, ComponentRegistry};
pub use world_view::{EcsWorldView, WorldView};
