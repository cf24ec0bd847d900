//! ECS Components
//!
//! Host-side components the controller reads: control ownership, tags,
//! positions, mob/health state, construction progress, routine lists.

pub mod actor;
pub mod world;

pub use actor::*;
pub use world::*;
