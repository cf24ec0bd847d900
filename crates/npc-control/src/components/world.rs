//! World Components
//!
//! What the controller can observe about any entity: where it is, what it is
//! tagged with, whether it is alive or bleeding, and how far along a
//! construction is.

use bevy_ecs::prelude::*;
use npc_messages::Coordinates;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// World position of an entity
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position(pub Coordinates);

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self(Coordinates::new(x, y))
    }
}

/// Free-form string tags ("Rock", "Tree", "Hostile", ...)
#[derive(Component, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(pub BTreeSet<String>);

impl Tags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tags.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }
}

/// Health state of a mob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobState {
    #[default]
    Alive,
    Critical,
    Dead,
}

/// Entity that can be alive, critical, or dead
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mob {
    pub state: MobState,
}

impl Mob {
    pub fn new(state: MobState) -> Self {
        Self { state }
    }
}

/// Entity losing blood; a zero rate counts as not bleeding
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bleeding {
    pub rate: f32,
}

/// A structure under construction
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Construction {
    /// Steps already done
    pub step: u32,
    /// Steps in the whole graph
    pub total: u32,
}

impl Construction {
    pub fn new(step: u32, total: u32) -> Self {
        Self { step, total }
    }

    pub fn is_complete(&self) -> bool {
        self.step >= self.total
    }

    /// 0.0 to 1.0; an empty graph is complete
    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            (self.step as f32 / self.total as f32).min(1.0)
        }
    }
}

/// Occupies its tile; move orders avoid it
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Blocking;
