//! Query filters.

use bevy_ecs::entity::Entity;
use npc_messages::Coordinates;
use serde::{Deserialize, Serialize};

use super::QueryContext;
use crate::blackboard::{FactOverlay, FactValue, DEFAULT_TARGET_KEY};
use crate::components::MobState;
use crate::preconditions::{EvalContext, MatchMode, Precondition};
use crate::registry::{ComponentRef, ComponentRegistry};

/// One step of a filter chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryFilter {
    Tag {
        tags: Vec<String>,
        #[serde(default)]
        mode: MatchMode,
    },
    Component {
        components: Vec<ComponentRef>,
        #[serde(default)]
        mode: MatchMode,
    },
    MobState {
        state: MobState,
    },
    Bleeding,
    /// Within `range` of the actor; needs an actor position
    WithinRange {
        range: f32,
    },
    /// Drops the actor itself; needs an actor
    NotSelf,
    /// Drops the entity stored under `key`; needs the fact
    NotFact {
        key: String,
    },
    /// Candidate bound to `"Target"` while the condition runs
    Precondition {
        condition: Precondition,
    },
    /// Keeps candidates the inner filter would drop
    Invert {
        filter: Box<QueryFilter>,
    },
}

/// A filter after startup, with whatever it looked up once.
pub(super) enum Prepared<'f> {
    Tag(&'f [String], MatchMode),
    Component(&'f [ComponentRef], MatchMode),
    MobState(MobState),
    Bleeding,
    WithinRange(Coordinates, f32),
    Exclude(Entity),
    Precondition(&'f Precondition),
    Invert(Box<Prepared<'f>>),
}

impl QueryFilter {
    pub fn invert(filter: QueryFilter) -> Self {
        QueryFilter::Invert {
            filter: Box::new(filter),
        }
    }

    /// `None` when the facts this filter depends on are missing
    pub(super) fn startup(&self, ctx: &QueryContext<'_>) -> Option<Prepared<'_>> {
        let world = ctx.eval.world;
        Some(match self {
            QueryFilter::Tag { tags, mode } => Prepared::Tag(tags, *mode),
            QueryFilter::Component { components, mode } => Prepared::Component(components, *mode),
            QueryFilter::MobState { state } => Prepared::MobState(*state),
            QueryFilter::Bleeding => Prepared::Bleeding,
            QueryFilter::WithinRange { range } => {
                let origin = ctx.actor().and_then(|a| world.position(a))?;
                Prepared::WithinRange(origin, *range)
            }
            QueryFilter::NotSelf => Prepared::Exclude(ctx.actor()?),
            QueryFilter::NotFact { key } => Prepared::Exclude(ctx.eval.facts.entity(key)?),
            QueryFilter::Precondition { condition } => Prepared::Precondition(condition),
            QueryFilter::Invert { filter } => Prepared::Invert(Box::new(filter.startup(ctx)?)),
        })
    }

    pub(super) fn resolve(&mut self, registry: &ComponentRegistry) -> Result<(), String> {
        match self {
            QueryFilter::Component { components, .. } => {
                components.iter_mut().try_for_each(|c| c.resolve(registry))
            }
            QueryFilter::Precondition { condition } => condition.resolve(registry),
            QueryFilter::Invert { filter } => filter.resolve(registry),
            _ => Ok(()),
        }
    }
}

impl Prepared<'_> {
    pub(super) fn keeps(&self, entity: Entity, ctx: &QueryContext<'_>) -> bool {
        let world = ctx.eval.world;
        match self {
            Prepared::Tag(tags, mode) => mode.test(tags, |t| world.has_tag(entity, t)),
            Prepared::Component(components, mode) => mode.test(components, |c| {
                c.key().is_some_and(|k| world.has_component(entity, k))
            }),
            Prepared::MobState(state) => world.mob_state(entity) == Some(*state),
            Prepared::Bleeding => world.is_bleeding(entity),
            Prepared::WithinRange(origin, range) => world
                .position(entity)
                .is_some_and(|p| p.distance(origin) <= *range),
            Prepared::Exclude(excluded) => entity != *excluded,
            Prepared::Precondition(condition) => {
                let facts = FactOverlay::new(ctx.eval.facts)
                    .with(DEFAULT_TARGET_KEY, FactValue::Entity(entity));
                condition.evaluate(&EvalContext::new(ctx.eval.actor, &facts, world))
            }
            Prepared::Invert(inner) => !inner.keeps(entity, ctx),
        }
    }
}
