//! Utility Queries
//!
//! Candidate selection for autonomous target discovery: sources gather
//! entities, filters narrow them down in declared order, and a [`Scorer`]
//! picks the best one.
//!
//! Queries never fail. An empty source, a filter whose startup cannot find
//! the facts it needs, or an empty candidate set all just produce no target.

mod filters;
mod scoring;

pub use filters::QueryFilter;
pub use scoring::{best, Consideration, ConsiderationInput, ConsiderationScorer, NearestScorer, ResponseCurve, Scorer};

use bevy_ecs::entity::Entity;
use npc_messages::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::blackboard::OWNER_KEY;
use crate::preconditions::EvalContext;
use crate::registry::{ComponentRef, ComponentRegistry};
use crate::scheduler::PassiveMarks;

/// What a query can see: the evaluation context plus current passive marks.
#[derive(Clone, Copy)]
pub struct QueryContext<'a> {
    pub eval: EvalContext<'a>,
    pub marks: Option<&'a PassiveMarks>,
}

impl<'a> QueryContext<'a> {
    pub fn new(eval: EvalContext<'a>) -> Self {
        Self { eval, marks: None }
    }

    pub fn with_marks(mut self, marks: &'a PassiveMarks) -> Self {
        self.marks = Some(marks);
        self
    }

    /// The querying actor, from facts or the context
    pub fn actor(&self) -> Option<Entity> {
        self.eval.subject(OWNER_KEY)
    }
}

/// Where candidates come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuerySource {
    /// Entities around the actor carrying all listed tags and components
    InRange {
        range: f32,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        components: Vec<ComponentRef>,
    },
    /// The entity stored under a fact key
    FactEntity { key: String },
    /// Targets currently marked passive for a task
    PassiveMarked { task: TaskId },
}

impl QuerySource {
    fn collect(&self, ctx: &QueryContext<'_>, out: &mut BTreeSet<Entity>) {
        let world = ctx.eval.world;
        match self {
            QuerySource::InRange {
                range,
                tags,
                components,
            } => {
                let Some(origin) = ctx.actor().and_then(|a| world.position(a)) else {
                    return;
                };
                out.extend(world.entities_in_range(origin, *range).into_iter().filter(|&e| {
                    tags.iter().all(|t| world.has_tag(e, t))
                        && components
                            .iter()
                            .all(|c| c.key().is_some_and(|k| world.has_component(e, k)))
                }));
            }
            QuerySource::FactEntity { key } => {
                if let Some(e) = ctx.eval.facts.entity(key).filter(|&e| world.exists(e)) {
                    out.insert(e);
                }
            }
            QuerySource::PassiveMarked { task } => {
                if let Some(marks) = ctx.marks {
                    out.extend(marks.targets_for(task).filter(|&e| world.exists(e)));
                }
            }
        }
    }

    fn resolve(&mut self, registry: &ComponentRegistry) -> Result<(), String> {
        match self {
            QuerySource::InRange { components, .. } => {
                components.iter_mut().try_for_each(|c| c.resolve(registry))
            }
            _ => Ok(()),
        }
    }
}

/// A complete query: sources, filter chain and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityQuery {
    pub sources: Vec<QuerySource>,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    /// Empty ranks by distance, nearest first
    #[serde(default)]
    pub considerations: Vec<Consideration>,
}

impl UtilityQuery {
    pub fn new(sources: Vec<QuerySource>) -> Self {
        Self {
            sources,
            filters: Vec::new(),
            considerations: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sources, then filters
    pub fn candidates(&self, ctx: &QueryContext<'_>) -> BTreeSet<Entity> {
        filter(query(&self.sources, ctx), &self.filters, ctx)
    }

    /// Highest ranked candidate
    pub fn best(&self, ctx: &QueryContext<'_>) -> Option<Entity> {
        self.rank(&self.candidates(ctx), ctx)
    }

    /// Picks from already gathered candidates using this query's considerations
    pub fn rank(&self, candidates: &BTreeSet<Entity>, ctx: &QueryContext<'_>) -> Option<Entity> {
        if self.considerations.is_empty() {
            best(candidates, &NearestScorer, ctx)
        } else {
            let scorer = ConsiderationScorer::new(&self.considerations);
            best(candidates, &scorer, ctx)
        }
    }

    pub fn resolve(&mut self, registry: &ComponentRegistry) -> Result<(), String> {
        self.sources.iter_mut().try_for_each(|s| s.resolve(registry))?;
        self.filters.iter_mut().try_for_each(|f| f.resolve(registry))
    }
}

/// Union of every source's entities.
pub fn query(sources: &[QuerySource], ctx: &QueryContext<'_>) -> BTreeSet<Entity> {
    let mut out = BTreeSet::new();
    for source in sources {
        source.collect(ctx, &mut out);
    }
    out
}

/// Applies filters in order. Each filter starts up once against the facts;
/// a failed startup rejects every candidate.
pub fn filter(
    mut candidates: BTreeSet<Entity>,
    filters: &[QueryFilter],
    ctx: &QueryContext<'_>,
) -> BTreeSet<Entity> {
    for f in filters {
        if candidates.is_empty() {
            break;
        }
        match f.startup(ctx) {
            Some(prepared) => candidates.retain(|&e| prepared.keeps(e, ctx)),
            None => {
                tracing::debug!(filter = ?f, "Filter startup failed, rejecting all candidates");
                candidates.clear();
            }
        }
    }
    candidates
}
