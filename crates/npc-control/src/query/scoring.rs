//! Candidate ranking.
//!
//! A [`Scorer`] maps a candidate to a number; higher is better. The built-in
//! [`ConsiderationScorer`] multiplies a list of normalized inputs, each shaped
//! by a response curve, and compensates for the number of considerations so
//! that adding one does not drag every score down.

use bevy_ecs::entity::Entity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::QueryContext;

/// Ranks candidates.
pub trait Scorer {
    fn score(&self, candidate: Entity, ctx: &QueryContext<'_>) -> f32;
}

/// Highest scoring candidate. Ties go to the lowest entity; NaN scores never win.
pub fn best(candidates: &BTreeSet<Entity>, scorer: &dyn Scorer, ctx: &QueryContext<'_>) -> Option<Entity> {
    let mut best: Option<(Entity, f32)> = None;
    for &candidate in candidates {
        let score = scorer.score(candidate, ctx);
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((candidate, score)),
        }
    }
    best.map(|(e, _)| e)
}

/// Closer to the actor is better. Candidates without a position rank last.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestScorer;

impl Scorer for NearestScorer {
    fn score(&self, candidate: Entity, ctx: &QueryContext<'_>) -> f32 {
        ctx.actor()
            .and_then(|actor| ctx.eval.world.distance(actor, candidate))
            .map_or(f32::NEG_INFINITY, |d| -d)
    }
}

/// Maps a normalized input (0..1) to a response (0..1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCurve {
    Linear,
    InverseLinear,
    Quadratic,
    InverseQuadratic,
}

impl ResponseCurve {
    /// Input and output are both clamped to the unit interval
    pub fn sample(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let out = match self {
            ResponseCurve::Linear => t,
            ResponseCurve::InverseLinear => 1.0 - t,
            ResponseCurve::Quadratic => t * t,
            ResponseCurve::InverseQuadratic => (1.0 - t) * (1.0 - t),
        };
        out.clamp(0.0, 1.0)
    }
}

/// What a consideration measures about a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsiderationInput {
    /// Distance from the actor
    Distance,
    /// Construction progress, 0.0 to 1.0
    ConstructionProgress,
}

/// One scoring factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consideration {
    pub input: ConsiderationInput,
    pub curve: ResponseCurve,
    /// Raw input mapped to 0.0
    #[serde(default)]
    pub min: f32,
    /// Raw input mapped to 1.0
    #[serde(default = "default_max")]
    pub max: f32,
}

fn default_max() -> f32 {
    1.0
}

impl Consideration {
    fn raw(&self, candidate: Entity, ctx: &QueryContext<'_>) -> Option<f32> {
        let world = ctx.eval.world;
        match self.input {
            ConsiderationInput::Distance => world.distance(ctx.actor()?, candidate),
            ConsiderationInput::ConstructionProgress => {
                Some(world.construction(candidate).map_or(0.0, |c| c.progress()))
            }
        }
    }

    /// 0.0 when the input cannot be measured
    pub fn score(&self, candidate: Entity, ctx: &QueryContext<'_>) -> f32 {
        let Some(raw) = self.raw(candidate, ctx) else {
            return 0.0;
        };
        let span = self.max - self.min;
        let t = if span.abs() <= f32::EPSILON {
            if raw >= self.max {
                1.0
            } else {
                0.0
            }
        } else {
            (raw - self.min) / span
        };
        self.curve.sample(t)
    }
}

/// Product of considerations with count compensation.
pub struct ConsiderationScorer<'a> {
    considerations: &'a [Consideration],
}

impl<'a> ConsiderationScorer<'a> {
    pub fn new(considerations: &'a [Consideration]) -> Self {
        Self { considerations }
    }
}

impl Scorer for ConsiderationScorer<'_> {
    fn score(&self, candidate: Entity, ctx: &QueryContext<'_>) -> f32 {
        if self.considerations.is_empty() {
            return 1.0;
        }
        let modification = 1.0 - 1.0 / self.considerations.len() as f32;
        let mut total = 1.0;
        for consideration in self.considerations {
            let score = consideration.score(candidate, ctx);
            if score <= 0.0 {
                return 0.0;
            }
            let makeup = (1.0 - score) * modification;
            total *= score + makeup * score;
        }
        total
    }
}
