//! Preconditions
//!
//! Boolean predicates over an actor's facts and the observable world. Task
//! definitions use them to decide when a task may start and when it is done;
//! query filters reuse them to test candidates.
//!
//! Evaluation is pure: it only reads through [`FactSource`] and [`WorldView`].
//! A missing fact or entity makes a leaf `false`, never an error. `And`/`Or`
//! stop at the first deciding branch.

use bevy_ecs::entity::Entity;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::blackboard::{FactSource, FactValue, DEFAULT_TARGET_KEY, OWNER_KEY};
use crate::components::MobState;
use crate::registry::{ComponentRef, ComponentRegistry};
use crate::world_view::WorldView;

/// Everything a precondition may look at.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// `None` when evaluating on behalf of no one (passive marking)
    pub actor: Option<Entity>,
    pub facts: &'a dyn FactSource,
    pub world: &'a dyn WorldView,
}

impl<'a> EvalContext<'a> {
    pub fn new(actor: Option<Entity>, facts: &'a dyn FactSource, world: &'a dyn WorldView) -> Self {
        Self { actor, facts, world }
    }

    /// Entity stored under `key`; `"Owner"` falls back to the actor itself
    pub fn subject(&self, key: &str) -> Option<Entity> {
        self.facts.entity(key).or_else(|| {
            if key == OWNER_KEY {
                self.actor
            } else {
                None
            }
        })
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// A constant to compare a fact against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Literal {
    fn compare(&self, fact: &FactValue) -> Option<Ordering> {
        match (fact, self) {
            (FactValue::Bool(a), Literal::Bool(b)) => Some(a.cmp(b)),
            (FactValue::Int(a), Literal::Int(b)) => Some(a.cmp(b)),
            (FactValue::Int(a), Literal::Float(b)) => (*a as f64).partial_cmp(b),
            (FactValue::Float(a), Literal::Int(b)) => a.partial_cmp(&(*b as f64)),
            (FactValue::Float(a), Literal::Float(b)) => a.partial_cmp(b),
            (FactValue::Text(a), Literal::Text(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => None,
        }
    }
}

/// Whether every listed item must match or just one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

impl MatchMode {
    pub(crate) fn test<T>(self, items: &[T], pred: impl FnMut(&T) -> bool) -> bool {
        match self {
            MatchMode::All => items.iter().all(pred),
            MatchMode::Any => items.iter().any(pred),
        }
    }
}

fn default_subject() -> String {
    DEFAULT_TARGET_KEY.to_string()
}

/// A boolean predicate. `subject` names the fact holding the entity to test
/// and defaults to `"Target"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Precondition {
    AlwaysTrue,
    AlwaysFalse,
    And {
        conditions: Vec<Precondition>,
    },
    Or {
        conditions: Vec<Precondition>,
    },
    Invert {
        condition: Box<Precondition>,
    },
    HasKey {
        key: String,
    },
    Compare {
        key: String,
        op: CompareOp,
        value: Literal,
    },
    HasTag {
        #[serde(default = "default_subject")]
        subject: String,
        tags: Vec<String>,
        #[serde(default)]
        mode: MatchMode,
    },
    HasComponent {
        #[serde(default = "default_subject")]
        subject: String,
        components: Vec<ComponentRef>,
        #[serde(default)]
        mode: MatchMode,
    },
    Bleeding {
        #[serde(default = "default_subject")]
        subject: String,
    },
    MobStateIs {
        #[serde(default = "default_subject")]
        subject: String,
        state: MobState,
    },
    /// Actor is farther than `range` from the subject
    DistanceBeyond {
        #[serde(default = "default_subject")]
        subject: String,
        range: f32,
    },
    ConstructionComplete {
        #[serde(default = "default_subject")]
        subject: String,
    },
    /// Compares the subject's current construction step against `step`
    ConstructionStep {
        #[serde(default = "default_subject")]
        subject: String,
        op: CompareOp,
        step: u32,
    },
}

impl Precondition {
    pub fn and(conditions: Vec<Precondition>) -> Self {
        Precondition::And { conditions }
    }

    pub fn or(conditions: Vec<Precondition>) -> Self {
        Precondition::Or { conditions }
    }

    pub fn invert(condition: Precondition) -> Self {
        Precondition::Invert {
            condition: Box::new(condition),
        }
    }

    pub fn has_tag(tag: impl Into<String>) -> Self {
        Precondition::HasTag {
            subject: default_subject(),
            tags: vec![tag.into()],
            mode: MatchMode::All,
        }
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Precondition::AlwaysTrue => true,
            Precondition::AlwaysFalse => false,
            Precondition::And { conditions } => conditions.iter().all(|c| c.evaluate(ctx)),
            Precondition::Or { conditions } => conditions.iter().any(|c| c.evaluate(ctx)),
            Precondition::Invert { condition } => !condition.evaluate(ctx),
            Precondition::HasKey { key } => ctx.facts.contains(key),
            Precondition::Compare { key, op, value } => ctx
                .facts
                .fact(key)
                .and_then(|fact| value.compare(fact))
                .is_some_and(|ord| op.matches(ord)),
            Precondition::HasTag {
                subject,
                tags,
                mode,
            } => ctx
                .subject(subject)
                .is_some_and(|e| mode.test(tags, |t| ctx.world.has_tag(e, t))),
            Precondition::HasComponent {
                subject,
                components,
                mode,
            } => ctx.subject(subject).is_some_and(|e| {
                mode.test(components, |c| {
                    c.key().is_some_and(|key| ctx.world.has_component(e, key))
                })
            }),
            Precondition::Bleeding { subject } => ctx
                .subject(subject)
                .is_some_and(|e| ctx.world.is_bleeding(e)),
            Precondition::MobStateIs { subject, state } => ctx
                .subject(subject)
                .and_then(|e| ctx.world.mob_state(e))
                .is_some_and(|s| s == *state),
            Precondition::DistanceBeyond { subject, range } => {
                let Some(actor) = ctx.subject(OWNER_KEY) else {
                    return false;
                };
                ctx.subject(subject)
                    .and_then(|e| ctx.world.distance(actor, e))
                    .is_some_and(|d| d > *range)
            }
            Precondition::ConstructionComplete { subject } => ctx
                .subject(subject)
                .and_then(|e| ctx.world.construction(e))
                .is_some_and(|c| c.is_complete()),
            Precondition::ConstructionStep { subject, op, step } => ctx
                .subject(subject)
                .and_then(|e| ctx.world.construction(e))
                .is_some_and(|c| op.matches(c.step.cmp(step))),
        }
    }

    /// Resolves component names, returning the first unknown one.
    pub fn resolve(&mut self, registry: &ComponentRegistry) -> Result<(), String> {
        match self {
            Precondition::And { conditions } | Precondition::Or { conditions } => conditions
                .iter_mut()
                .try_for_each(|c| c.resolve(registry)),
            Precondition::Invert { condition } => condition.resolve(registry),
            Precondition::HasComponent { components, .. } => components
                .iter_mut()
                .try_for_each(|c| c.resolve(registry)),
            _ => Ok(()),
        }
    }
}

/// True when every condition holds. Empty lists hold.
pub fn all_hold(conditions: &[Precondition], ctx: &EvalContext<'_>) -> bool {
    conditions.iter().all(|c| c.evaluate(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::{Blackboard, FactOverlay};
    use crate::components::{Bleeding, Construction, Mob, Position, Tags};
    use crate::registry::ComponentRegistry;
    use crate::world_view::EcsWorldView;
    use bevy_ecs::world::World;
    use npc_messages::{Coordinates, TilePos};
    use std::cell::Cell;

    fn target_board(actor: Entity, target: Entity) -> Blackboard {
        let mut board = Blackboard::for_actor(actor);
        board.set(DEFAULT_TARGET_KEY, FactValue::Entity(target));
        board
    }

    #[test]
    fn test_compare_numeric_and_text() {
        let world = World::new();
        let registry = ComponentRegistry::with_builtin();
        let view = EcsWorldView::new(&world, &registry);

        let mut board = Blackboard::new();
        board.set("Hunger", FactValue::Float(0.7));
        board.set("Count", FactValue::Int(3));
        board.set("Mood", FactValue::Text("calm".into()));
        let ctx = EvalContext::new(None, &board, &view);

        let gt = |key: &str, value: Literal| Precondition::Compare {
            key: key.into(),
            op: CompareOp::Gt,
            value,
        };
        assert!(gt("Hunger", Literal::Float(0.5)).evaluate(&ctx));
        assert!(gt("Count", Literal::Float(2.5)).evaluate(&ctx));
        assert!(!gt("Count", Literal::Int(3)).evaluate(&ctx));
        assert!(Precondition::Compare {
            key: "Mood".into(),
            op: CompareOp::Eq,
            value: Literal::Text("calm".into()),
        }
        .evaluate(&ctx));

        // Mismatched types and missing facts are false, not errors
        assert!(!gt("Mood", Literal::Int(1)).evaluate(&ctx));
        assert!(!gt("Missing", Literal::Int(1)).evaluate(&ctx));
    }

    #[test]
    fn test_tag_modes() {
        let mut world = World::new();
        let registry = ComponentRegistry::with_builtin();
        let actor = world.spawn_empty().id();
        let rock = world.spawn(Tags::new(["Rock", "Ore"])).id();
        let view = EcsWorldView::new(&world, &registry);
        let board = target_board(actor, rock);
        let ctx = EvalContext::new(Some(actor), &board, &view);

        let tags = vec!["Rock".to_string(), "Tree".to_string()];
        let all = Precondition::HasTag {
            subject: DEFAULT_TARGET_KEY.into(),
            tags: tags.clone(),
            mode: MatchMode::All,
        };
        let any = Precondition::HasTag {
            subject: DEFAULT_TARGET_KEY.into(),
            tags,
            mode: MatchMode::Any,
        };
        assert!(!all.evaluate(&ctx));
        assert!(any.evaluate(&ctx));
        assert!(!Precondition::invert(any).evaluate(&ctx));
    }

    #[test]
    fn test_domain_leaves() {
        let mut world = World::new();
        let registry = ComponentRegistry::with_builtin();
        let actor = world.spawn(Position::new(0.0, 0.0)).id();
        let wounded = world
            .spawn((
                Position::new(6.0, 8.0),
                Mob::new(MobState::Critical),
                Bleeding { rate: 1.0 },
                Construction::new(2, 3),
            ))
            .id();
        let view = EcsWorldView::new(&world, &registry);
        let board = target_board(actor, wounded);
        let ctx = EvalContext::new(Some(actor), &board, &view);
        let target = || DEFAULT_TARGET_KEY.to_string();

        assert!(Precondition::Bleeding { subject: target() }.evaluate(&ctx));
        assert!(Precondition::MobStateIs {
            subject: target(),
            state: MobState::Critical
        }
        .evaluate(&ctx));
        assert!(Precondition::DistanceBeyond {
            subject: target(),
            range: 9.5
        }
        .evaluate(&ctx));
        assert!(!Precondition::DistanceBeyond {
            subject: target(),
            range: 10.0
        }
        .evaluate(&ctx));
        assert!(!Precondition::ConstructionComplete { subject: target() }.evaluate(&ctx));
        assert!(Precondition::ConstructionStep {
            subject: target(),
            op: CompareOp::Ge,
            step: 2
        }
        .evaluate(&ctx));
    }

    #[test]
    fn test_missing_subject_is_false() {
        let mut world = World::new();
        let registry = ComponentRegistry::with_builtin();
        let actor = world.spawn(Position::new(0.0, 0.0)).id();
        let view = EcsWorldView::new(&world, &registry);
        let board = Blackboard::for_actor(actor);
        let ctx = EvalContext::new(Some(actor), &board, &view);

        assert!(!Precondition::has_tag("Rock").evaluate(&ctx));
        assert!(!Precondition::Bleeding {
            subject: DEFAULT_TARGET_KEY.into()
        }
        .evaluate(&ctx));
        // Inverting a missing subject is simply true
        assert!(Precondition::invert(Precondition::has_tag("Rock")).evaluate(&ctx));
    }

    #[test]
    fn test_component_requires_resolution() {
        let mut world = World::new();
        let registry = ComponentRegistry::with_builtin();
        let actor = world.spawn_empty().id();
        let site = world.spawn(Construction::new(0, 2)).id();
        let view = EcsWorldView::new(&world, &registry);
        let board = target_board(actor, site);
        let ctx = EvalContext::new(Some(actor), &board, &view);

        let mut cond = Precondition::HasComponent {
            subject: DEFAULT_TARGET_KEY.into(),
            components: vec![ComponentRef::named("Construction")],
            mode: MatchMode::All,
        };
        assert!(!cond.evaluate(&ctx));
        cond.resolve(&registry).unwrap();
        assert!(cond.evaluate(&ctx));

        let mut unknown = Precondition::invert(Precondition::HasComponent {
            subject: DEFAULT_TARGET_KEY.into(),
            components: vec![ComponentRef::named("Nope")],
            mode: MatchMode::Any,
        });
        assert_eq!(unknown.resolve(&registry), Err("Nope".to_string()));
    }

    /// Counts how often the world is asked about tags
    struct CountingView {
        tag_checks: Cell<u32>,
    }

    impl WorldView for CountingView {
        fn exists(&self, _: Entity) -> bool {
            true
        }
        fn position(&self, _: Entity) -> Option<Coordinates> {
            None
        }
        fn has_tag(&self, _: Entity, _: &str) -> bool {
            self.tag_checks.set(self.tag_checks.get() + 1);
            true
        }
        fn has_component(&self, _: Entity, _: crate::registry::ComponentKey) -> bool {
            false
        }
        fn mob_state(&self, _: Entity) -> Option<MobState> {
            None
        }
        fn is_bleeding(&self, _: Entity) -> bool {
            false
        }
        fn construction(&self, _: Entity) -> Option<Construction> {
            None
        }
        fn entities_in_range(&self, _: Coordinates, _: f32) -> Vec<Entity> {
            Vec::new()
        }
        fn is_tile_free(&self, _: TilePos) -> bool {
            true
        }
    }

    #[test]
    fn test_and_or_short_circuit() {
        let mut world = World::new();
        let actor = world.spawn_empty().id();
        let target = world.spawn_empty().id();
        let view = CountingView {
            tag_checks: Cell::new(0),
        };
        let board = target_board(actor, target);
        let ctx = EvalContext::new(Some(actor), &board, &view);

        let and = Precondition::and(vec![Precondition::AlwaysFalse, Precondition::has_tag("Rock")]);
        let or = Precondition::or(vec![Precondition::AlwaysTrue, Precondition::has_tag("Rock")]);
        assert!(!and.evaluate(&ctx));
        assert!(or.evaluate(&ctx));
        assert_eq!(view.tag_checks.get(), 0);

        let and = Precondition::and(vec![Precondition::has_tag("Rock"), Precondition::has_tag("Ore")]);
        assert!(and.evaluate(&ctx));
        assert_eq!(view.tag_checks.get(), 2);
    }

    #[test]
    fn test_overlay_target_leaves_board_unchanged() {
        let mut world = World::new();
        let registry = ComponentRegistry::with_builtin();
        let actor = world.spawn_empty().id();
        let tree = world.spawn(Tags::new(["Tree"])).id();
        let view = EcsWorldView::new(&world, &registry);
        let board = Blackboard::for_actor(actor);
        let before = board.clone();

        let overlay = FactOverlay::new(&board).with(DEFAULT_TARGET_KEY, FactValue::Entity(tree));
        let ctx = EvalContext::new(Some(actor), &overlay, &view);
        assert!(Precondition::has_tag("Tree").evaluate(&ctx));
        drop(overlay);

        assert_eq!(board, before);
    }

    #[test]
    fn test_parse_from_toml() {
        let cond: Precondition = toml::from_str(
            r#"
            kind = "or"
            [[conditions]]
            kind = "has_tag"
            tags = ["Rock"]
            [[conditions]]
            kind = "compare"
            key = "Stamina"
            op = "ge"
            value = 3
            "#,
        )
        .unwrap();

        match cond {
            Precondition::Or { conditions } => {
                assert_eq!(conditions.len(), 2);
                assert!(matches!(
                    &conditions[0],
                    Precondition::HasTag { subject, mode: MatchMode::All, .. } if subject == "Target"
                ));
                assert!(matches!(
                    &conditions[1],
                    Precondition::Compare { value: Literal::Int(3), .. }
                ));
            }
            other => panic!("unexpected condition: {:?}", other),
        }
    }

    #[test]
    fn test_empty_list_holds() {
        let world = World::new();
        let registry = ComponentRegistry::with_builtin();
        let view = EcsWorldView::new(&world, &registry);
        let board = Blackboard::new();
        let ctx = EvalContext::new(None, &board, &view);
        assert!(all_hold(&[], &ctx));
    }
}
