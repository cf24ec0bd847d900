//! Task Catalog
//!
//! The table of task definitions. Definitions are data: they are loaded from
//! TOML (`[[task]]` tables) or JSON (`{"task": [...]}`), validated, and have
//! their component names resolved against a [`ComponentRegistry`] once, at
//! load time. A loaded catalog is immutable; [`TaskCatalog::reload`] swaps the
//! whole table or leaves the old one in place.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bevy_ecs::entity::Entity;
use npc_messages::{Coordinates, TaskId};
use serde::{Deserialize, Serialize};

use crate::blackboard::{DEFAULT_COORDINATES_KEY, DEFAULT_TARGET_KEY};
use crate::error::{CatalogError, TaskError};
use crate::preconditions::Precondition;
use crate::query::UtilityQuery;
use crate::registry::{ComponentRef, ComponentRegistry};
use crate::world_view::WorldView;

/// What a task acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// An existing entity
    #[default]
    Entity,
    /// Bare map coordinates, no entity
    Coordinates,
    /// Nothing at all
    Nothing,
}

/// Which entities a task may target. An empty whitelist accepts any entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityWhitelist {
    pub tags: Vec<String>,
    pub components: Vec<ComponentRef>,
    /// Every listed tag and component instead of any one of them
    pub require_all: bool,
}

impl EntityWhitelist {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.components.is_empty()
    }

    pub fn accepts(&self, entity: Entity, world: &dyn WorldView) -> bool {
        if self.is_empty() {
            return true;
        }
        let mut tags = self.tags.iter().map(|t| world.has_tag(entity, t));
        let mut components = self
            .components
            .iter()
            .map(|c| c.key().is_some_and(|k| world.has_component(entity, k)));
        if self.require_all {
            tags.all(|m| m) && components.all(|m| m)
        } else {
            tags.any(|m| m) || components.any(|m| m)
        }
    }
}

fn default_target_key() -> String {
    DEFAULT_TARGET_KEY.to_string()
}

fn default_coordinates_key() -> String {
    DEFAULT_COORDINATES_KEY.to_string()
}

fn default_true() -> bool {
    true
}

fn default_finish_check_rate() -> f64 {
    1.0
}

fn default_fail_await_time() -> f64 {
    3.0
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

/// One task an actor can be ordered or choose to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub target: TargetKind,
    #[serde(default)]
    pub whitelist: EntityWhitelist,
    #[serde(default)]
    pub start_preconditions: Vec<Precondition>,
    /// Empty never finishes on its own
    #[serde(default)]
    pub finish_preconditions: Vec<Precondition>,

    /// Behavior tree to run
    pub task: String,
    /// Behavior tree to run once on finish
    #[serde(default)]
    pub on_finish_task: Option<String>,

    /// Concurrent performers per target; unset is unlimited
    #[serde(default)]
    pub max_performers: Option<u32>,
    /// The actor may target itself
    #[serde(default)]
    pub self_target: bool,
    /// Targets may be marked as passive opportunities for this task
    #[serde(default)]
    pub passive: bool,
    /// Never assigned without an explicit pick from the client
    #[serde(default)]
    pub manual_only: bool,

    #[serde(default = "default_target_key")]
    pub target_key: String,
    #[serde(default = "default_coordinates_key")]
    pub target_coordinates_key: String,
    #[serde(default = "default_true")]
    pub delete_keys_on_finish: bool,

    /// Seconds a failed task stays unavailable to autonomous selection
    #[serde(default)]
    pub fail_cooldown: f64,
    /// Seconds between finish precondition checks
    #[serde(default = "default_finish_check_rate")]
    pub finish_check_rate: f64,
    /// Seconds a plan may stay failed before the task is abandoned
    #[serde(default = "default_fail_await_time")]
    pub fail_await_time: f64,

    /// Autonomous target discovery
    #[serde(default)]
    pub query: Option<UtilityQuery>,
}

impl TaskDefinition {
    /// A definition with every optional field at its default.
    pub fn new(id: impl Into<TaskId>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            icon: None,
            target: TargetKind::Entity,
            whitelist: EntityWhitelist::default(),
            start_preconditions: Vec::new(),
            finish_preconditions: Vec::new(),
            task: task.into(),
            on_finish_task: None,
            max_performers: None,
            self_target: false,
            passive: false,
            manual_only: false,
            target_key: default_target_key(),
            target_coordinates_key: default_coordinates_key(),
            delete_keys_on_finish: true,
            fail_cooldown: 0.0,
            finish_check_rate: default_finish_check_rate(),
            fail_await_time: default_fail_await_time(),
            query: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn fail_cooldown(&self) -> Duration {
        secs(self.fail_cooldown)
    }

    pub fn finish_check_rate(&self) -> Duration {
        secs(self.finish_check_rate)
    }

    pub fn fail_await_time(&self) -> Duration {
        secs(self.fail_await_time)
    }

    /// Whether the request shape fits this task and the target passes the
    /// whitelist. Preconditions are checked separately.
    ///
    /// Entity tasks need a live target that is not the actor unless
    /// `self_target` is set. Coordinate tasks need coordinates and no
    /// target. Target-less tasks need neither.
    pub fn accepts_target(
        &self,
        actor: Option<Entity>,
        target: Option<Entity>,
        coordinates: Option<Coordinates>,
        world: &dyn WorldView,
    ) -> bool {
        match self.target {
            TargetKind::Entity => {
                let Some(target) = target else {
                    return false;
                };
                if !world.exists(target) {
                    return false;
                }
                if actor == Some(target) && !self.self_target {
                    return false;
                }
                self.whitelist.accepts(target, world)
            }
            TargetKind::Coordinates => target.is_none() && coordinates.is_some(),
            TargetKind::Nothing => target.is_none() && coordinates.is_none(),
        }
    }

    fn validate(&mut self, registry: &ComponentRegistry) -> Result<(), CatalogError> {
        let malformed = |reason: &str| CatalogError::Malformed {
            task: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.as_str().is_empty() {
            return Err(malformed("empty task id"));
        }
        if self.task.is_empty() {
            return Err(malformed("no behavior tree"));
        }
        if self.max_performers == Some(0) {
            return Err(malformed("max_performers must be at least 1"));
        }
        for (name, value) in [
            ("fail_cooldown", self.fail_cooldown),
            ("finish_check_rate", self.finish_check_rate),
            ("fail_await_time", self.fail_await_time),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(malformed(&format!("{name} must be a non-negative number of seconds")));
            }
        }
        if self.passive && self.target != TargetKind::Entity {
            return Err(malformed("passive tasks need an entity target"));
        }
        if self.target_key.is_empty() || self.target_coordinates_key.is_empty() {
            return Err(malformed("fact keys must not be empty"));
        }

        let task = self.id.clone();
        let unknown = |component: String| CatalogError::UnknownComponent {
            task: task.clone(),
            component,
        };
        self.whitelist
            .components
            .iter_mut()
            .try_for_each(|c| c.resolve(registry))
            .map_err(unknown)?;
        self.start_preconditions
            .iter_mut()
            .chain(self.finish_preconditions.iter_mut())
            .try_for_each(|p| p.resolve(registry))
            .map_err(unknown)?;
        if let Some(query) = self.query.as_mut() {
            query.resolve(registry).map_err(unknown)?;
        }
        Ok(())
    }
}

/// Serialization format of a catalog source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Toml,
    Json,
}

impl CatalogFormat {
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(CatalogFormat::Toml),
            Some("json") => Ok(CatalogFormat::Json),
            other => Err(CatalogError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "task")]
    tasks: Vec<TaskDefinition>,
}

/// Rejects duplicate ids and resolves every definition against `registry`.
fn validate_all(
    mut definitions: Vec<TaskDefinition>,
    registry: &ComponentRegistry,
) -> Result<Vec<TaskDefinition>, CatalogError> {
    let mut seen = HashSet::new();
    for def in &mut definitions {
        if !seen.insert(def.id.clone()) {
            return Err(CatalogError::DuplicateTask(def.id.clone()));
        }
        def.validate(registry)?;
    }
    Ok(definitions)
}

/// Immutable table of task definitions.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    tasks: Vec<Arc<TaskDefinition>>,
    by_id: HashMap<TaskId, usize>,
}

impl TaskCatalog {
    /// Validates and resolves definitions, keeping their order.
    pub fn new(
        definitions: Vec<TaskDefinition>,
        registry: &ComponentRegistry,
    ) -> Result<Self, CatalogError> {
        Ok(Self::from_validated(validate_all(definitions, registry)?))
    }

    fn from_validated(definitions: Vec<TaskDefinition>) -> Self {
        let by_id = definitions
            .iter()
            .enumerate()
            .map(|(i, def)| (def.id.clone(), i))
            .collect();
        let tasks = definitions.into_iter().map(Arc::new).collect();
        Self { tasks, by_id }
    }

    /// Parses and validates definitions from a string. Nothing is kept if
    /// any entry is malformed.
    pub fn load_all(
        source: &str,
        format: CatalogFormat,
        registry: &ComponentRegistry,
    ) -> Result<Vec<TaskDefinition>, CatalogError> {
        let file: CatalogFile = match format {
            CatalogFormat::Toml => toml::from_str(source)?,
            CatalogFormat::Json => serde_json::from_str(source)?,
        };
        validate_all(file.tasks, registry)
    }

    pub fn from_str(
        source: &str,
        format: CatalogFormat,
        registry: &ComponentRegistry,
    ) -> Result<Self, CatalogError> {
        Self::load_all(source, format, registry).map(Self::from_validated)
    }

    /// Loads a `.toml` or `.json` catalog file.
    pub fn from_file(path: &Path, registry: &ComponentRegistry) -> Result<Self, CatalogError> {
        let format = CatalogFormat::from_path(path)?;
        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_str(&source, format, registry)?;
        tracing::info!(path = %path.display(), tasks = catalog.len(), "Loaded task catalog");
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Result<&Arc<TaskDefinition>, TaskError> {
        self.by_id
            .get(id)
            .map(|&i| &self.tasks[i])
            .ok_or_else(|| TaskError::UnknownTask(TaskId::new(id)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Definitions in load order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TaskDefinition>> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Replaces the whole table. On error the current table stays.
    pub fn reload(
        &mut self,
        definitions: Vec<TaskDefinition>,
        registry: &ComponentRegistry,
    ) -> Result<(), CatalogError> {
        let next = Self::new(definitions, registry)?;
        tracing::info!(before = self.len(), after = next.len(), "Reloaded task catalog");
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Position, Tags};
    use crate::world_view::EcsWorldView;
    use bevy_ecs::world::World;
    use std::io::Write;

    const CATALOG: &str = r#"
        [[task]]
        id = "Mine"
        name = "Mine rock"
        task = "MineCompound"
        max_performers = 1
        passive = true
        fail_cooldown = 10.0
        [task.whitelist]
        tags = ["Rock"]

        [[task]]
        id = "Move"
        task = "MoveToCompound"
        target = "coordinates"
        finish_check_rate = 0.5

        [[task.finish_preconditions]]
        kind = "always_true"
    "#;

    #[test]
    fn test_load_toml_catalog() {
        let registry = ComponentRegistry::with_builtin();
        let catalog = TaskCatalog::from_str(CATALOG, CatalogFormat::Toml, &registry).unwrap();

        assert_eq!(catalog.len(), 2);
        let mine = catalog.get("Mine").unwrap();
        assert_eq!(mine.display_name(), "Mine rock");
        assert_eq!(mine.max_performers, Some(1));
        assert_eq!(mine.target_key, "Target");
        assert!(mine.delete_keys_on_finish);
        assert_eq!(mine.fail_cooldown(), Duration::from_secs(10));
        assert_eq!(mine.fail_await_time(), Duration::from_secs(3));

        let mv = catalog.get("Move").unwrap();
        assert_eq!(mv.target, TargetKind::Coordinates);
        assert_eq!(mv.display_name(), "Move");
        assert_eq!(mv.finish_preconditions, vec![Precondition::AlwaysTrue]);

        let order: Vec<&str> = catalog.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["Mine", "Move"]);
    }

    #[test]
    fn test_get_unknown_task() {
        let catalog = TaskCatalog::default();
        assert_eq!(
            catalog.get("Nope").unwrap_err(),
            TaskError::UnknownTask(TaskId::new("Nope"))
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let registry = ComponentRegistry::with_builtin();
        let err = TaskCatalog::new(
            vec![TaskDefinition::new("A", "t"), TaskDefinition::new("A", "t")],
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateTask(id) if id.as_str() == "A"));
    }

    #[test]
    fn test_malformed_entries_rejected() {
        let registry = ComponentRegistry::with_builtin();

        let mut zero = TaskDefinition::new("Zero", "t");
        zero.max_performers = Some(0);
        assert!(matches!(
            TaskCatalog::new(vec![zero], &registry),
            Err(CatalogError::Malformed { .. })
        ));

        let mut negative = TaskDefinition::new("Neg", "t");
        negative.fail_cooldown = -1.0;
        assert!(matches!(
            TaskCatalog::new(vec![negative], &registry),
            Err(CatalogError::Malformed { .. })
        ));

        let mut passive_move = TaskDefinition::new("PassiveMove", "t");
        passive_move.target = TargetKind::Coordinates;
        passive_move.passive = true;
        assert!(matches!(
            TaskCatalog::new(vec![passive_move], &registry),
            Err(CatalogError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unknown_component_rejected() {
        let registry = ComponentRegistry::with_builtin();
        let source = r#"
            [[task]]
            id = "Harvest"
            task = "HarvestCompound"
            [task.whitelist]
            components = ["Crop"]
        "#;

        let err = TaskCatalog::from_str(source, CatalogFormat::Toml, &registry).unwrap_err();
        match err {
            CatalogError::UnknownComponent { task, component } => {
                assert_eq!(task.as_str(), "Harvest");
                assert_eq!(component, "Crop");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_reload_is_all_or_nothing() {
        let registry = ComponentRegistry::with_builtin();
        let mut catalog = TaskCatalog::from_str(CATALOG, CatalogFormat::Toml, &registry).unwrap();

        let bad = vec![TaskDefinition::new("X", "t"), TaskDefinition::new("X", "t")];
        assert!(catalog.reload(bad, &registry).is_err());
        assert!(catalog.contains("Mine"));

        catalog
            .reload(vec![TaskDefinition::new("Chop", "ChopCompound")], &registry)
            .unwrap();
        assert!(!catalog.contains("Mine"));
        assert!(catalog.contains("Chop"));
    }

    #[test]
    fn test_load_all_validates_like_from_str() {
        let registry = ComponentRegistry::with_builtin();
        let duplicated = r#"{"task": [
            {"id": "Move", "task": "MoveToCompound", "target": "coordinates"},
            {"id": "Move", "task": "OtherCompound"}
        ]}"#;
        assert!(matches!(
            TaskCatalog::load_all(duplicated, CatalogFormat::Json, &registry),
            Err(CatalogError::DuplicateTask(id)) if id == TaskId::new("Move")
        ));
        assert!(matches!(
            TaskCatalog::from_str(duplicated, CatalogFormat::Json, &registry),
            Err(CatalogError::DuplicateTask(_))
        ));

        let defs = TaskCatalog::load_all(CATALOG, CatalogFormat::Toml, &registry).unwrap();
        let catalog = TaskCatalog::from_str(CATALOG, CatalogFormat::Toml, &registry).unwrap();
        assert_eq!(catalog.len(), defs.len());
        for (loaded, def) in catalog.iter().zip(&defs) {
            assert_eq!(loaded.as_ref(), def);
            assert!(catalog.contains(def.id.as_str()));
        }
    }

    #[test]
    fn test_load_all_from_json() {
        let registry = ComponentRegistry::with_builtin();
        let source = r#"{"task": [
            {"id": "Heal", "task": "HealCompound", "self_target": true,
             "start_preconditions": [{"kind": "bleeding"}]}
        ]}"#;

        let defs = TaskCatalog::load_all(source, CatalogFormat::Json, &registry).unwrap();
        assert_eq!(defs.len(), 1);
        assert!(defs[0].self_target);
        assert_eq!(
            defs[0].start_preconditions,
            vec![Precondition::Bleeding {
                subject: "Target".into()
            }]
        );
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let registry = ComponentRegistry::with_builtin();
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("tasks.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();
        assert_eq!(TaskCatalog::from_file(&path, &registry).unwrap().len(), 2);

        let yaml = dir.path().join("tasks.yaml");
        std::fs::write(&yaml, "task: []").unwrap();
        assert!(matches!(
            TaskCatalog::from_file(&yaml, &registry),
            Err(CatalogError::UnsupportedFormat(ext)) if ext == "yaml"
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            TaskCatalog::from_file(&missing, &registry),
            Err(CatalogError::Io { .. })
        ));
    }

    #[test]
    fn test_accepts_target_shapes() {
        let mut world = World::new();
        let registry = ComponentRegistry::with_builtin();
        let actor = world.spawn(Position::new(0.0, 0.0)).id();
        let rock = world.spawn(Tags::new(["Rock"])).id();
        let tree = world.spawn(Tags::new(["Tree"])).id();
        let view = EcsWorldView::new(&world, &registry);
        let here = Some(Coordinates::new(3.0, 3.0));

        let catalog = TaskCatalog::from_str(CATALOG, CatalogFormat::Toml, &registry).unwrap();
        let mine = catalog.get("Mine").unwrap();
        let mv = catalog.get("Move").unwrap();

        assert!(mine.accepts_target(Some(actor), Some(rock), None, &view));
        assert!(!mine.accepts_target(Some(actor), Some(tree), None, &view));
        assert!(!mine.accepts_target(Some(actor), None, here, &view));
        assert!(mv.accepts_target(Some(actor), None, here, &view));
        assert!(!mv.accepts_target(Some(actor), Some(rock), here, &view));

        let mut heal = TaskDefinition::new("Heal", "HealCompound");
        assert!(!heal.accepts_target(Some(actor), Some(actor), None, &view));
        heal.self_target = true;
        assert!(heal.accepts_target(Some(actor), Some(actor), None, &view));
    }
}
