//! Actor Components
//!
//! Components for controllable NPCs: who may command them and which
//! routine tasks they fall back to when idle.

use bevy_ecs::prelude::*;
use npc_messages::{ControllerId, TaskId};
use serde::{Deserialize, Serialize};

/// Marks an entity as a controllable actor and lists the users allowed to command it
#[derive(Component, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controllable {
    pub controllers: Vec<ControllerId>,
}

impl Controllable {
    pub fn new(controllers: impl IntoIterator<Item = ControllerId>) -> Self {
        Self {
            controllers: controllers.into_iter().collect(),
        }
    }

    pub fn owned_by(controller: ControllerId) -> Self {
        Self::new([controller])
    }
}

/// One entry of an actor's routine list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineEntry {
    pub task: TaskId,
    /// Higher runs first; equal priorities keep list order
    #[serde(default)]
    pub priority: i32,
    /// Hold the entry back for a while after it fails
    #[serde(default)]
    pub finish_on_failed: bool,
}

impl RoutineEntry {
    pub fn new(task: impl Into<TaskId>, priority: i32) -> Self {
        Self {
            task: task.into(),
            priority,
            finish_on_failed: false,
        }
    }

    pub fn finish_on_failed(mut self) -> Self {
        self.finish_on_failed = true;
        self
    }
}

/// Tasks an idle actor picks up on its own
#[derive(Component, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineTasks {
    pub entries: Vec<RoutineEntry>,
}

impl RoutineTasks {
    pub fn new(entries: Vec<RoutineEntry>) -> Self {
        Self { entries }
    }

    /// Entries by descending priority, list order preserved among equals
    pub fn by_priority(&self) -> Vec<&RoutineEntry> {
        let mut ordered: Vec<&RoutineEntry> = self.entries.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_priority_is_stable() {
        let routine = RoutineTasks::new(vec![
            RoutineEntry::new("Wander", 0),
            RoutineEntry::new("Mine", 5),
            RoutineEntry::new("Chop", 5),
            RoutineEntry::new("Haul", 2),
        ]);

        let order: Vec<&str> = routine
            .by_priority()
            .iter()
            .map(|e| e.task.as_str())
            .collect();
        assert_eq!(order, vec!["Mine", "Chop", "Haul", "Wander"]);
    }

    #[test]
    fn test_routine_entry_defaults_from_toml() {
        let routine: RoutineTasks = toml::from_str(
            r#"
            [[entries]]
            task = "Mine"
            "#,
        )
        .unwrap();

        assert_eq!(routine.entries[0].priority, 0);
        assert!(!routine.entries[0].finish_on_failed);
    }
}
