//! Vehicle priority bookkeeping.

use dashmap::DashMap;

/// Source of truth for vehicle priorities.
///
/// The engine reads and writes priorities only through this trait, so an
/// external registry and `SetPriority` cannot drift apart.
pub trait PriorityRegistry: Send + Sync {
    fn get_priority(&self, vehicle_id: &str) -> i32;
    fn set_priority(&self, vehicle_id: &str, priority: i32);
}

/// Registry backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryPriorityRegistry {
    priorities: DashMap<String, i32>,
    default_priority: i32,
}

impl InMemoryPriorityRegistry {
    pub fn new(default_priority: i32) -> Self {
        Self {
            priorities: DashMap::new(),
            default_priority,
        }
    }

    pub fn len(&self) -> usize {
        self.priorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
    }
}

impl PriorityRegistry for InMemoryPriorityRegistry {
    fn get_priority(&self, vehicle_id: &str) -> i32 {
        self.priorities
            .get(vehicle_id)
            .map(|entry| *entry.value())
            .unwrap_or(self.default_priority)
    }

    fn set_priority(&self, vehicle_id: &str, priority: i32) {
        self.priorities.insert(vehicle_id.to_string(), priority);
    }
}
