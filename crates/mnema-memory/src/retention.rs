// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retention policy: importance floors and capacity eviction.
//!
//! Eviction order is deterministic: lowest importance first, then oldest,
//! then id. Two stores with the same contents always evict the same
//! records.

use std::collections::HashMap;

use mnema_config::MemoryConfig;

use crate::types::{MemoryImportance, MemoryRecord, MemoryType};

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub max_memories: usize,
    pub min_importance: MemoryImportance,
    type_floors: HashMap<MemoryType, MemoryImportance>,
}

impl RetentionPolicy {
    pub fn new(max_memories: usize, min_importance: MemoryImportance) -> Self {
        Self {
            max_memories,
            min_importance,
            type_floors: HashMap::new(),
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        let mut policy = Self::new(
            config.max_memories,
            MemoryImportance::from_label(&config.min_importance),
        );
        for (type_label, floor_label) in &config.type_min_importance {
            policy.type_floors.insert(
                MemoryType::from_label(type_label),
                MemoryImportance::from_label(floor_label),
            );
        }
        policy
    }

    pub fn with_type_floor(mut self, memory_type: MemoryType, floor: MemoryImportance) -> Self {
        self.type_floors.insert(memory_type, floor);
        self
    }

    /// Effective importance floor for a memory type. Per-type floors only
    /// ever tighten the global floor, never relax it.
    pub fn min_importance_for(&self, memory_type: MemoryType) -> MemoryImportance {
        self.type_floors
            .get(&memory_type)
            .copied()
            .map(|floor| floor.max(self.min_importance))
            .unwrap_or(self.min_importance)
    }

    /// Whether a classified candidate clears its importance floor.
    pub fn admits(&self, memory_type: MemoryType, importance: MemoryImportance) -> bool {
        importance >= self.min_importance_for(memory_type)
    }

    /// Ids to evict so the scope fits within `max_memories`.
    ///
    /// Candidates are ordered importance ascending, then created_at
    /// ascending, then id ascending; the overflow prefix is returned.
    pub fn select_evictions(&self, records: &[MemoryRecord]) -> Vec<String> {
        if records.len() <= self.max_memories {
            return Vec::new();
        }
        let overflow = records.len() - self.max_memories;
        let mut candidates: Vec<&MemoryRecord> = records.iter().collect();
        candidates.sort_by(|a, b| {
            a.importance
                .cmp(&b.importance)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates
            .into_iter()
            .take(overflow)
            .map(|r| r.id.clone())
            .collect()
    }
}
