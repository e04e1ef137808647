use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use migrant_core::CatalogPackage;

pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Bounded least-recently-used store of catalog search results, shared by all
/// matcher threads.
#[derive(Debug)]
pub struct SearchCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    tick: u64,
    entries: HashMap<String, CacheSlot>,
}

#[derive(Debug)]
struct CacheSlot {
    last_used: u64,
    packages: Vec<CatalogPackage>,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl SearchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, keyword: &str) -> Option<Vec<CatalogPackage>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tick += 1;
        let tick = state.tick;
        let slot = state.entries.get_mut(&cache_key(keyword))?;
        slot.last_used = tick;
        Some(slot.packages.clone())
    }

    pub fn insert(&self, keyword: &str, packages: Vec<CatalogPackage>) {
        let key = cache_key(keyword);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tick += 1;
        let tick = state.tick;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
            }
        }

        state.entries.insert(
            key,
            CacheSlot {
                last_used: tick,
                packages,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
    }
}

fn cache_key(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}
