//! In-memory [`ResponseCache`] for tests and single-process use.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. The insert is a
//! check-then-insert under one write lock, so concurrent writers for the
//! same fingerprint keep the first response.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{PulseError, Result};
use crate::models::CacheEntry;
use crate::traits::ResponseCache;

#[derive(Debug, Default)]
pub struct MemoryResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> PulseError {
    PulseError::Cache("cache lock poisoned".to_string())
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(fingerprint).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries
            .entry(entry.fingerprint.clone())
            .or_insert_with(|| entry.clone());
        Ok(())
    }
}
