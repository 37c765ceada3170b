use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

use super::LocalStorage;

/// Volatile storage for tests and boards without flash.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    data: BTreeMap<String, String>,
    writes: usize,
    failing: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes and removals so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Makes every following operation fail.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }
}

impl LocalStorage for MemoryStorage {
    type Error = ();

    fn get_item(&self, key: &str) -> Result<Option<String>, Self::Error> {
        if self.failing {
            return Err(());
        }
        Ok(self.data.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        if self.failing {
            return Err(());
        }
        self.data.insert(key.to_string(), value.to_string());
        self.writes += 1;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), Self::Error> {
        if self.failing {
            return Err(());
        }
        if self.data.remove(key).is_some() {
            self.writes += 1;
        }
        Ok(())
    }
}
