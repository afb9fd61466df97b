use super::*;
use entry::{FileName, MetaEntry};
use table::MetaTable;

use std::collections::BTreeMap;

/// In-memory name → slot cache, rebuilt at every mount.
///
/// Small tables are cached whole. From `cache_threshold` slots on only the
/// back half is cached (load-balanced mode) and names older than the split
/// are found by scanning the device. Cached slots are never dropped: a hit is
/// only accepted after the slot is re-read and found live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupIndex {
    names: BTreeMap<FileName, Vec<u16 /* slot */>>,
    /// lowest slot the cache covers; slots below it live only on the device
    first_cached: u16,
    load_balanced: bool,
}

impl LookupIndex {
    pub fn build(table: &MetaTable, cache_threshold: u16) -> Result<Self> {
        let count = table.file_count();
        let load_balanced = count >= cache_threshold;
        let first_cached = if load_balanced { (count / 2).max(1) } else { 1 };
        let mut index = Self {
            names: BTreeMap::new(),
            first_cached,
            load_balanced,
        };
        for slot in first_cached..=count {
            let entry = table.read_entry(slot)?;
            if entry.is_head() {
                index.insert(entry.filename, slot);
            }
        }
        Ok(index)
    }

    pub fn insert(&mut self, name: FileName, slot: u16) {
        self.names.entry(name).or_default().push(slot);
    }

    /// The live head entry named `name`, confirmed against the device.
    pub fn find(&self, table: &MetaTable, name: &FileName) -> Result<Option<(u16, MetaEntry)>> {
        if let Some(slots) = self.names.get(name) {
            // newest first, older slots of a reused name are tombstoned
            for &slot in slots.iter().rev() {
                let entry = table.read_entry(slot)?;
                if entry.is_live() && entry.filename == *name {
                    return Ok(Some((slot, entry)));
                }
            }
        }
        if !self.load_balanced {
            return Ok(None);
        }
        for slot in 1..self.first_cached {
            let entry = table.read_entry(slot)?;
            if entry.is_live() && entry.filename == *name {
                return Ok(Some((slot, entry)));
            }
        }
        Ok(None)
    }

    pub fn is_load_balanced(&self) -> bool {
        self.load_balanced
    }

    pub fn first_cached(&self) -> u16 {
        self.first_cached
    }

    pub fn contains(&self, name: &FileName) -> bool {
        self.names.contains_key(name)
    }

    /// Cached slots, stale ones included.
    pub fn len(&self) -> usize {
        self.names.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
