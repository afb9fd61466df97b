use super::*;
use common::*;

/// Tunables a file system instance is created with.
///
/// `slot_capacity` only matters to [`MjolnFs::format`](crate::MjolnFs::format):
/// it is persisted in the boot sector and read back on mount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FsConfig {
    /// metadata slots reserved at format time
    pub slot_capacity: u16,
    /// lookup index load-balances once `file_count` reaches this
    pub cache_threshold: u16,
    /// largest payload one block carries, longer data is chained
    pub block_limit: u32,
}

impl FsConfig {
    pub fn for_model(model: DeviceModel) -> Self {
        Self {
            slot_capacity: model.slot_capacity(),
            ..Self::default()
        }
    }

    pub fn with_slot_capacity(mut self, slots: u16) -> Self {
        self.slot_capacity = slots;
        self
    }

    pub fn with_cache_threshold(mut self, threshold: u16) -> Self {
        self.cache_threshold = threshold;
        self
    }

    pub fn with_block_limit(mut self, limit: u32) -> Self {
        self.block_limit = limit;
        self
    }

    /// `block_limit` clamped to what a 24-bit size field can carry.
    pub(crate) fn effective_block_limit(&self) -> u32 {
        self.block_limit.clamp(1, MAX_U24)
    }
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            slot_capacity: DeviceModel::At24c256.slot_capacity(),
            cache_threshold: CACHE_THRESHOLD,
            block_limit: MAX_U24,
        }
    }
}
