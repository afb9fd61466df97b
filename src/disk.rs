//! Disk layout:
//! [ boot sector(24) | metadata slots(slot_capacity * 18) | pad to page | data region ... ]
//! Slots are numbered from 1; slot 0 does not exist on disk, so link 0 ends a chain.

use super::*;
use boot_sector::BOOT_SECTOR_SIZE;
use common::*;
use entry::ENTRY_SIZE;

/// Where everything lives on one formatted device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    capacity: u32,
    page_size: u16,
    slot_capacity: u16,
}

impl Layout {
    pub fn new(capacity: u32, page_size: u16, slot_capacity: u16) -> Result<Self> {
        if page_size == 0 {
            return Err(FsError::InvalidGeometry("page size is zero".into()));
        }
        if capacity > MAX_U24 {
            return Err(FsError::InvalidGeometry(format!(
                "capacity {capacity} exceeds 24-bit addressing"
            )));
        }
        if slot_capacity == 0 {
            return Err(FsError::InvalidGeometry("no metadata slots".into()));
        }
        let layout = Self {
            capacity,
            page_size,
            slot_capacity,
        };
        if layout.reserved_size() >= capacity {
            return Err(FsError::InvalidGeometry(format!(
                "{slot_capacity} slots need {} bytes, device has {capacity}",
                layout.reserved_size()
            )));
        }
        Ok(layout)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn page_size(&self) -> u16 {
        self.page_size
    }

    pub fn slot_capacity(&self) -> u16 {
        self.slot_capacity
    }

    /// Boot sector plus the metadata table, rounded up to a whole page.
    pub fn reserved_size(&self) -> u32 {
        let raw = BOOT_SECTOR_SIZE as u32 + u32::from(self.slot_capacity) * ENTRY_SIZE as u32;
        let page = u32::from(self.page_size);
        raw.div_ceil(page) * page
    }

    /// Bytes available to file payloads.
    pub fn data_capacity(&self) -> u32 {
        self.capacity - self.reserved_size()
    }

    /// Device offset of metadata slot `slot` (1-based).
    pub fn slot_offset(&self, slot: u16) -> u32 {
        debug_assert!(slot >= 1 && slot <= self.slot_capacity);
        BOOT_SECTOR_SIZE as u32 + u32::from(slot - 1) * ENTRY_SIZE as u32
    }
}

pub fn u24_to_bytes(value: u32) -> [u8; 3] {
    let b = value.to_le_bytes();
    [b[0], b[1], b[2]]
}

pub fn u24_from_bytes(bytes: [u8; 3]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

/// serde adapter packing a `u32` into three little-endian bytes.
pub(crate) mod u24 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &u32, s: S) -> Result<S::Ok, S::Error> {
        if *value > crate::common::MAX_U24 {
            return Err(serde::ser::Error::custom("value exceeds 24 bits"));
        }
        super::u24_to_bytes(*value).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        <[u8; 3]>::deserialize(d).map(super::u24_from_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u24_is_little_endian() {
        assert_eq!(u24_to_bytes(0x0012_3456), [0x56, 0x34, 0x12]);
        assert_eq!(u24_from_bytes([0x56, 0x34, 0x12]), 0x0012_3456);
        assert_eq!(u24_from_bytes(u24_to_bytes(MAX_U24)), MAX_U24);
    }

    #[test]
    fn reserved_size_is_page_aligned() {
        let layout = Layout::new(64 * 1024, 128, 332).unwrap();
        assert_eq!(layout.reserved_size(), 6016);
        assert_eq!(layout.data_capacity(), 64 * 1024 - 6016);

        let layout = Layout::new(512, 16, 6).unwrap();
        assert_eq!(layout.reserved_size(), 144);
    }

    #[test]
    fn slots_follow_the_boot_sector() {
        let layout = Layout::new(4096, 32, 48).unwrap();
        assert_eq!(layout.slot_offset(1), BOOT_SECTOR_SIZE as u32);
        assert_eq!(layout.slot_offset(2), (BOOT_SECTOR_SIZE + ENTRY_SIZE) as u32);
        assert!(layout.slot_offset(48) + ENTRY_SIZE as u32 <= layout.reserved_size());
    }

    #[test]
    fn rejects_tables_larger_than_the_device() {
        assert!(matches!(
            Layout::new(256, 16, 100),
            Err(FsError::InvalidGeometry(_))
        ));
        assert!(Layout::new(MAX_U24 + 1, 64, 8).is_err());
        assert!(Layout::new(4096, 0, 8).is_err());
    }
}
