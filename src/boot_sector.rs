use super::*;
use common::*;
use disk::{u24, Layout};

use serde::{Deserialize, Serialize};

/// Encoded size of a [`BootSector`].
pub const BOOT_SECTOR_SIZE: usize = 24;

/// The superblock, stored at offset 0.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootSector {
    /// Must be SIGNATURE
    pub signature: [u8; SIGNATURE_SIZE],
    /// Must be FS_VERSION
    pub version: u8,
    /// First free byte of the data region
    #[serde(with = "u24")]
    pub last_data_addr: u32,
    /// Device page size at format time
    pub page_size: u16,
    /// Slots ever allocated, tombstoned included
    pub file_count: u16,
    /// Tombstoned slots
    pub deleted_count: u16,
    /// Sum of live payload bytes
    pub bytes_in_use: u32,
    /// Metadata slots reserved between the boot sector and the data region
    pub slot_capacity: u16,
}

impl BootSector {
    /// A freshly formatted boot sector for `layout`.
    pub fn new(layout: &Layout) -> Self {
        Self {
            signature: SIGNATURE,
            version: FS_VERSION,
            last_data_addr: layout.reserved_size(),
            page_size: layout.page_size(),
            file_count: 0,
            deleted_count: 0,
            bytes_in_use: 0,
            slot_capacity: layout.slot_capacity(),
        }
    }

    /// All fields zero, the state after a clean format.
    pub fn zeroed() -> Self {
        Self {
            signature: [0; SIGNATURE_SIZE],
            version: 0,
            last_data_addr: 0,
            page_size: 0,
            file_count: 0,
            deleted_count: 0,
            bytes_in_use: 0,
            slot_capacity: 0,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BOOT_SECTOR_SIZE {
            return Err(FsError::Truncated {
                need: BOOT_SECTOR_SIZE,
                got: bytes.len(),
            });
        }
        Ok(bincode::deserialize(&bytes[..BOOT_SECTOR_SIZE])?)
    }

    pub fn encode(&self) -> Result<[u8; BOOT_SECTOR_SIZE]> {
        let mut buf = [0u8; BOOT_SECTOR_SIZE];
        bincode::serialize_into(&mut buf[..], self)?;
        Ok(buf)
    }

    /// Signature and version match what this build understands.
    pub fn verify(&self) -> bool {
        self.signature == SIGNATURE && self.version == FS_VERSION
    }

    /// Signature matches but the record predates the allocation counters.
    pub fn is_legacy(&self) -> bool {
        self.signature[..SIGNATURE_SIZE - 1] == SIGNATURE[..SIGNATURE_SIZE - 1]
            && self.version == LEGACY_VERSION
    }

    /// The layout this boot sector describes on a device of `capacity` bytes.
    pub fn layout(&self, capacity: u32) -> Result<Layout> {
        Layout::new(capacity, self.page_size, self.slot_capacity)
    }

    /// Counter invariants that must hold on a mounted device.
    pub fn check_invariants(&self, layout: &Layout) -> std::result::Result<(), &'static str> {
        if self.last_data_addr < layout.reserved_size() {
            return Err("data pointer inside the reserved area");
        }
        if self.last_data_addr > layout.capacity() {
            return Err("data pointer past the end of the device");
        }
        if self.deleted_count > self.file_count {
            return Err("more deleted slots than allocated slots");
        }
        if self.file_count > self.slot_capacity {
            return Err("more allocated slots than the table holds");
        }
        if self.bytes_in_use > layout.data_capacity() {
            return Err("bytes in use exceed the data region");
        }
        Ok(())
    }

    pub fn live_count(&self) -> u16 {
        self.file_count - self.deleted_count
    }
}
