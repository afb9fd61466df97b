//! Mjoln: a flat file system for small page-addressed EEPROMs.
//!
//! A boot sector and a fixed metadata table sit at the bottom of the device,
//! file data is bump-allocated above them. See [`disk`] for the byte layout.

mod block_device; // page-addressed storage
mod boot_sector;
mod common; // on-disk constants and device models
mod config;
pub mod disk;
mod entry; // metadata table records
mod error;
mod fs; // file system facade
mod image_file;
mod logger;
mod lookup; // name -> slot cache
mod table; // allocation and metadata table
pub mod terminal;

pub use block_device::{BlockDevice, RamDisk};
pub use boot_sector::{BootSector, BOOT_SECTOR_SIZE};
pub use common::{
    DeviceModel, CACHE_THRESHOLD, ERASED_BYTE, FS_VERSION, LEGACY_VERSION, MAX_U24, NAME_LEN,
    NO_LINK, SIGNATURE,
};
pub use config::FsConfig;
pub use disk::Layout;
pub use entry::{FileName, MetaEntry, SlotStatus, ENTRY_SIZE};
pub use error::{FsError, Result};
pub use fs::{BlockInfo, FileInfo, FsInfo, MjolnFs, YieldHook};
pub use image_file::ImageFile;
pub use logger::Diag;
pub use lookup::LookupIndex;
pub use table::MetaTable;
