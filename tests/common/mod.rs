//! Shared helpers for the integration tests.
#![allow(dead_code)]

use mjoln::{BlockDevice, FsConfig, FsError, MjolnFs, RamDisk, Result, BOOT_SECTOR_SIZE};

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Device geometry most tests run on: 4 KiB in 32-byte pages.
pub const CAPACITY: u32 = 4096;
pub const PAGE: u16 = 32;

/// Route the crate's diagnostics to the test output, `RUST_LOG` controls them.
pub fn logger() -> Arc<dyn log::Log> {
    Arc::new(env_logger::builder().is_test(true).build())
}

/// A [`RamDisk`] that can be told to misbehave.
pub struct FaultyDisk {
    inner: RamDisk,
    /// writes touching this address or above fail
    fail_from: AtomicU32,
    /// writes to the boot sector are acknowledged but not stored
    drop_boot: AtomicBool,
    /// boot sector writes land with the data pointer past the device end
    skew_boot: AtomicBool,
}

impl FaultyDisk {
    pub fn new(capacity: u32, page_size: u16) -> Self {
        Self {
            inner: RamDisk::new(capacity, page_size),
            fail_from: AtomicU32::new(u32::MAX),
            drop_boot: AtomicBool::new(false),
            skew_boot: AtomicBool::new(false),
        }
    }

    pub fn fail_writes_from(&self, addr: u32) {
        self.fail_from.store(addr, Ordering::SeqCst);
    }

    pub fn drop_boot_writes(&self, on: bool) {
        self.drop_boot.store(on, Ordering::SeqCst);
    }

    pub fn skew_boot_writes(&self, on: bool) {
        self.skew_boot.store(on, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_writes_from(u32::MAX);
        self.drop_boot_writes(false);
        self.skew_boot_writes(false);
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.snapshot()
    }
}

impl BlockDevice for FaultyDisk {
    fn capacity(&self) -> u32 {
        self.inner.capacity()
    }

    fn page_size(&self) -> u16 {
        self.inner.page_size()
    }

    fn read_page(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.inner.read_page(addr, buf)
    }

    fn write_page(&self, addr: u32, buf: &[u8]) -> Result<()> {
        let end = addr + buf.len() as u32;
        if end > self.fail_from.load(Ordering::SeqCst) {
            return Err(FsError::DeviceIo(io::Error::new(
                io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        let boot = (addr as usize) < BOOT_SECTOR_SIZE;
        if boot && self.drop_boot.load(Ordering::SeqCst) {
            return Ok(());
        }
        if boot && addr == 0 && buf.len() >= 12 && self.skew_boot.load(Ordering::SeqCst) {
            // signature and version intact, last_data_addr = 0xFFFFFF
            let mut skewed = buf.to_vec();
            skewed[9..12].fill(0xFF);
            return self.inner.write_page(addr, &skewed);
        }
        self.inner.write_page(addr, buf)
    }
}

pub fn quiet(fs: MjolnFs) -> MjolnFs {
    fs.with_yield_hook(|_, _| {})
}

/// A freshly formatted file system on a 4 KiB RAM disk.
pub fn formatted(config: FsConfig) -> (Arc<RamDisk>, MjolnFs) {
    let dev = Arc::new(RamDisk::new(CAPACITY, PAGE));
    let mut fs = quiet(MjolnFs::new(dev.clone(), config)).with_logger(logger());
    fs.format().unwrap();
    (dev, fs)
}

/// A second facade over the same device, mounted from scratch.
pub fn remount(dev: Arc<dyn BlockDevice>, config: FsConfig) -> MjolnFs {
    let mut fs = quiet(MjolnFs::new(dev, config)).with_logger(logger());
    fs.mount().unwrap();
    fs
}

pub fn small() -> FsConfig {
    FsConfig::default().with_slot_capacity(32)
}
