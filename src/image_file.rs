use super::*;
use block_device::BlockDevice;
use common::*;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// A device image kept in a host file, one byte per device byte.
pub struct ImageFile {
    file: Mutex<File>,
    capacity: u32,
    page_size: u16,
}

impl ImageFile {
    /// Open an existing image; its length is the device capacity.
    pub fn open(path: impl AsRef<Path>, page_size: u16) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len > u64::from(MAX_U24) {
            return Err(FsError::InvalidGeometry(format!(
                "image of {len} bytes exceeds 24-bit addressing"
            )));
        }
        Ok(Self {
            file: Mutex::new(file),
            capacity: len as u32,
            page_size,
        })
    }

    /// Create (or truncate) an image of `capacity` erased bytes.
    pub fn create(path: impl AsRef<Path>, capacity: u32, page_size: u16) -> Result<Self> {
        if capacity > MAX_U24 {
            return Err(FsError::InvalidGeometry(format!(
                "capacity {capacity} exceeds 24-bit addressing"
            )));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&vec![ERASED_BYTE; capacity as usize])?;
        file.flush()?;
        Ok(Self {
            file: Mutex::new(file),
            capacity,
            page_size,
        })
    }

    /// Open `path`, creating an erased image of the model's size if missing.
    pub fn open_or_create(path: impl AsRef<Path>, model: DeviceModel) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path, model.page_size())
        } else {
            Self::create(path, model.capacity(), model.page_size())
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockDevice for ImageFile {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn page_size(&self) -> u16 {
        self.page_size
    }

    fn read_page(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let mut file = self.lock();
        file.seek(SeekFrom::Start(u64::from(addr)))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, addr: u32, buf: &[u8]) -> Result<()> {
        let mut file = self.lock();
        file.seek(SeekFrom::Start(u64::from(addr)))?;
        file.write_all(buf)?;
        Ok(())
    }
}
