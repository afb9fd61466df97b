use super::*;
use common::*;

use std::any::Any;
use std::sync::Mutex;

/// Byte-addressable, page-organised persistent memory.
///
/// Implementors only move single pages; the provided methods split longer
/// transfers at page boundaries the way the bus requires.
pub trait BlockDevice: Send + Sync + Any {
    /// Size of the device in bytes.
    fn capacity(&self) -> u32;

    /// Size of one page in bytes.
    fn page_size(&self) -> u16;

    /// `buf` never crosses a page boundary.
    fn read_page(&self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// `buf` never crosses a page boundary.
    fn write_page(&self, addr: u32, buf: &[u8]) -> Result<()>;

    fn erase_value(&self) -> u8 {
        ERASED_BYTE
    }

    fn read_bytes(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        check_range(self.capacity(), addr, buf.len())?;
        let page = u32::from(self.page_size().max(1));
        let mut done = 0usize;
        while done < buf.len() {
            let at = addr + done as u32;
            let chunk = ((page - at % page) as usize).min(buf.len() - done);
            self.read_page(at, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    fn write_bytes(&self, addr: u32, data: &[u8]) -> Result<()> {
        check_range(self.capacity(), addr, data.len())?;
        let page = u32::from(self.page_size().max(1));
        let mut done = 0usize;
        while done < data.len() {
            let at = addr + done as u32;
            let chunk = ((page - at % page) as usize).min(data.len() - done);
            self.write_page(at, &data[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    /// Fill `len` bytes with the erase value, one page per bus transaction.
    ///
    /// `yield_now(done, total)` runs after every page so a cooperative
    /// scheduler gets the CPU back; the erase itself is not cancellable.
    fn erase_range(
        &self,
        addr: u32,
        len: u32,
        yield_now: &mut dyn FnMut(u32, u32),
    ) -> Result<()> {
        check_range(self.capacity(), addr, len as usize)?;
        let page = u32::from(self.page_size().max(1));
        let blank = vec![self.erase_value(); page as usize];
        let mut done = 0u32;
        while done < len {
            let at = addr + done;
            let chunk = (page - at % page).min(len - done);
            self.write_page(at, &blank[..chunk as usize])?;
            done += chunk;
            yield_now(done, len);
        }
        Ok(())
    }
}

fn check_range(capacity: u32, addr: u32, len: usize) -> Result<()> {
    let end = u64::from(addr) + len as u64;
    if end > u64::from(capacity) {
        return Err(FsError::OutOfBounds { addr, len });
    }
    Ok(())
}

/// A device held entirely in memory, erased on creation.
pub struct RamDisk {
    bytes: Mutex<Vec<u8>>,
    page_size: u16,
}

impl RamDisk {
    pub fn new(capacity: u32, page_size: u16) -> Self {
        Self {
            bytes: Mutex::new(vec![ERASED_BYTE; capacity as usize]),
            page_size,
        }
    }

    pub fn for_model(model: DeviceModel) -> Self {
        Self::new(model.capacity(), model.page_size())
    }

    /// Copy of the raw device contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        // a poisoned lock still guards consistent bytes
        self.bytes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_page(&self, addr: u32, len: usize) -> Result<()> {
        let page = usize::from(self.page_size.max(1));
        if (addr as usize % page) + len > page {
            return Err(FsError::OutOfBounds { addr, len });
        }
        Ok(())
    }
}

impl BlockDevice for RamDisk {
    fn capacity(&self) -> u32 {
        self.lock().len() as u32
    }

    fn page_size(&self) -> u16 {
        self.page_size
    }

    fn read_page(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.check_page(addr, buf.len())?;
        let bytes = self.lock();
        let start = addr as usize;
        let src = bytes
            .get(start..start + buf.len())
            .ok_or(FsError::OutOfBounds { addr, len: buf.len() })?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_page(&self, addr: u32, buf: &[u8]) -> Result<()> {
        self.check_page(addr, buf.len())?;
        let mut bytes = self.lock();
        let start = addr as usize;
        let dst = bytes
            .get_mut(start..start + buf.len())
            .ok_or(FsError::OutOfBounds { addr, len: buf.len() })?;
        dst.copy_from_slice(buf);
        Ok(())
    }
}
