use super::*;
use block_device::BlockDevice;
use boot_sector::BootSector;
use common::*;
use config::FsConfig;
use entry::{FileName, MetaEntry};
use logger::{diag, Diag};
use lookup::LookupIndex;
use table::MetaTable;

use log::Level;
use std::fmt;
use std::sync::Arc;

/// Called as `(bytes_done, bytes_total)` after every erased page.
pub type YieldHook = Box<dyn FnMut(u32, u32) + Send>;

struct Mounted {
    table: MetaTable,
    index: LookupIndex,
}

/// The file system facade.
///
/// Starts unmounted; [`mount`](Self::mount) or [`format`](Self::format)
/// make it usable. Every file operation on an unmounted instance fails with
/// [`FsError::NotInitialized`]. Operations run to completion and are not
/// synchronised, callers serialise access.
pub struct MjolnFs {
    blk_dev: Arc<dyn BlockDevice>,
    config: FsConfig,
    diag: Diag,
    yield_hook: YieldHook,
    mounted: Option<Mounted>,
}

impl MjolnFs {
    pub fn new(blk_dev: Arc<dyn BlockDevice>, config: FsConfig) -> Self {
        Self {
            blk_dev,
            config,
            diag: Diag::silent(),
            yield_hook: Box::new(|_, _| std::thread::yield_now()),
            mounted: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn log::Log>) -> Self {
        self.diag = Diag::new(logger);
        self
    }

    /// Replace the hook run between erased pages (default: yield the thread).
    pub fn with_yield_hook(mut self, hook: impl FnMut(u32, u32) + Send + 'static) -> Self {
        self.yield_hook = Box::new(hook);
        self
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    /// Verify the boot sector and build the lookup index.
    pub fn mount(&mut self) -> Result<FsInfo> {
        self.mounted = None;
        let table = MetaTable::load(self.blk_dev.clone(), self.diag.clone())?;
        let index = LookupIndex::build(&table, self.config.cache_threshold)?;
        let mounted = self.mounted.insert(Mounted { table, index });
        let live = mounted.table.boot().live_count();
        let info = FsInfo::collect(mounted);
        diag!(
            self.diag,
            Level::Info,
            "mounted: {} live file slot(s), {} bytes in use, index {}",
            live,
            info.bytes_in_use,
            if info.load_balanced { "load-balanced" } else { "full" }
        );
        Ok(info)
    }

    /// Erase the device and write a fresh, empty file system.
    pub fn format(&mut self) -> Result<()> {
        self.mounted = None;
        let table = MetaTable::format(
            self.blk_dev.clone(),
            self.config.slot_capacity,
            self.diag.clone(),
            &mut *self.yield_hook,
        )?;
        let index = LookupIndex::build(&table, self.config.cache_threshold)?;
        self.mounted = Some(Mounted { table, index });
        Ok(())
    }

    /// Erase the device without writing a boot sector; [`format`](Self::format)
    /// must follow before the device can be mounted again.
    pub fn clean_format(&mut self) -> Result<()> {
        self.mounted = None;
        MetaTable::clean(&*self.blk_dev, &self.diag, &mut *self.yield_hook)
    }

    pub fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let limit = self.config.effective_block_limit();
        let m = mounted_mut(&mut self.mounted)?;
        let name = FileName::new(name)?;
        if m.index.find(&m.table, &name)?.is_some() {
            return Err(FsError::FileAlreadyExists(name.to_string()));
        }
        let slot = m.table.allocate(name, data, limit)?;
        m.index.insert(name, slot);
        Ok(())
    }

    /// An empty file.
    pub fn create_file(&mut self, name: &str) -> Result<()> {
        self.write_file(name, &[])
    }

    /// Whole contents of `name`, every chained block in link order.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let m = mounted(&self.mounted)?;
        let (slot, _) = resolve(m, name)?;
        m.table.read_data(slot)
    }

    pub fn update_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let limit = self.config.effective_block_limit();
        let m = mounted_mut(&mut self.mounted)?;
        let (slot, head) = resolve(m, name)?;
        let new_slot = m.table.update(slot, data, limit)?;
        if new_slot != slot {
            m.index.insert(head.filename, new_slot);
        }
        Ok(())
    }

    /// Add `data` to the end of `name` as a new linked block.
    pub fn append_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let limit = self.config.effective_block_limit();
        let m = mounted_mut(&mut self.mounted)?;
        let (slot, _) = resolve(m, name)?;
        m.table.append(slot, data, limit)
    }

    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        let m = mounted_mut(&mut self.mounted)?;
        let (slot, _) = resolve(m, name)?;
        m.table.free(slot)
    }

    /// Names of the live files, in slot order.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let m = mounted(&self.mounted)?;
        Ok(m.table
            .live_heads()?
            .into_iter()
            .map(|(_, e)| e.filename.to_string())
            .collect())
    }

    /// Live payload bytes.
    pub fn bytes_used(&self) -> Result<u32> {
        Ok(mounted(&self.mounted)?.table.boot().bytes_in_use)
    }

    /// Live payload as a share of the data region, in percent.
    pub fn storage_usage_percent(&self) -> Result<f32> {
        Ok(mounted(&self.mounted)?.table.usage_percent())
    }

    pub fn info(&self) -> Result<FsInfo> {
        Ok(FsInfo::collect(mounted(&self.mounted)?))
    }

    pub fn file_info(&self, name: &str) -> Result<FileInfo> {
        let m = mounted(&self.mounted)?;
        let (slot, head) = resolve(m, name)?;
        let blocks = m
            .table
            .chain(slot)?
            .into_iter()
            .map(|(slot, e)| BlockInfo {
                slot,
                start: e.start,
                size: e.size,
            })
            .collect();
        Ok(FileInfo {
            name: head.filename.to_string(),
            blocks,
        })
    }

    /// Raw metadata slot, for diagnostics.
    pub fn slot(&self, slot: u16) -> Result<MetaEntry> {
        mounted(&self.mounted)?.table.read_entry(slot)
    }

    /// In-memory copy of the boot sector, when mounted.
    pub fn boot_sector(&self) -> Option<BootSector> {
        self.mounted.as_ref().map(|m| *m.table.boot())
    }

    pub fn lookup_index(&self) -> Option<&LookupIndex> {
        self.mounted.as_ref().map(|m| &m.index)
    }
}

fn mounted(m: &Option<Mounted>) -> Result<&Mounted> {
    m.as_ref().ok_or(FsError::NotInitialized)
}

fn mounted_mut(m: &mut Option<Mounted>) -> Result<&mut Mounted> {
    m.as_mut().ok_or(FsError::NotInitialized)
}

fn resolve(m: &Mounted, name: &str) -> Result<(u16, MetaEntry)> {
    let name = FileName::new(name)?;
    m.index
        .find(&m.table, &name)?
        .ok_or_else(|| FsError::FileNotFound(name.to_string()))
}

/// Snapshot of the counters, rendered by `Display` as the info report.
#[derive(Clone, Debug, PartialEq)]
pub struct FsInfo {
    pub version: u8,
    pub signature: String,
    pub page_size: u16,
    pub capacity: u32,
    pub reserved: u32,
    pub slot_capacity: u16,
    pub file_count: u16,
    pub deleted_count: u16,
    pub bytes_in_use: u32,
    pub last_data_addr: u32,
    /// freed bytes below the bump pointer that trailing compaction could not reclaim
    pub leaked: u32,
    pub usage_percent: f32,
    pub load_balanced: bool,
}

impl FsInfo {
    fn collect(m: &Mounted) -> Self {
        let boot = m.table.boot();
        let layout = m.table.layout();
        let sig_len = boot
            .signature
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(SIGNATURE_SIZE);
        let high_water = boot.last_data_addr.saturating_sub(layout.reserved_size());
        Self {
            version: boot.version,
            signature: String::from_utf8_lossy(&boot.signature[..sig_len]).into_owned(),
            page_size: boot.page_size,
            capacity: layout.capacity(),
            reserved: layout.reserved_size(),
            slot_capacity: boot.slot_capacity,
            file_count: boot.file_count,
            deleted_count: boot.deleted_count,
            bytes_in_use: boot.bytes_in_use,
            last_data_addr: boot.last_data_addr,
            leaked: high_water.saturating_sub(boot.bytes_in_use),
            usage_percent: m.table.usage_percent(),
            load_balanced: m.index.is_load_balanced(),
        }
    }
}

impl fmt::Display for FsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mjoln File System")?;
        writeln!(f, "-----------------")?;
        writeln!(f, "File system version: {}", self.version)?;
        writeln!(f, "File system signature: {}", self.signature)?;
        writeln!(f, "Page size: {}", self.page_size)?;
        writeln!(f, "Last data address: {}", self.last_data_addr)?;
        writeln!(
            f,
            "Slots: {} used ({} deleted) of {}",
            self.file_count, self.deleted_count, self.slot_capacity
        )?;
        writeln!(
            f,
            "Lookup: {}",
            if self.load_balanced { "load-balanced" } else { "full cache" }
        )?;
        writeln!(f)?;
        writeln!(f, "STORAGE USAGE")?;
        writeln!(f, "-------------")?;
        writeln!(f, "{:.2}% used from available space.", self.usage_percent)?;
        writeln!(f, "{} bytes in use, {} bytes lost to fragmentation.", self.bytes_in_use, self.leaked)?;
        write!(
            f,
            "Total: {} bytes, {} bytes reserved by file system.",
            self.capacity, self.reserved
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub slot: u16,
    pub start: u32,
    pub size: u32,
}

/// Where a file lives: its head block first, then the continuations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub blocks: Vec<BlockInfo>,
}

impl FileInfo {
    pub fn head_slot(&self) -> u16 {
        self.blocks[0].slot
    }

    pub fn start(&self) -> u32 {
        self.blocks[0].start
    }

    pub fn size(&self) -> u32 {
        self.blocks.iter().map(|b| b.size).sum()
    }
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File name: {}", self.name)?;
        writeln!(f, "File size: {}", self.size())?;
        writeln!(f, "File start address: {}", self.start())?;
        write!(f, "Blocks:")?;
        for b in &self.blocks {
            write!(f, " [slot {} @{} +{}]", b.slot, b.start, b.size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_device::RamDisk;

    fn fresh() -> MjolnFs {
        let dev = Arc::new(RamDisk::new(2048, 32));
        let mut fs = MjolnFs::new(dev, FsConfig::default().with_slot_capacity(24))
            .with_yield_hook(|_, _| {});
        fs.format().unwrap();
        fs
    }

    #[test]
    fn unmounted_operations_fail() {
        let fs = MjolnFs::new(Arc::new(RamDisk::new(2048, 32)), FsConfig::default());
        assert!(matches!(fs.read_file("a"), Err(FsError::NotInitialized)));
        assert!(matches!(fs.list_files(), Err(FsError::NotInitialized)));
        assert!(matches!(fs.bytes_used(), Err(FsError::NotInitialized)));
        assert!(fs.boot_sector().is_none());
    }

    #[test]
    fn mount_of_blank_device_fails() {
        let mut fs = MjolnFs::new(Arc::new(RamDisk::new(2048, 32)), FsConfig::default());
        assert!(matches!(fs.mount(), Err(FsError::NotFormatted)));
        assert!(!fs.is_mounted());
    }

    #[test]
    fn file_info_lists_blocks() {
        let mut fs = fresh();
        fs.write_file("a", b"12345").unwrap();
        fs.append_file("a", b"678").unwrap();
        let info = fs.file_info("a").unwrap();
        assert_eq!(info.head_slot(), 1);
        assert_eq!(info.size(), 8);
        assert_eq!(info.blocks.len(), 2);
        assert_eq!(info.blocks[1].start, info.start() + 5);
        assert!(info.to_string().contains("File size: 8"));
    }

    #[test]
    fn info_tracks_leaked_bytes() {
        let mut fs = fresh();
        fs.write_file("a", &[0; 10]).unwrap();
        fs.write_file("b", &[0; 10]).unwrap();
        fs.delete_file("a").unwrap();
        let info = fs.info().unwrap();
        assert_eq!(info.bytes_in_use, 10);
        assert_eq!(info.leaked, 10);
        assert_eq!(info.signature, "MjolnFS");
        assert!(info.to_string().contains("STORAGE USAGE"));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut fs = fresh();
        assert!(matches!(
            fs.write_file("toolongname", b"x"),
            Err(FsError::InvalidName(_))
        ));
        assert!(matches!(fs.write_file("", b"x"), Err(FsError::InvalidName(_))));
    }
}
