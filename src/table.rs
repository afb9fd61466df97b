use super::*;
use block_device::BlockDevice;
use boot_sector::{BootSector, BOOT_SECTOR_SIZE};
use common::*;
use disk::Layout;
use entry::{FileName, MetaEntry, SlotStatus, ENTRY_SIZE};
use logger::{diag, Diag};

use log::Level;
use std::cmp::Reverse;
use std::sync::Arc;

/// Owner of the boot sector and the metadata table of a mounted device.
///
/// Every structural change is written through at once and finished by
/// [`MetaTable::commit`], which re-reads the boot sector to confirm it.
pub struct MetaTable {
    blk_dev: Arc<dyn BlockDevice>,
    boot: BootSector,
    layout: Layout,
    diag: Diag,
}

impl MetaTable {
    /// Read and verify the boot sector of an already formatted device.
    pub fn load(blk_dev: Arc<dyn BlockDevice>, diag: Diag) -> Result<Self> {
        let boot = read_boot(&*blk_dev)?;
        if !boot.verify() {
            if boot.is_legacy() {
                diag!(diag, Level::Warn, "boot sector has legacy layout v{}", boot.version);
                return Err(FsError::LegacyLayout(boot.version));
            }
            diag!(diag, Level::Info, "invalid file system signature");
            return Err(FsError::NotFormatted);
        }
        let layout = boot.layout(blk_dev.capacity()).map_err(|e| {
            diag!(diag, Level::Warn, "boot sector geometry rejected: {e}");
            FsError::NotFormatted
        })?;
        if let Err(why) = boot.check_invariants(&layout) {
            diag!(diag, Level::Warn, "boot sector inconsistent: {why}");
            return Err(FsError::NotFormatted);
        }
        if boot.page_size != blk_dev.page_size() {
            diag!(
                diag,
                Level::Warn,
                "formatted with {}-byte pages, device reports {}",
                boot.page_size,
                blk_dev.page_size()
            );
        }
        Ok(Self {
            blk_dev,
            boot,
            layout,
            diag,
        })
    }

    /// Erase the whole device, then write a fresh boot sector.
    pub fn format(
        blk_dev: Arc<dyn BlockDevice>,
        slot_capacity: u16,
        diag: Diag,
        yield_now: &mut dyn FnMut(u32, u32),
    ) -> Result<Self> {
        let layout = Layout::new(blk_dev.capacity(), blk_dev.page_size(), slot_capacity)?;
        erase_device(&*blk_dev, &diag, yield_now)?;
        let mut table = Self {
            blk_dev,
            boot: BootSector::zeroed(),
            layout,
            diag,
        };
        table.commit(BootSector::new(&layout))?;
        diag!(
            table.diag,
            Level::Info,
            "formatted: {} slots, data region at {:#x}",
            slot_capacity,
            layout.reserved_size()
        );
        Ok(table)
    }

    /// Erase the whole device and leave it without a boot sector.
    pub fn clean(
        blk_dev: &dyn BlockDevice,
        diag: &Diag,
        yield_now: &mut dyn FnMut(u32, u32),
    ) -> Result<()> {
        erase_device(blk_dev, diag, yield_now)
    }

    pub fn boot(&self) -> &BootSector {
        &self.boot
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn file_count(&self) -> u16 {
        self.boot.file_count
    }

    /// Bytes left between the bump pointer and the end of the device.
    pub fn free_bytes(&self) -> u32 {
        self.layout.capacity().saturating_sub(self.boot.last_data_addr)
    }

    /// Live payload as a share of the data region, in percent.
    pub fn usage_percent(&self) -> f32 {
        self.boot.bytes_in_use as f32 * 100.0 / self.layout.data_capacity() as f32
    }

    pub fn read_entry(&self, slot: u16) -> Result<MetaEntry> {
        if slot == 0 || slot > self.layout.slot_capacity() {
            return Err(FsError::BrokenChain(slot));
        }
        let mut buf = [0u8; ENTRY_SIZE];
        self.blk_dev
            .read_bytes(self.layout.slot_offset(slot), &mut buf)?;
        MetaEntry::decode(&buf)
    }

    fn write_entry(&self, slot: u16, entry: &MetaEntry) -> Result<()> {
        diag!(self.diag, Level::Trace, "slot {slot} <- {entry:?}");
        self.blk_dev
            .write_bytes(self.layout.slot_offset(slot), &entry.encode()?)
    }

    /// Every live head entry, in slot order.
    pub fn live_heads(&self) -> Result<Vec<(u16 /* slot */, MetaEntry)>> {
        let mut heads = Vec::new();
        for slot in 1..=self.boot.file_count {
            let entry = self.read_entry(slot)?;
            if entry.is_live() && entry.is_head() {
                heads.push((slot, entry));
            }
        }
        Ok(heads)
    }

    /// `head` followed by every entry reachable through `link`.
    pub fn chain(&self, head: u16) -> Result<Vec<(u16 /* slot */, MetaEntry)>> {
        let mut chain = Vec::new();
        let mut slot = head;
        loop {
            let walked_too_far = chain.len() >= usize::from(self.boot.file_count);
            if slot == NO_LINK || slot > self.boot.file_count || walked_too_far {
                diag!(self.diag, Level::Warn, "chain from slot {head} breaks at {slot}");
                return Err(FsError::BrokenChain(slot));
            }
            let entry = self.read_entry(slot)?;
            chain.push((slot, entry));
            if entry.link == NO_LINK {
                return Ok(chain);
            }
            slot = entry.link;
        }
    }

    /// Contents of the file at `head`, blocks concatenated in link order.
    pub fn read_data(&self, head: u16) -> Result<Vec<u8>> {
        let chain = self.chain(head)?;
        let total: usize = chain.iter().map(|(_, e)| e.size as usize).sum();
        let mut data = vec![0u8; total];
        let mut at = 0usize;
        for (_, entry) in &chain {
            let len = entry.size as usize;
            self.blk_dev.read_bytes(entry.start, &mut data[at..at + len])?;
            at += len;
        }
        Ok(data)
    }

    /// Bump-allocate `data` as a new file named `name`; returns its head slot.
    ///
    /// Payloads longer than `block_limit` become a chain of blocks. Tombstoned
    /// slots and freed byte ranges are never reused.
    pub fn allocate(&mut self, name: FileName, data: &[u8], block_limit: u32) -> Result<u16> {
        let blocks = split_blocks(data, block_limit);
        self.reserve(data.len(), blocks.len())?;

        let first = self.boot.file_count + 1;
        let addr = self.write_blocks(first, Some(name), &blocks)?;

        let mut next = self.boot;
        next.file_count += blocks.len() as u16;
        next.last_data_addr = addr;
        next.bytes_in_use += data.len() as u32;
        self.commit(next)?;
        diag!(
            self.diag,
            Level::Debug,
            "{name}: slot {first}, {} bytes in {} block(s)",
            data.len(),
            blocks.len()
        );
        Ok(first)
    }

    /// Grow the file at `head` with continuation blocks holding `data`.
    pub fn append(&mut self, head: u16, data: &[u8], block_limit: u32) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let chain = self.chain(head)?;
        let (tail_slot, mut tail) = chain[chain.len() - 1];
        let blocks = split_blocks(data, block_limit);
        self.reserve(data.len(), blocks.len())?;

        let first = self.boot.file_count + 1;
        let addr = self.write_blocks(first, None, &blocks)?;

        let mut next = self.boot;
        next.file_count += blocks.len() as u16;
        next.last_data_addr = addr;
        next.bytes_in_use += data.len() as u32;
        self.commit(next)?;

        // the tail may only point at slots the boot sector has committed
        tail.link = first;
        self.write_entry(tail_slot, &tail).map_err(|e| {
            diag!(self.diag, Level::Warn, "relinking slot {tail_slot} failed: {e}");
            FsError::PartialWriteFailure("continuation committed, link update failed")
        })?;
        diag!(
            self.diag,
            Level::Debug,
            "slot {head}: appended {} bytes at slot {first}",
            data.len()
        );
        Ok(())
    }

    /// Tombstone `head` and its whole chain, then reclaim what sits at the tail.
    pub fn free(&mut self, head: u16) -> Result<()> {
        let chain = self.chain(head)?;
        let mut next = self.boot;
        self.tombstone(&chain, &mut next)?;
        let reclaimed = self.boot.last_data_addr - next.last_data_addr;
        self.commit(next)?;
        diag!(
            self.diag,
            Level::Debug,
            "slot {head}: freed {} block(s), {reclaimed} bytes reclaimed",
            chain.len()
        );
        Ok(())
    }

    /// Replace the contents of the file at `head`; returns the head slot now
    /// holding them.
    ///
    /// Data that fits the head block is rewritten in place and the block
    /// shrinks. Anything larger is freed and allocated anew; if that second
    /// step fails the old contents are already gone.
    pub fn update(&mut self, head: u16, data: &[u8], block_limit: u32) -> Result<u16> {
        let chain = self.chain(head)?;
        let (_, first) = chain[0];
        if data.len() as u64 <= u64::from(first.size) {
            self.rewrite_in_place(head, first, &chain[1..], data)?;
            return Ok(head);
        }
        let name = first.filename;
        self.free(head)?;
        self.allocate(name, data, block_limit).map_err(|e| {
            diag!(self.diag, Level::Warn, "{name}: freed for reallocation, allocate failed: {e}");
            e
        })
    }

    fn rewrite_in_place(
        &mut self,
        head: u16,
        first: MetaEntry,
        rest: &[(u16, MetaEntry)],
        data: &[u8],
    ) -> Result<()> {
        let len = data.len() as u32;
        self.blk_dev.write_bytes(first.start, data)?;

        let mut shrunk = first;
        shrunk.size = len;
        shrunk.link = NO_LINK;
        self.write_entry(head, &shrunk).map_err(|e| {
            diag!(self.diag, Level::Warn, "slot {head}: payload rewritten, entry update failed: {e}");
            FsError::PartialWriteFailure("payload rewritten, metadata update failed")
        })?;

        let mut next = self.boot;
        self.tombstone(rest, &mut next)?;
        if first.end() == next.last_data_addr {
            next.last_data_addr = first.start + len;
        }
        next.bytes_in_use = next.bytes_in_use.saturating_sub(first.size) + len;
        self.commit(next)?;
        diag!(
            self.diag,
            Level::Debug,
            "slot {head}: rewritten in place, {} -> {len} bytes",
            first.size
        );
        Ok(())
    }

    /// Mark `blocks` tombstoned with their links cleared and account for them
    /// in `next`, including trailing compaction.
    fn tombstone(&self, blocks: &[(u16, MetaEntry)], next: &mut BootSector) -> Result<()> {
        for (n, (slot, entry)) in blocks.iter().enumerate() {
            let mut dead = *entry;
            dead.status = SlotStatus::Tombstoned;
            dead.link = NO_LINK;
            self.write_entry(*slot, &dead).map_err(|e| {
                if n == 0 {
                    return e;
                }
                diag!(self.diag, Level::Warn, "slot {slot}: tombstoning stopped midway: {e}");
                FsError::PartialWriteFailure("chain partially tombstoned")
            })?;
            if entry.is_live() {
                next.deleted_count += 1;
                next.bytes_in_use = next.bytes_in_use.saturating_sub(entry.size);
            }
        }

        let mut freed: Vec<MetaEntry> = blocks
            .iter()
            .map(|(_, e)| *e)
            .filter(MetaEntry::is_live)
            .collect();
        freed.sort_unstable_by_key(|e| Reverse(e.end()));
        for entry in freed {
            if entry.end() == next.last_data_addr {
                next.last_data_addr = entry.start;
            }
        }
        Ok(())
    }

    fn reserve(&self, len: usize, blocks: usize) -> Result<()> {
        let free = self.free_bytes();
        if len as u64 > u64::from(free) {
            return Err(FsError::OutOfSpace {
                need: len.min(u32::MAX as usize) as u32,
                free,
            });
        }
        let slots = usize::from(self.layout.slot_capacity());
        if usize::from(self.boot.file_count) + blocks > slots {
            return Err(FsError::TableFull(self.layout.slot_capacity()));
        }
        Ok(())
    }

    /// Write one entry and one payload per block starting at slot `first` and
    /// the bump pointer; the first entry is a head when `name` is given.
    /// Returns the new bump pointer.
    fn write_blocks(&self, first: u16, name: Option<FileName>, blocks: &[&[u8]]) -> Result<u32> {
        let mut addr = self.boot.last_data_addr;
        for (n, block) in blocks.iter().enumerate() {
            let slot = first + n as u16;
            let size = block.len() as u32;
            let mut entry = match name {
                Some(name) if n == 0 => MetaEntry::head(name, addr, size),
                _ => MetaEntry::continuation(addr, size),
            };
            if n + 1 < blocks.len() {
                entry.link = slot + 1;
            }
            self.write_entry(slot, &entry)?;
            if let Err(e) = self.blk_dev.write_bytes(addr, block) {
                diag!(self.diag, Level::Warn, "slot {slot}: payload at {addr:#x} failed: {e}");
                return Err(FsError::PartialWriteFailure(
                    "metadata written, payload write failed",
                ));
            }
            addr += size;
        }
        Ok(addr)
    }

    /// Persist `next` and read it back. On any mismatch the in-memory copy
    /// follows what the device actually holds.
    fn commit(&mut self, next: BootSector) -> Result<()> {
        let written = next
            .encode()
            .and_then(|bytes| self.blk_dev.write_bytes(0, &bytes));
        match (written, read_boot(&*self.blk_dev)) {
            (Ok(()), Ok(on_disk)) if on_disk == next => {
                self.boot = next;
                Ok(())
            }
            (Ok(()), Ok(on_disk)) => {
                diag!(self.diag, Level::Warn, "boot sector read back differs from the write");
                self.restore(on_disk);
                Err(FsError::PartialWriteFailure("boot sector read back differs"))
            }
            (Err(e), Ok(on_disk)) => {
                diag!(self.diag, Level::Warn, "boot sector write failed: {e}");
                self.restore(on_disk);
                Err(e)
            }
            (_, Err(e)) => {
                diag!(self.diag, Level::Warn, "boot sector unreadable after write: {e}");
                Err(e)
            }
        }
    }

    fn restore(&mut self, on_disk: BootSector) {
        if !on_disk.verify() {
            diag!(self.diag, Level::Warn, "re-read boot sector invalid, counters kept");
            return;
        }
        match on_disk.check_invariants(&self.layout) {
            Ok(()) => self.boot = on_disk,
            Err(why) => {
                diag!(self.diag, Level::Warn, "re-read boot sector inconsistent ({why}), counters kept");
            }
        }
    }
}

fn read_boot(blk_dev: &dyn BlockDevice) -> Result<BootSector> {
    let mut buf = [0u8; BOOT_SECTOR_SIZE];
    blk_dev.read_bytes(0, &mut buf)?;
    BootSector::decode(&buf)
}

fn erase_device(
    blk_dev: &dyn BlockDevice,
    diag: &Diag,
    yield_now: &mut dyn FnMut(u32, u32),
) -> Result<()> {
    let capacity = blk_dev.capacity();
    diag!(diag, Level::Info, "erasing {capacity} bytes");
    blk_dev.erase_range(0, capacity, yield_now).map_err(|e| {
        diag!(diag, Level::Warn, "erase failed: {e}");
        e
    })
}

/// At least one block, so empty files still own a head entry.
fn split_blocks(data: &[u8], block_limit: u32) -> Vec<&[u8]> {
    if data.is_empty() {
        return vec![data];
    }
    data.chunks(block_limit.max(1) as usize).collect()
}
