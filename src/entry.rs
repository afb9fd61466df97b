use super::*;
use common::*;
use disk::u24;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoded size of a [`MetaEntry`].
pub const ENTRY_SIZE: usize = 18;

const LIVE: u8 = 0x01;
const TOMBSTONED: u8 = 0x00;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    Live,
    Tombstoned,
}

/// A validated file name: 1..=8 bytes, no NUL, no whitespace.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileName([u8; NAME_FIELD]);

impl FileName {
    pub fn new(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        let bad = bytes.is_empty()
            || bytes.len() > NAME_LEN
            || bytes.iter().any(|b| *b == 0 || b.is_ascii_whitespace());
        if bad {
            return Err(FsError::InvalidName(name.to_string()));
        }
        let mut field = [0u8; NAME_FIELD];
        field[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(field))
    }

    /// No name, as carried by continuation entries.
    pub const fn empty() -> Self {
        Self([0; NAME_FIELD])
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
        &self.0[..len]
    }

    fn terminate(&mut self) {
        self.0[NAME_LEN] = 0;
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string())
    }
}

/// One metadata slot: a block of a file.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetaEntry {
    /// Device offset of the block
    #[serde(with = "u24")]
    pub start: u32,
    /// Bytes in this block
    #[serde(with = "u24")]
    pub size: u32,
    /// Only set on the head of a chain
    pub filename: FileName,
    /// Next slot of the chain, NO_LINK at the end
    pub link: u16,
    #[serde(with = "status_byte")]
    pub status: SlotStatus,
}

impl MetaEntry {
    pub fn head(name: FileName, start: u32, size: u32) -> Self {
        Self {
            start,
            size,
            filename: name,
            link: NO_LINK,
            status: SlotStatus::Live,
        }
    }

    pub fn continuation(start: u32, size: u32) -> Self {
        Self::head(FileName::empty(), start, size)
    }

    pub fn is_live(&self) -> bool {
        self.status == SlotStatus::Live
    }

    pub fn is_head(&self) -> bool {
        !self.filename.is_empty()
    }

    pub fn end(&self) -> u32 {
        self.start + self.size
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENTRY_SIZE {
            return Err(FsError::Truncated {
                need: ENTRY_SIZE,
                got: bytes.len(),
            });
        }
        let mut entry: Self = bincode::deserialize(&bytes[..ENTRY_SIZE])?;
        entry.filename.terminate();
        Ok(entry)
    }

    pub fn encode(&self) -> Result<[u8; ENTRY_SIZE]> {
        let mut buf = [0u8; ENTRY_SIZE];
        bincode::serialize_into(&mut buf[..], self)?;
        Ok(buf)
    }
}

/// Live is exactly 0x01; any other byte (erased 0xFF included) reads as tombstoned.
mod status_byte {
    use super::{SlotStatus, LIVE, TOMBSTONED};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &SlotStatus, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(match status {
            SlotStatus::Live => LIVE,
            SlotStatus::Tombstoned => TOMBSTONED,
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SlotStatus, D::Error> {
        Ok(match u8::deserialize(d)? {
            LIVE => SlotStatus::Live,
            _ => SlotStatus::Tombstoned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_size_is_fixed() {
        let e = MetaEntry::head(FileName::new("a.txt").unwrap(), 300, 5);
        assert_eq!(bincode::serialized_size(&e).unwrap() as usize, ENTRY_SIZE);
    }

    #[test]
    fn round_trip() {
        let mut e = MetaEntry::head(FileName::new("notes").unwrap(), 0x0001_0203, 0x00FF_0000);
        e.link = 42;
        assert_eq!(MetaEntry::decode(&e.encode().unwrap()).unwrap(), e);

        let mut c = MetaEntry::continuation(4096, 0);
        c.status = SlotStatus::Tombstoned;
        assert_eq!(MetaEntry::decode(&c.encode().unwrap()).unwrap(), c);
    }

    #[test]
    fn field_offsets() {
        let mut e = MetaEntry::head(FileName::new("abcdefgh").unwrap(), 0x0004_0302, 7);
        e.link = 0x0102;
        let bytes = e.encode().unwrap();
        assert_eq!(&bytes[0..3], &[0x02, 0x03, 0x04]);
        assert_eq!(&bytes[3..6], &[7, 0, 0]);
        assert_eq!(&bytes[6..15], b"abcdefgh\0");
        assert_eq!(&bytes[15..17], &[0x02, 0x01]);
        assert_eq!(bytes[17], LIVE);
    }

    #[test]
    fn decode_terminates_the_name() {
        let mut bytes = [b'x'; ENTRY_SIZE];
        bytes[17] = LIVE;
        let e = MetaEntry::decode(&bytes).unwrap();
        assert_eq!(e.filename.to_string(), "xxxxxxxx");
        assert_eq!(e.encode().unwrap()[14], 0);
    }

    #[test]
    fn erased_slot_reads_as_tombstoned() {
        let e = MetaEntry::decode(&[ERASED_BYTE; ENTRY_SIZE]).unwrap();
        assert_eq!(e.status, SlotStatus::Tombstoned);
        assert!(!e.is_live());
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        assert!(matches!(
            MetaEntry::decode(&[0u8; 10]),
            Err(FsError::Truncated { need: ENTRY_SIZE, got: 10 })
        ));
    }

    #[test]
    fn names_are_validated() {
        assert!(FileName::new("a.txt").is_ok());
        assert!(FileName::new("12345678").is_ok());
        assert!(FileName::new("").is_err());
        assert!(FileName::new("123456789").is_err());
        assert!(FileName::new("a b").is_err());
        assert!(FileName::new("a\0").is_err());
        assert!(FileName::empty().is_empty());
        assert_eq!(FileName::new("hi").unwrap().as_bytes(), b"hi");
    }
}
