use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("device I/O failed: {0}")]
    DeviceIo(#[from] std::io::Error),
    #[error("access of {len} bytes at {addr:#08x} is outside the device")]
    OutOfBounds { addr: u32, len: usize },
    #[error("device is not formatted")]
    NotFormatted,
    #[error("boot sector uses legacy layout version {0}, reformat required")]
    LegacyLayout(u8),
    #[error("file system is not mounted")]
    NotInitialized,
    #[error("file `{0}` already exists")]
    FileAlreadyExists(String),
    #[error("file `{0}` not found")]
    FileNotFound(String),
    #[error("partial write: {0}")]
    PartialWriteFailure(&'static str),
    #[error("invalid file name `{0}`")]
    InvalidName(String),
    #[error("no space left: need {need} bytes, {free} free")]
    OutOfSpace { need: u32, free: u32 },
    #[error("metadata table is full ({0} slots)")]
    TableFull(u16),
    #[error("record truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("record codec: {0}")]
    Codec(#[from] bincode::Error),
    #[error("broken chain at slot {0}")]
    BrokenChain(u16),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

pub type Result<T> = std::result::Result<T, FsError>;
