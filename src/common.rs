use std::fmt;
use std::str::FromStr;

/// Must be the first bytes of the boot sector
pub const SIGNATURE: [u8; SIGNATURE_SIZE] = *b"MjolnFS\0";

pub const SIGNATURE_SIZE: usize = 8;

/// boot sector layout this build reads and writes
pub const FS_VERSION: u8 = 2;

/// padded layout without the allocation counters
pub const LEGACY_VERSION: u8 = 1;

/// bytes of a file name, the terminator not included
pub const NAME_LEN: usize = 8;

/// on-disk width of the name field
pub const NAME_FIELD: usize = NAME_LEN + 1;

/// link value meaning "end of chain"
pub const NO_LINK: u16 = 0;

/// largest value a 24-bit field holds; also the largest supported device
pub const MAX_U24: u32 = 0x00FF_FFFF;

/// value of a byte after erase
pub const ERASED_BYTE: u8 = 0xFF;

/// at or above this many slots the lookup index starts load-balancing
pub const CACHE_THRESHOLD: u16 = 16;

/// The AT24Cxx family of I2C EEPROMs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceModel {
    At24c04,
    At24c08,
    At24c16,
    At24c32,
    At24c64,
    At24c128,
    At24c256,
    At24c512,
}

impl DeviceModel {
    pub const NAMES: [&'static str; 8] = [
        "at24c04", "at24c08", "at24c16", "at24c32", "at24c64", "at24c128", "at24c256", "at24c512",
    ];

    /// Size of the device in bytes.
    pub fn capacity(self) -> u32 {
        match self {
            DeviceModel::At24c04 => 512,
            DeviceModel::At24c08 => 1024,
            DeviceModel::At24c16 => 2 * 1024,
            DeviceModel::At24c32 => 4 * 1024,
            DeviceModel::At24c64 => 8 * 1024,
            DeviceModel::At24c128 => 16 * 1024,
            DeviceModel::At24c256 => 32 * 1024,
            DeviceModel::At24c512 => 64 * 1024,
        }
    }

    /// Largest write the device accepts in one bus transaction.
    pub fn page_size(self) -> u16 {
        match self {
            DeviceModel::At24c04 | DeviceModel::At24c08 | DeviceModel::At24c16 => 16,
            DeviceModel::At24c32 | DeviceModel::At24c64 => 32,
            DeviceModel::At24c128 | DeviceModel::At24c256 => 64,
            DeviceModel::At24c512 => 128,
        }
    }

    /// Metadata slots reserved by a format with the default config.
    pub fn slot_capacity(self) -> u16 {
        match self {
            DeviceModel::At24c04 => 6,
            DeviceModel::At24c08 => 12,
            DeviceModel::At24c16 => 24,
            DeviceModel::At24c32 => 48,
            DeviceModel::At24c64 => 96,
            DeviceModel::At24c128 => 160,
            DeviceModel::At24c256 => 232,
            DeviceModel::At24c512 => 332,
        }
    }

    fn name(self) -> &'static str {
        match self {
            DeviceModel::At24c04 => Self::NAMES[0],
            DeviceModel::At24c08 => Self::NAMES[1],
            DeviceModel::At24c16 => Self::NAMES[2],
            DeviceModel::At24c32 => Self::NAMES[3],
            DeviceModel::At24c64 => Self::NAMES[4],
            DeviceModel::At24c128 => Self::NAMES[5],
            DeviceModel::At24c256 => Self::NAMES[6],
            DeviceModel::At24c512 => Self::NAMES[7],
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().to_uppercase())
    }
}

impl FromStr for DeviceModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let model = match s.to_ascii_lowercase().as_str() {
            "at24c04" => DeviceModel::At24c04,
            "at24c08" => DeviceModel::At24c08,
            "at24c16" => DeviceModel::At24c16,
            "at24c32" => DeviceModel::At24c32,
            "at24c64" => DeviceModel::At24c64,
            "at24c128" => DeviceModel::At24c128,
            "at24c256" => DeviceModel::At24c256,
            "at24c512" => DeviceModel::At24c512,
            other => return Err(format!("unknown device model `{other}`")),
        };
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_round_trip() {
        for name in DeviceModel::NAMES {
            let model: DeviceModel = name.parse().unwrap();
            assert_eq!(model.to_string().to_lowercase(), name);
        }
        assert!("at24c1024".parse::<DeviceModel>().is_err());
    }

    #[test]
    fn every_model_fits_its_table() {
        let all = DeviceModel::NAMES.map(|n| n.parse::<DeviceModel>().unwrap());
        for model in all {
            let layout = crate::disk::Layout::new(model.capacity(), model.page_size(), model.slot_capacity());
            assert!(layout.is_ok(), "{model} does not fit its own metadata table");
        }
    }
}
