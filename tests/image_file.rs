mod common;

use common::quiet;
use mjoln::{BlockDevice, DeviceModel, FsConfig, FsError, ImageFile, MjolnFs};

use std::path::PathBuf;
use std::sync::Arc;

/// A per-test image path under the system temp dir, removed on drop.
struct TempImage(PathBuf);

impl TempImage {
    fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!("mjoln-{}-{tag}.img", std::process::id()));
        let _ = std::fs::remove_file(&path);
        Self(path)
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[test]
fn new_images_are_erased() {
    let img = TempImage::new("erased");
    let dev = ImageFile::open_or_create(&img.0, DeviceModel::At24c04).unwrap();
    assert_eq!(dev.capacity(), 512);
    assert_eq!(std::fs::metadata(&img.0).unwrap().len(), 512);

    let mut buf = [0u8; 64];
    dev.read_bytes(100, &mut buf).unwrap();
    assert!(buf.iter().all(|b| *b == 0xFF));

    let mut fs = quiet(MjolnFs::new(Arc::new(dev), FsConfig::for_model(DeviceModel::At24c04)));
    assert!(matches!(fs.mount(), Err(FsError::NotFormatted)));
}

#[test]
fn files_persist_across_reopen() {
    let img = TempImage::new("persist");
    let model = DeviceModel::At24c16;
    let config = FsConfig::for_model(model).with_block_limit(100);
    {
        let dev = ImageFile::open_or_create(&img.0, model).unwrap();
        let mut fs = quiet(MjolnFs::new(Arc::new(dev), config));
        fs.format().unwrap();
        fs.write_file("notes", b"remember the milk").unwrap();
        fs.write_file("blob", &[0xAB; 250]).unwrap();
        fs.write_file("gone", b"bye").unwrap();
        fs.delete_file("gone").unwrap();
    }

    let dev = ImageFile::open_or_create(&img.0, model).unwrap();
    assert_eq!(dev.capacity(), model.capacity());
    let mut fs = quiet(MjolnFs::new(Arc::new(dev), config));
    let info = fs.mount().unwrap();
    assert_eq!(info.slot_capacity, model.slot_capacity());
    assert_eq!(info.bytes_in_use, 17 + 250);
    assert_eq!(fs.read_file("notes").unwrap(), b"remember the milk");
    assert_eq!(fs.read_file("blob").unwrap(), [0xAB; 250]);
    assert_eq!(fs.file_info("blob").unwrap().blocks.len(), 3);
    assert_eq!(fs.list_files().unwrap(), ["notes", "blob"]);
}

#[test]
fn out_of_range_access_is_rejected() {
    let img = TempImage::new("bounds");
    let dev = ImageFile::create(&img.0, 256, 16).unwrap();
    let mut buf = [0u8; 8];
    assert!(matches!(
        dev.read_bytes(252, &mut buf),
        Err(FsError::OutOfBounds { addr: 252, len: 8 })
    ));
    dev.write_bytes(248, &[1; 8]).unwrap();
    dev.read_bytes(248, &mut buf).unwrap();
    assert_eq!(buf, [1; 8]);
}
