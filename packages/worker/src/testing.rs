//! Fixtures shared by unit tests.

use std::io::Cursor;
use std::sync::Arc;

use common::catalog::MemoryCatalog;
use common::storage::FilesystemBlobStore;
use common::MediaStore;
use image::{ImageFormat, Rgb, RgbImage};

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x ^ y) & 0xFF) as u8,
        ])
    })
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

pub async fn media_store(dir: &tempfile::TempDir) -> (MediaStore, Arc<MemoryCatalog>) {
    let blobs = FilesystemBlobStore::new(dir.path().join("blobs"), 64 * 1024 * 1024)
        .await
        .unwrap();
    let catalog = Arc::new(MemoryCatalog::new());
    (MediaStore::new(Arc::new(blobs), catalog.clone()), catalog)
}
