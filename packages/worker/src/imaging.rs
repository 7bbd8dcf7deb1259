//! Header probing, decoding, resizing and JPEG encoding.
//!
//! Everything here is synchronous and CPU-bound; async callers run it on
//! the blocking pool.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageError, ImageReader};
use serde::Serialize;
use thiserror::Error;

use crate::ladder::fit_within;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("image has no pixels")]
    Empty,
}

fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, ImagingError> {
    Ok(ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?)
}

/// Read dimensions from the header without decoding pixel data.
pub fn probe(bytes: &[u8]) -> Result<Dimensions, ImagingError> {
    let (width, height) = reader(bytes)?.into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(ImagingError::Empty);
    }
    Ok(Dimensions { width, height })
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ImagingError> {
    Ok(reader(bytes)?.decode()?)
}

#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
}

/// Encode `raster` as JPEG, first shrinking it with Lanczos3 to fit a
/// `bound` x `bound` box when a bound is given. Alpha is dropped.
pub fn render_jpeg(
    raster: &DynamicImage,
    bound: Option<u32>,
    quality: u8,
) -> Result<Encoded, ImagingError> {
    let source = Dimensions {
        width: raster.width(),
        height: raster.height(),
    };
    let target = bound.map_or(source, |b| fit_within(source, b));
    let rgb = if target == source {
        raster.to_rgb8()
    } else {
        raster
            .resize_exact(target.width, target.height, FilterType::Lanczos3)
            .to_rgb8()
    };

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(Encoded {
        bytes,
        dimensions: Dimensions {
            width: rgb.width(),
            height: rgb.height(),
        },
    })
}
