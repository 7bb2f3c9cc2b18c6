//! Panorama geometry pipeline.
//!
//! A 2:1 panorama is stretched to 1536x768, the vertically centered
//! 1536x384 band is cut out and turned 90 degrees clockwise so that it runs
//! down the 384 dot wide paper. The result is handed to a [`BitPacker`].

use image::{imageops, imageops::FilterType, RgbaImage};
use log::debug;

use crate::{
    error::{Error, Result},
    packer::{default_packer, BitPacker},
    raster::Raster,
    TARGET_HEIGHT, TARGET_WIDTH,
};

/// Swap the left and right halves of an image.
///
/// Used to move the seam of a 360 degree panorama away from the center.
/// Both halves are `width / 2` wide, so on odd widths the last source column
/// is dropped and the last output column stays transparent black.
pub fn shift_center(src: RgbaImage) -> RgbaImage {
    let (width, height) = src.dimensions();
    let half = width / 2;

    let left = imageops::crop_imm(&src, 0, 0, half, height).to_image();
    let right = imageops::crop_imm(&src, half, 0, half, height).to_image();
    drop(src);

    let mut dst = RgbaImage::new(width, height);
    imageops::replace(&mut dst, &right, 0, 0);
    imageops::replace(&mut dst, &left, half as i64, 0);
    dst
}

/// Convert a panorama into a printable raster with the default packer.
pub fn convert(src: RgbaImage) -> Result<Raster> {
    convert_with(src, default_packer())
}

/// Convert a panorama into a printable raster.
///
/// The source must be at least `2 * TARGET_HEIGHT` pixels tall and its width
/// divided by its height (integer division) must be 2. The returned raster is
/// 384 dots wide and [`TARGET_WIDTH`] rows long.
pub fn convert_with<P: BitPacker + ?Sized>(src: RgbaImage, packer: &P) -> Result<Raster> {
    let (width, height) = src.dimensions();
    if height < TARGET_HEIGHT * 2 {
        return Err(Error::InvalidGeometry {
            width,
            height,
            required: TARGET_HEIGHT * 2,
        });
    }
    if width / height != 2 {
        return Err(Error::InvalidAspectRatio { width, height });
    }

    debug!("Resizing {}x{} to {}x{}", width, height, TARGET_WIDTH, TARGET_HEIGHT * 2);
    let resized = imageops::resize(&src, TARGET_WIDTH, TARGET_HEIGHT * 2, FilterType::Nearest);
    drop(src);

    let cropped =
        imageops::crop_imm(&resized, 0, TARGET_HEIGHT / 2, TARGET_WIDTH, TARGET_HEIGHT).to_image();
    drop(resized);

    let rotated = imageops::rotate90(&cropped);
    drop(cropped);

    let (w, h) = rotated.dimensions();
    debug!("Packing {}x{} rotated band", w, h);
    let packed = packer.pack(rotated.as_raw(), w, h)?;
    drop(rotated);

    Raster::new(packed)
}
