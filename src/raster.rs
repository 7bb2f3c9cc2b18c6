use crate::{
    error::{Error, Result},
    protocol::{MAX_RASTER_HEIGHT, RASTER_WIDTH_BYTES},
};

/// Packed monochrome image ready for the printer.
///
/// Always [`crate::PRINTER_WIDTH`] dots wide, i.e. 48 bytes per row, and at
/// most [`MAX_RASTER_HEIGHT`] rows tall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    data: Vec<u8>,
}

impl Raster {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        raster_height(data.len())?;
        Ok(Raster { data })
    }

    /// Number of dot rows.
    pub fn height(&self) -> u16 {
        (self.data.len() / RASTER_WIDTH_BYTES) as u16
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for Raster {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Validate a raster buffer length and return its row count.
pub(crate) fn raster_height(len: usize) -> Result<u16> {
    if len % RASTER_WIDTH_BYTES != 0 {
        return Err(Error::MalformedRaster(len));
    }
    let height = len / RASTER_WIDTH_BYTES;
    if height > MAX_RASTER_HEIGHT {
        return Err(Error::RasterTooTall(height));
    }
    Ok(height as u16)
}
