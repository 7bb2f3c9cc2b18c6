//! Printer command encoding.
//!
//! Commands are built and validated up front, then turned into the exact
//! sequence of transport writes ("frames") the printer expects. Nothing here
//! touches the device, so every byte can be checked without hardware.

use std::borrow::Cow;
use std::time::Duration;

use crate::{
    error::{Error, Result},
    raster::raster_height,
    PRINTER_WIDTH,
};

/// Bytes per raster row (384 dots / 8).
pub const RASTER_WIDTH_BYTES: usize = PRINTER_WIDTH as usize / 8;

/// Largest row count the raster header can carry.
pub const MAX_RASTER_HEIGHT: usize = 0xFFFF;

/// Largest single write accepted by the USB serial transport.
pub const MAX_CHUNK: usize = 16384;

/// Timeout applied to every write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Paper fed before and after a QR code.
pub const QR_MARGIN_DOTS: u8 = 20;

/// QR code error correction level.
///
/// Higher levels survive more print defects but hold fewer bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QrLevel {
    L,
    M,
    Q,
    H,
}

impl QrLevel {
    pub const ALL: [QrLevel; 4] = [QrLevel::L, QrLevel::M, QrLevel::Q, QrLevel::H];

    /// Byte identifying the level on the wire.
    pub const fn code(self) -> u8 {
        match self {
            QrLevel::L => 0x4C,
            QrLevel::M => 0x4D,
            QrLevel::Q => 0x51,
            QrLevel::H => 0x48,
        }
    }

    /// Longest payload in bytes the printer accepts at this level.
    pub const fn max_len(self) -> usize {
        match self {
            QrLevel::L => 154,
            QrLevel::M => 122,
            QrLevel::Q => 86,
            QrLevel::H => 64,
        }
    }
}

/// A validated printer command.
///
/// Constructors enforce the numeric limits of the device, so an existing
/// `Command` always encodes to a well formed byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `FS * e` bitmap, one 48 byte row per dot line.
    Raster { height: u16, data: &'a [u8] },
    /// `GS x` QR code.
    QrCode { level: QrLevel, payload: &'a [u8] },
    /// `ESC J` paper feed in dot rows.
    Feed(u8),
}

impl<'a> Command<'a> {
    pub fn raster(data: &'a [u8]) -> Result<Self> {
        let height = raster_height(data.len())?;
        Ok(Command::Raster { height, data })
    }

    /// QR code holding the UTF-8 bytes of `text`.
    pub fn qr_code(level: QrLevel, text: &'a str) -> Result<Self> {
        let payload = text.as_bytes();
        if payload.len() > level.max_len() {
            return Err(Error::PayloadTooLong {
                len: payload.len(),
                max: level.max_len(),
            });
        }
        Ok(Command::QrCode { level, payload })
    }

    pub fn feed(pixels: i64) -> Result<Self> {
        if !(0..=255).contains(&pixels) {
            return Err(Error::OutOfRange(pixels));
        }
        Ok(Command::Feed(pixels as u8))
    }

    /// Transport writes making up this command, in order.
    ///
    /// Raster bodies are split with [`chunks`]; headers always go out as a
    /// write of their own.
    pub fn frames(&self) -> Vec<Cow<'a, [u8]>> {
        match *self {
            Command::Raster { height, data } => {
                let [hi, lo] = height.to_be_bytes();
                let mut frames = vec![Cow::Owned(vec![0x1C, 0x2A, 0x65, hi, lo])];
                frames.extend(chunks(data).map(Cow::Borrowed));
                frames
            }
            Command::QrCode { level, payload } => vec![
                Cow::Owned(feed_bytes(QR_MARGIN_DOTS)),
                Cow::Owned(vec![0x1D, 0x78, level.code(), payload.len() as u8]),
                Cow::Borrowed(payload),
                Cow::Owned(feed_bytes(QR_MARGIN_DOTS)),
            ],
            Command::Feed(pixels) => vec![Cow::Owned(feed_bytes(pixels))],
        }
    }
}

fn feed_bytes(pixels: u8) -> Vec<u8> {
    vec![0x1B, 0x4A, pixels]
}

/// Split `buf` into consecutive slices of at most [`MAX_CHUNK`] bytes.
///
/// An empty buffer yields no slices.
pub fn chunks(buf: &[u8]) -> std::slice::Chunks<'_, u8> {
    buf.chunks(MAX_CHUNK)
}
