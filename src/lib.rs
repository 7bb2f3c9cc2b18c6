//! Instant Print
//!
//! This crate turns a 2:1 panoramic photo into a 384 dot wide monochrome
//! raster and drives a thermal receipt printer over a USB serial link.
//!
//! # Example
//!
//! ```rust,no_run
//! use instaprint::{convert, shift_center, Config, Printer, QrLevel};
//!
//! let image = image::open("panorama.jpg").unwrap().into_rgba8();
//! let raster = convert(shift_center(image)).unwrap();
//!
//! let config = Config::new(0x0483, 0x5743).serial("000123".to_string());
//! let printer = Printer::open(&config).unwrap();
//! printer.print(&raster).unwrap();
//! printer.print_qr(QrLevel::M, "https://example.com").unwrap();
//! printer.feed(100).unwrap();
//! printer.close().unwrap();
//! ```

mod convert;
mod error;
mod packer;
mod printer;
mod protocol;
mod raster;
mod transport;
mod usb;

pub use crate::{
    convert::{convert, convert_with, shift_center},
    error::{Error, Result},
    packer::{default_packer, BitPacker, FloydSteinberg, Threshold},
    printer::{Printer, State},
    protocol::{
        chunks, Command, QrLevel, DEFAULT_TIMEOUT, MAX_CHUNK, MAX_RASTER_HEIGHT,
        QR_MARGIN_DOTS, RASTER_WIDTH_BYTES,
    },
    raster::Raster,
    transport::{StreamTransport, Transport},
    usb::{Config, UsbTransport, DEFAULT_BAUD_RATE},
};

/// Width in dots of the thermal print head.
///
/// Every raster row sent to the printer covers exactly this many dots,
/// packed into 48 bytes (384 / 8).
pub const PRINTER_WIDTH: u32 = 384;

/// Height of the band cut out of the resized panorama.
///
/// After rotation this becomes the printed width, so it matches
/// [`PRINTER_WIDTH`].
pub const TARGET_HEIGHT: u32 = 384;

/// Width the panorama is stretched to before cropping.
///
/// After rotation this becomes the printed length in rows.
pub const TARGET_WIDTH: u32 = TARGET_HEIGHT * 4;
