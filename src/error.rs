//! Error types for image conversion and printer operations.
//!
//! This module defines all possible errors that can occur while preparing
//! a panorama for printing, encoding printer commands and talking to the
//! device over USB.

use thiserror::Error;

/// Main error type for instaprint operations.
///
/// Validation errors (image geometry, raster shape, payload sizes) are always
/// reported before any byte is written to the device. Transport errors are
/// surfaced as they come; nothing in this crate retries.
#[derive(Error, Debug)]
pub enum Error {
    /// Source image is too small to produce a full printable band.
    #[error("The height of input image must be at least {required}, but got {width}x{height}")]
    InvalidGeometry {
        width: u32,
        height: u32,
        required: u32,
    },

    /// Source image is not a 2:1 panorama.
    #[error("The aspect ratio of input image must be 2:1, but got {width}x{height}")]
    InvalidAspectRatio { width: u32, height: u32 },

    /// RGBA buffer handed to a bit packer does not match its dimensions.
    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    PixelBufferSize { expected: usize, actual: usize },

    /// Raster data is not made of whole 48 byte rows.
    #[error("The length of raster data must be a multiple of 48, but got {0}")]
    MalformedRaster(usize),

    #[error("Too large raster height: {0}")]
    RasterTooTall(usize),

    /// QR payload exceeds the capacity of the requested error correction level.
    #[error("The text is too long to store in the QR code: {len} bytes, at most {max} allowed")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Pixels must be in the range 0 to 255, but got {0}")]
    OutOfRange(i64),

    /// Printer handle has no open transport.
    ///
    /// The caller has to (re)establish the connection; see [`crate::Printer::connect`].
    #[error("Printer is not connected")]
    NotConnected,

    #[error("Printer is already connected")]
    AlreadyConnected,

    #[error("Printer connection is closed")]
    ConnectionClosed,

    /// A single write did not complete within its timeout.
    #[error("Write timed out")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// USB communication error.
    ///
    /// Wraps underlying rusb errors other than timeouts.
    #[error(transparent)]
    Usb(rusb::Error),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// Printer device is not connected or not responding.
    #[error("Device is offline")]
    DeviceOffline,

    #[error("Can't read device list, permission issue ?")]
    DeviceListNotReadable,

    #[error("Device is missing endpoint")]
    MissingEndpoint,

    /// The OS refused to open the device.
    ///
    /// Callers are expected to obtain access out of band (udev rule, user
    /// consent dialog) and open the transport again.
    #[error("Permission to open the device was denied")]
    PermissionDenied,
}

impl From<rusb::Error> for Error {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::Timeout => Error::Timeout,
            rusb::Error::Access => Error::PermissionDenied,
            e => Error::Usb(e),
        }
    }
}

/// Result type alias for instaprint operations.
pub type Result<T> = std::result::Result<T, Error>;
