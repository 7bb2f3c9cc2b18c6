use log::{debug, info, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::{
    error::{Error, Result},
    protocol::{Command, QrLevel, DEFAULT_TIMEOUT},
    raster::Raster,
    transport::Transport,
    usb::{Config, UsbTransport},
};

/// Connection state of a [`Printer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unopened,
    Open,
    Closed,
}

enum Connection<T> {
    Unopened,
    Open(T),
    Closed,
}

/// Handle to a thermal receipt printer.
///
/// Every command runs as one uninterrupted sequence of writes: the handle
/// holds its lock from the first write to the last, so commands issued from
/// several threads never interleave on the wire. [`Printer::close`] takes
/// the same lock and therefore waits for a running command to finish.
pub struct Printer<T: Transport> {
    conn: Mutex<Connection<T>>,
    timeout: Duration,
}

impl Printer<UsbTransport> {
    /// Open the USB printer described by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let transport = UsbTransport::open(config)?;
        Ok(Printer::with_transport(transport))
    }
}

impl<T: Transport> Printer<T> {
    /// A handle without a transport yet.
    ///
    /// Commands fail with [`Error::NotConnected`] until [`Printer::connect`]
    /// hands over an opened transport.
    pub fn new() -> Self {
        Printer {
            conn: Mutex::new(Connection::Unopened),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_transport(transport: T) -> Self {
        Printer {
            conn: Mutex::new(Connection::Open(transport)),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Per-write timeout, [`DEFAULT_TIMEOUT`] unless changed.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach an opened transport to an unopened handle.
    pub fn connect(&self, transport: T) -> Result<()> {
        let mut conn = self.lock();
        match *conn {
            Connection::Unopened => {
                *conn = Connection::Open(transport);
                info!("Printer connected");
                Ok(())
            }
            Connection::Open(_) => Err(Error::AlreadyConnected),
            Connection::Closed => Err(Error::ConnectionClosed),
        }
    }

    pub fn state(&self) -> State {
        match *self.lock() {
            Connection::Unopened => State::Unopened,
            Connection::Open(_) => State::Open,
            Connection::Closed => State::Closed,
        }
    }

    /// Close the transport. The handle cannot be reopened.
    ///
    /// Blocks while another thread is in the middle of a command. Closing an
    /// already closed handle does nothing.
    pub fn close(&self) -> Result<()> {
        let mut conn = self.lock();
        match std::mem::replace(&mut *conn, Connection::Closed) {
            Connection::Open(mut transport) => {
                info!("Closing printer");
                transport.close()
            }
            _ => Ok(()),
        }
    }

    /// Print a raster produced by [`crate::convert`].
    pub fn print(&self, raster: &Raster) -> Result<()> {
        self.print_raster(raster.as_bytes())
    }

    /// Print raw raster data, 48 bytes per dot row.
    ///
    /// A handle that is not open reports [`Error::NotConnected`] before the
    /// data is looked at.
    pub fn print_raster(&self, data: &[u8]) -> Result<()> {
        let mut conn = self.lock();
        let transport = open_transport(&mut *conn)?;
        self.write_frames(transport, &Command::raster(data)?)
    }

    /// Print `text` as a QR code framed by a short paper feed on both sides.
    ///
    /// A handle that is not open reports [`Error::NotConnected`] before the
    /// payload length is checked.
    pub fn print_qr(&self, level: QrLevel, text: &str) -> Result<()> {
        let mut conn = self.lock();
        let transport = open_transport(&mut *conn)?;
        self.write_frames(transport, &Command::qr_code(level, text)?)
    }

    /// Advance the paper by `pixels` dot rows (0 to 255).
    ///
    /// The range is checked first, so an out of range value is reported even
    /// on a handle that is not open.
    pub fn feed(&self, pixels: i64) -> Result<()> {
        self.send(&Command::feed(pixels)?)
    }

    /// Write every frame of `command`, stopping at the first failure.
    ///
    /// A failed write leaves the printer in whatever state the bytes sent so
    /// far put it in.
    pub fn send(&self, command: &Command<'_>) -> Result<()> {
        let mut conn = self.lock();
        let transport = open_transport(&mut *conn)?;
        self.write_frames(transport, command)
    }

    fn write_frames(&self, transport: &mut T, command: &Command<'_>) -> Result<()> {
        for frame in command.frames() {
            debug!("write {} bytes", frame.len());
            transport.write(&frame, self.timeout)?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection<T>> {
        // A panic mid-command leaves the device in an unknown state anyway;
        // the connection value itself is still consistent.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_transport<T>(conn: &mut Connection<T>) -> Result<&mut T> {
    match conn {
        Connection::Open(transport) => Ok(transport),
        _ => Err(Error::NotConnected),
    }
}

impl<T: Transport> Default for Printer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Drop for Printer<T> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("Failed to close printer: {}", err);
        }
    }
}
