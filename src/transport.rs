use std::io::Write;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

/// An opened byte channel to the printer.
///
/// The protocol layer only ever writes; nothing is read back from the device.
pub trait Transport: Send {
    /// Write the whole buffer, blocking at most `timeout`.
    ///
    /// A timeout is reported as [`Error::Timeout`] and is not retried.
    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<()>;

    /// Release the underlying device.
    fn close(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<()> {
        (**self).write(buf, timeout)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Transport over any [`std::io::Write`].
///
/// Handy for tty device nodes already configured by the OS, or for capturing
/// a print job into a file. The timeout is ignored; the writer's own blocking
/// behaviour applies.
#[derive(Debug)]
pub struct StreamTransport<W> {
    inner: W,
}

impl<W: Write + Send> StreamTransport<W> {
    pub fn new(inner: W) -> Self {
        StreamTransport { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> Transport for StreamTransport<W> {
    fn write(&mut self, buf: &[u8], _timeout: Duration) -> Result<()> {
        debug!("stream write {} bytes", buf.len());
        self.inner.write_all(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::Io(e),
        })
    }

    fn close(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
