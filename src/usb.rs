use log::{debug, info, warn};
use rusb::{
    Context, Device, DeviceDescriptor, DeviceHandle, Direction, Recipient, RequestType,
    TransferType, UsbContext,
};
use std::time::Duration;

use crate::{
    error::{Error, Result},
    transport::Transport,
};

/// Baud rate of the printer's serial interface.
pub const DEFAULT_BAUD_RATE: u32 = 38400;

// CDC-ACM class requests.
const SET_LINE_CODING: u8 = 0x20;
const CDC_COMM_CLASS: u8 = 0x02;

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    config: u8,
    iface: u8,
    setting: u8,
    address: u8,
}

/// USB serial bridge the printer is attached to.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    endpoint_out: Endpoint,
    claimed: Vec<u8>,
}

impl UsbTransport {
    /// Find the device described by `config`, claim its bulk OUT interface
    /// and configure the serial line.
    ///
    /// Fails with [`Error::PermissionDenied`] when the device exists but the
    /// OS does not let us open it.
    pub fn open(config: &Config) -> Result<Self> {
        let context = Context::new()?;
        let (device, device_desc, handle) = Self::open_device(&context, config)?;

        let endpoint_out = match Self::find_endpoint(
            &device,
            &device_desc,
            Direction::Out,
            TransferType::Bulk,
        ) {
            Some(endpoint) => endpoint,
            None => return Err(Error::MissingEndpoint),
        };
        debug!("Bulk OUT endpoint: {:?}", endpoint_out);

        // cdc_acm (or a vendor driver) usually owns the interface already.
        if let Err(err) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto detach unavailable: {:?}", err);
        }
        let has_kernel_driver = matches!(handle.kernel_driver_active(endpoint_out.iface), Ok(true));
        debug!("Kernel driver active: {}", has_kernel_driver);

        if handle.active_configuration()? != endpoint_out.config {
            handle.set_active_configuration(endpoint_out.config)?;
        }
        handle.claim_interface(endpoint_out.iface)?;
        handle.set_alternate_setting(endpoint_out.iface, endpoint_out.setting)?;

        let mut transport = UsbTransport {
            handle,
            endpoint_out,
            claimed: vec![endpoint_out.iface],
        };

        if config.line_coding {
            let comm_iface = Self::find_comm_interface(&device, &device_desc)
                .unwrap_or(endpoint_out.iface);
            if !transport.claimed.contains(&comm_iface) {
                transport.handle.claim_interface(comm_iface)?;
                transport.claimed.push(comm_iface);
            }
            transport.set_line_coding(comm_iface, config.baud_rate)?;
        }

        info!(
            "Opened {:04x}:{:04x} at {} baud",
            config.vendor_id, config.product_id, config.baud_rate
        );
        Ok(transport)
    }

    fn open_device(
        context: &Context,
        config: &Config,
    ) -> Result<(Device<Context>, DeviceDescriptor, DeviceHandle<Context>)> {
        let devices = context.devices()?;

        if devices.is_empty() {
            debug!("Failed to read device list");
            return Err(Error::DeviceListNotReadable);
        }
        for device in devices.iter() {
            let device_desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(err) => {
                    debug!("{:?}", err);
                    continue;
                }
            };

            if device_desc.vendor_id() != config.vendor_id
                || device_desc.product_id() != config.product_id
            {
                continue;
            }
            debug!("{:?}", device_desc);

            let handle = match device.open() {
                Ok(handle) => handle,
                Err(rusb::Error::Access) => {
                    debug!("Access denied to {:?}", device);
                    return Err(Error::PermissionDenied);
                }
                Err(err) => {
                    debug!("Failed to open device: {:?}", err);
                    continue;
                }
            };

            let serial = match &config.serial {
                Some(serial) => serial,
                None => return Ok((device, device_desc, handle)),
            };

            let timeout = Duration::from_secs(1);
            let languages = handle.read_languages(timeout)?;
            let language = match languages.first() {
                Some(language) => *language,
                None => continue,
            };
            match handle.read_serial_number_string(language, &device_desc, timeout) {
                Ok(s) if &s == serial => return Ok((device, device_desc, handle)),
                Ok(_) => continue,
                Err(err) => {
                    debug!("Failed to read serial number string: {:?}", err);
                    continue;
                }
            }
        }
        debug!("No device match with this serial: {:?}", config.serial);
        Err(Error::DeviceOffline)
    }

    fn find_endpoint(
        device: &Device<Context>,
        device_desc: &DeviceDescriptor,
        direction: Direction,
        transfer_type: TransferType,
    ) -> Option<Endpoint> {
        for n in 0..device_desc.num_configurations() {
            let config_desc = match device.config_descriptor(n) {
                Ok(c) => c,
                Err(_) => continue,
            };
            for interface in config_desc.interfaces() {
                for interface_desc in interface.descriptors() {
                    for endpoint_desc in interface_desc.endpoint_descriptors() {
                        if endpoint_desc.direction() == direction
                            && endpoint_desc.transfer_type() == transfer_type
                        {
                            return Some(Endpoint {
                                config: config_desc.number(),
                                iface: interface_desc.interface_number(),
                                setting: interface_desc.setting_number(),
                                address: endpoint_desc.address(),
                            });
                        }
                    }
                }
            }
        }
        None
    }

    /// Interface number of the CDC communication class interface, if any.
    fn find_comm_interface(
        device: &Device<Context>,
        device_desc: &DeviceDescriptor,
    ) -> Option<u8> {
        for n in 0..device_desc.num_configurations() {
            let config_desc = match device.config_descriptor(n) {
                Ok(c) => c,
                Err(_) => continue,
            };
            for interface in config_desc.interfaces() {
                for interface_desc in interface.descriptors() {
                    if interface_desc.class_code() == CDC_COMM_CLASS {
                        return Some(interface_desc.interface_number());
                    }
                }
            }
        }
        None
    }

    /// Apply `baud_rate`, 8 data bits, 1 stop bit, no parity.
    ///
    /// Bridges that are not CDC-ACM stall the request; they are used as they
    /// come up.
    fn set_line_coding(&self, iface: u8, baud_rate: u32) -> Result<()> {
        let request_type = rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface);
        let coding = line_coding(baud_rate);

        match self.handle.write_control(
            request_type,
            SET_LINE_CODING,
            0,
            iface as u16,
            &coding,
            Duration::from_secs(1),
        ) {
            Ok(_) => Ok(()),
            Err(rusb::Error::Pipe) => {
                warn!("Device rejected SET_LINE_CODING, keeping its defaults");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// CDC `LINE_CODING` structure: rate, stop bits (0 = 1), parity (0 = none),
/// data bits.
fn line_coding(baud_rate: u32) -> [u8; 7] {
    let [b0, b1, b2, b3] = baud_rate.to_le_bytes();
    [b0, b1, b2, b3, 0x00, 0x00, 0x08]
}

impl Transport for UsbTransport {
    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<()> {
        let n = self
            .handle
            .write_bulk(self.endpoint_out.address, buf, timeout)?;
        if n == buf.len() {
            debug!("wrote {} bytes", n);
            Ok(())
        } else {
            debug!(
                "write error: bytes wrote {} != bytes supplied {}, possibly timeout ?",
                n,
                buf.len()
            );
            Err(Error::ShortWrite {
                written: n,
                expected: buf.len(),
            })
        }
    }

    fn close(&mut self) -> Result<()> {
        let handle = &self.handle;
        release_all(&mut self.claimed, |iface| handle.release_interface(iface))
    }
}

/// Release every claimed interface, last claimed first, and report the first
/// failure once all of them have been tried.
fn release_all<F>(claimed: &mut Vec<u8>, mut release: F) -> Result<()>
where
    F: FnMut(u8) -> rusb::Result<()>,
{
    let mut result = Ok(());
    for iface in claimed.drain(..).rev() {
        match release(iface) {
            Ok(()) => info!("Released interface {}", iface),
            Err(err) => {
                warn!("Failed to release interface {}: {:?}", iface, err);
                if result.is_ok() {
                    result = Err(err.into());
                }
            }
        }
    }
    result
}

/// Where to find the printer and how to talk to it.
#[derive(Debug, Clone)]
pub struct Config {
    vendor_id: u16,
    product_id: u16,
    serial: Option<String>,
    baud_rate: u32,
    line_coding: bool,
}

impl Config {
    /// Match the first device with this vendor and product id.
    ///
    /// # Example
    ///
    /// ```
    /// use instaprint::Config;
    ///
    /// let config = Config::new(0x0483, 0x5743)
    ///     .serial("000123".to_string())
    ///     .baud_rate(115200);
    /// assert_eq!(config.get_baud_rate(), 115200);
    /// ```
    pub fn new(vendor_id: u16, product_id: u16) -> Config {
        Config {
            vendor_id,
            product_id,
            serial: None,
            baud_rate: DEFAULT_BAUD_RATE,
            line_coding: true,
        }
    }

    /// Only accept the unit reporting this USB serial number.
    pub fn serial(self, serial: String) -> Self {
        Config {
            serial: Some(serial),
            ..self
        }
    }

    pub fn baud_rate(self, baud_rate: u32) -> Self {
        Config { baud_rate, ..self }
    }

    /// Send `SET_LINE_CODING` after opening (default on).
    pub fn line_coding(self, flag: bool) -> Self {
        Config {
            line_coding: flag,
            ..self
        }
    }

    pub fn get_baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn get_serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_coding_is_8n1() {
        assert_eq!(
            line_coding(DEFAULT_BAUD_RATE),
            [0x00, 0x96, 0x00, 0x00, 0x00, 0x00, 0x08]
        );
        assert_eq!(
            line_coding(115200),
            [0x00, 0xC2, 0x01, 0x00, 0x00, 0x00, 0x08]
        );
    }

    #[test]
    fn release_continues_past_failures() {
        let mut claimed = vec![0, 1, 2];
        let mut released = Vec::new();

        let result = release_all(&mut claimed, |iface| {
            released.push(iface);
            match iface {
                1 => Err(rusb::Error::Busy),
                0 => Err(rusb::Error::NoDevice),
                _ => Ok(()),
            }
        });

        assert_eq!(released, vec![2, 1, 0]);
        assert!(claimed.is_empty());
        assert!(matches!(result, Err(Error::Usb(rusb::Error::Busy))));
    }

    #[test]
    fn release_nothing_claimed() {
        let mut claimed = Vec::new();
        assert!(release_all(&mut claimed, |_| Err(rusb::Error::Busy)).is_ok());
    }

    #[test]
    fn config_defaults() {
        let config = Config::new(0x1234, 0x5678);
        assert_eq!(config.get_baud_rate(), 38400);
        assert_eq!(config.get_serial(), None);
        assert!(config.line_coding);

        let config = config.serial("ABC".to_string()).line_coding(false);
        assert_eq!(config.get_serial(), Some("ABC"));
        assert!(!config.line_coding);
    }
}
