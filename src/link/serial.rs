//! Node link over a serial device
//!
//! Radio pairing and service discovery happen outside the relay; the node is
//! reached through a serial endpoint (an rfcomm device or a BLE-UART bridge)
//! that carries the node's notifications as a byte stream.

use super::NodeLink;
use crate::error::{Error, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Serial-backed link to one node
pub struct SerialLink {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Create an unconnected link
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/rfcomm0")
    /// * `baud_rate` - Baud rate (e.g., 115200)
    pub fn new(path: &str, baud_rate: u32) -> Self {
        Self {
            path: path.to_string(),
            baud_rate,
            port: None,
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::LinkFault(format!("{} not connected", self.path)))
    }
}

impl NodeLink for SerialLink {
    fn connect(&mut self) -> Result<()> {
        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;

        log::info!("Opened serial link: {} at {} baud", self.path, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.port.take().is_some() {
            log::debug!("Closed serial link: {}", self.path);
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let path = self.path.clone();
        let port = self.port_mut()?;
        port.write_all(bytes)
            .and_then(|_| port.flush())
            .map_err(|e| Error::LinkFault(format!("write {}: {}", path, e)))
    }

    fn poll(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        let path = self.path.clone();
        let port = self.port_mut()?;
        port.set_timeout(timeout)
            .map_err(|e| Error::LinkFault(format!("set timeout {}: {}", path, e)))?;

        match port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(Error::LinkFault(format!("read {}: {}", path, e))),
        }
    }
}
