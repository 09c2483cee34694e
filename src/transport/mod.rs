//! Byte transports underneath the Modbus client.

pub mod serial;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use crate::utils::error::TransportError;

pub use serial::{list_ports, SerialTransport};

/// A half-duplex byte stream. Implementations know nothing about Modbus.
pub trait Transport: Send {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Fills `buf` completely within `timeout`. On expiry the error reports
    /// how many bytes did arrive.
    fn receive_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError>;

    /// Drops any bytes left over from an earlier exchange.
    fn discard_input(&mut self) -> Result<(), TransportError>;

    fn close(&mut self);

    fn name(&self) -> &str;
}
