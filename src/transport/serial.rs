use log::{debug, error, info, warn};
use serialport::{ClearBuffer, SerialPort, SerialPortInfo};
use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use super::Transport;
use crate::config::settings::{ParityConfig, SerialConfig};
use crate::utils::error::{ModbusError, TransportError};

pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, ModbusError> {
        config.validate()?;

        info!("🔌 Connecting to Modbus RTU port: {}", config.port);
        info!(
            "⚙️  Configuration: {} baud, {:?} parity, {} data bits, {} stop bit(s)",
            config.baud_rate, config.parity, config.data_bits, config.stop_bits
        );

        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.timeout())
            .data_bits(data_bits(config.data_bits))
            .stop_bits(stop_bits(config.stop_bits))
            .parity(parity(config.parity))
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", config.port, e);
                ModbusError::Connect(format!("Failed to open port {}: {}", config.port, e))
            })?;

        info!("✅ Modbus RTU connection established on {}", config.port);
        Ok(Self {
            port: Some(port),
            port_name: config.port.clone(),
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port
            .as_mut()
            .ok_or_else(|| TransportError::Disconnected("port already closed".to_string()))
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(frame).map_err(classify_io)?;
        port.flush().map_err(classify_io)?;
        Ok(())
    }

    fn receive_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
        let port = self.port()?;
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout { received: filled });
            }
            port.set_timeout(remaining).map_err(classify_serial)?;

            match port.read(&mut buf[filled..]) {
                Ok(0) => thread::sleep(Duration::from_millis(1)),
                Ok(n) => filled += n,
                Err(ref e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(classify_io(e)),
            }
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        let port = self.port()?;
        let pending = port.bytes_to_read().map_err(classify_serial)?;
        if pending > 0 {
            debug!("Discarding {} stale byte(s)", pending);
        }
        port.clear(ClearBuffer::Input).map_err(classify_serial)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("🔌 Closed serial port {}", self.port_name);
        }
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

pub fn list_ports() -> Result<Vec<SerialPortInfo>, ModbusError> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        warn!("⚠️  No serial ports found");
    }
    Ok(ports)
}

fn classify_io(err: io::Error) -> TransportError {
    match err.kind() {
        ErrorKind::TimedOut => TransportError::Timeout { received: 0 },
        ErrorKind::BrokenPipe
        | ErrorKind::NotConnected
        | ErrorKind::NotFound
        | ErrorKind::PermissionDenied
        | ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted => TransportError::Disconnected(err.to_string()),
        _ => TransportError::Io(err),
    }
}

fn classify_serial(err: serialport::Error) -> TransportError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => TransportError::Disconnected(err.to_string()),
        _ => TransportError::Io(err.into()),
    }
}

fn parity(parity: ParityConfig) -> serialport::Parity {
    match parity {
        ParityConfig::None => serialport::Parity::None,
        ParityConfig::Even => serialport::Parity::Even,
        ParityConfig::Odd => serialport::Parity::Odd,
    }
}

// Ranges are checked by SerialConfig::validate.
fn data_bits(bits: u8) -> serialport::DataBits {
    match bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        _ => serialport::DataBits::Eight,
    }
}

fn stop_bits(bits: u8) -> serialport::StopBits {
    match bits {
        2 => serialport::StopBits::Two,
        _ => serialport::StopBits::One,
    }
}
