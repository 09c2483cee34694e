//! Six-axis force/torque sensor driver over Modbus RTU
//!
//! This library frames Modbus RTU requests over a serial transport, decodes
//! the sensor's fixed-point register block into forces (N) and torques (N·m),
//! and drives the sensor's start/poll/stop streaming protocol.

pub mod config;
pub mod modbus;
pub mod transport;
pub mod sensor;
pub mod output;
pub mod utils;
pub mod cli;

// Re-export commonly used types
pub use config::{CommandTable, Config, ParityConfig, SerialConfig};
pub use modbus::{ModbusClient, ModbusRequest, ModbusResponse};
pub use sensor::{ForceTorqueSample, SensorReading, SensorSession, SessionState};
pub use transport::{SerialTransport, Transport};
pub use output::{DataFormatter, DataSender, ConsoleFormatter, JsonFormatter, CsvFormatter};
pub use utils::error::{CodecError, DecodeError, ModbusError, PollError, SessionError, TransportError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
