use std::io;
use thiserror::Error;

/// Failures raised by a byte transport. Carries no protocol knowledge.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Timed out after receiving {received} byte(s)")]
    Timeout { received: usize },

    /// The link is gone (device unplugged, port closed underneath us).
    #[error("Transport disconnected: {0}")]
    Disconnected(String),

    /// Line-level glitch (framing, parity, overrun); the port stays usable.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Disconnected(_))
    }
}

/// Framing and validation failures of the RTU codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Frame too short: {0} byte(s)")]
    TooShort(usize),

    #[error("Response from address {actual}, expected {expected}")]
    AddressMismatch { expected: u8, actual: u8 },

    #[error("CRC checksum mismatch (calculated 0x{calculated:04X}, received 0x{received:04X})")]
    Crc { calculated: u16, received: u16 },

    #[error("Unexpected function code 0x{actual:02X}, expected 0x{expected:02X}")]
    UnexpectedFunction { expected: u8, actual: u8 },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unsupported function code 0x{0:02X}")]
    UnsupportedFunction(u8),

    #[error("Write echo mismatch: sent ({sent_register:#06X}, {sent_value:#06X}), echoed ({echo_register:#06X}, {echo_value:#06X})")]
    EchoMismatch {
        sent_register: u16,
        sent_value: u16,
        echo_register: u16,
        echo_value: u16,
    },

    #[error("Truncated frame: {received} of {expected} byte(s)")]
    Truncated { expected: usize, received: usize },
}

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Client is not connected")]
    NotConnected,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    #[error("Device exception 0x{:02X} ({})", .code, exception_name(*.code))]
    DeviceException { code: u8 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Serial I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl ModbusError {
    /// Errors after which the connection cannot be used any more.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ModbusError::Connect(_) | ModbusError::NotConnected | ModbusError::Transport(_)
        )
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        ModbusError::Connect(err.to_string())
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for ModbusError {
    fn from(err: toml::ser::Error) -> Self {
        ModbusError::Config(format!("TOML serialize error: {}", err))
    }
}

/// Decoder failures for the force/torque payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Insufficient data: need {expected} value(s), got {actual}")]
    InsufficientData { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Operation not allowed in state {0}")]
    InvalidState(&'static str),

    #[error("Session is not streaming (state {0})")]
    NotStreaming(&'static str),

    #[error(transparent)]
    Modbus(#[from] ModbusError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Modbus(e) => e.is_fatal(),
            _ => false,
        }
    }
}

pub type PollError = SessionError;

/// Standard Modbus exception names.
pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "server device failure",
        0x05 => "acknowledge",
        0x06 => "server device busy",
        0x08 => "memory parity error",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target failed to respond",
        _ => "unknown exception",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ModbusError::Transport("unplugged".to_string()).is_fatal());
        assert!(ModbusError::NotConnected.is_fatal());
        assert!(!ModbusError::Timeout.is_fatal());
        assert!(!ModbusError::DeviceException { code: 2 }.is_fatal());
        assert!(!ModbusError::Protocol(CodecError::TooShort(1)).is_fatal());
        assert!(!ModbusError::Io("framing error".to_string()).is_fatal());
        assert!(!TransportError::Timeout { received: 0 }.is_fatal());
        assert!(!TransportError::Io(io::Error::new(io::ErrorKind::Other, "parity")).is_fatal());
        assert!(TransportError::Disconnected("gone".to_string()).is_fatal());
    }

    #[test]
    fn test_exception_message_names_code() {
        let msg = ModbusError::DeviceException { code: 0x02 }.to_string();
        assert!(msg.contains("0x02"));
        assert!(msg.contains("illegal data address"));
    }
}
