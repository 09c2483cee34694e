pub mod error;

pub use error::{CodecError, DecodeError, ModbusError, PollError, SessionError, TransportError};
