pub mod decoder;
pub mod session;

pub use decoder::{decode, decode_bytes, ForceTorqueSample, SensorReading};
pub use session::{SensorSession, SessionState, SessionStats};
