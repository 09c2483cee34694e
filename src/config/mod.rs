pub mod settings;

pub use settings::{CommandTable, Config, OutputConfig, ParityConfig, SerialConfig};
