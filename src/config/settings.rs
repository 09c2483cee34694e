use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::modbus::protocol::{DeviceAddress, MAX_WRITE_COUNT, MAX_READ_COUNT};
use crate::output::FORMAT_NAMES;
use crate::sensor::decoder::CHANNEL_COUNT;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub device_address: DeviceAddress,

    // Monitoring settings
    pub poll_interval_ms: u64,
    pub poll_retries: u32,
    pub max_consecutive_failures: u32,

    // Connection settings
    pub serial: SerialConfig,

    // Vendor command table
    pub commands: CommandTable,

    // Output settings
    pub output: OutputConfig,
}

/// Serial line parameters. Copied into the client when a connection opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub stop_bits: u8,
    pub data_bits: u8,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

/// Register layout of the sensor's streaming protocol.
///
/// Each command word is written as one register with function 0x10, so the
/// default start block puts one command byte in the low half of each of 8
/// registers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandTable {
    pub command_register: u16,
    pub start_registers: Vec<u16>,
    pub stop_registers: Vec<u16>,
    pub data_register: u16,
    pub data_register_count: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub default_format: String,
    pub file_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_address: 0x01,
            poll_interval_ms: 1000,
            poll_retries: 1,
            max_consecutive_failures: 10,
            serial: SerialConfig::default(),
            commands: CommandTable::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            parity: ParityConfig::None,
            stop_bits: 1,
            data_bits: 8,
            timeout_ms: 1000,
        }
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self {
            command_register: 0x0100,
            start_registers: vec![0x0001, 0x0010, 0x009A, 0x0000, 0x0002, 0x0000, 0x00EB, 0x006B],
            stop_registers: vec![0x00FF; 8],
            data_register: 0x0100,
            data_register_count: 14,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: "console".to_string(),
            file_path: None,
        }
    }
}

impl FromStr for ParityConfig {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "n" | "none" => Ok(ParityConfig::None),
            "e" | "even" => Ok(ParityConfig::Even),
            "o" | "odd" => Ok(ParityConfig::Odd),
            other => Err(ModbusError::Config(format!("unknown parity '{}'", other))),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.port.trim().is_empty() {
            return Err(ModbusError::Config("serial port is empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ModbusError::Config("baud rate must be positive".to_string()));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ModbusError::Config(format!(
                "data bits {} outside 5..=8",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(ModbusError::Config(format!(
                "stop bits {} must be 1 or 2",
                self.stop_bits
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ModbusError::Config("response timeout must be positive".to_string()));
        }
        Ok(())
    }
}

impl CommandTable {
    pub fn validate(&self) -> Result<(), ModbusError> {
        for (name, block) in [("start", &self.start_registers), ("stop", &self.stop_registers)] {
            if block.is_empty() || block.len() > MAX_WRITE_COUNT as usize {
                return Err(ModbusError::Config(format!(
                    "{} command must hold 1..={} registers, got {}",
                    name,
                    MAX_WRITE_COUNT,
                    block.len()
                )));
            }
        }
        if (self.data_register_count as usize) < CHANNEL_COUNT
            || self.data_register_count > MAX_READ_COUNT
        {
            return Err(ModbusError::Config(format!(
                "data block of {} registers outside {}..={}",
                self.data_register_count, CHANNEL_COUNT, MAX_READ_COUNT
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Loads `--config` when given, then applies command line overrides.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ModbusError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(port) = matches.get_one::<String>("port") {
            config.serial.port = port.clone();
        }
        if let Some(baud) = matches.get_one::<u32>("baud") {
            config.serial.baud_rate = *baud;
        }
        if let Some(parity) = matches.get_one::<String>("parity") {
            config.serial.parity = parity.parse()?;
        }
        if let Some(timeout) = matches.get_one::<u64>("timeout") {
            config.serial.timeout_ms = *timeout;
        }
        if let Some(address) = matches.get_one::<u8>("address") {
            config.device_address = *address;
        }
        if let Some(format) = matches.get_one::<String>("format") {
            config.output.default_format = format.clone();
        }
        if let Some(file) = matches.get_one::<String>("output-file") {
            config.output.file_path = Some(file.clone());
        }

        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("📋 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        let path = path.as_ref();
        // Create directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ModbusError::Config(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| {
            ModbusError::Config(format!("cannot write {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        self.serial.validate()?;
        self.commands.validate()?;
        if self.poll_interval_ms == 0 {
            return Err(ModbusError::Config("poll interval must be positive".to_string()));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ModbusError::Config(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }
        if !FORMAT_NAMES.contains(&self.output.default_format.as_str()) {
            return Err(ModbusError::Config(format!(
                "unknown output format '{}', expected one of {}",
                self.output.default_format,
                FORMAT_NAMES.join(", ")
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::protocol::{encode, ModbusRequest};

    #[test]
    fn test_defaults_match_sensor_reference() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.parity, ParityConfig::None);
        assert_eq!(config.serial.stop_bits, 1);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.serial.timeout(), Duration::from_secs(1));
        assert_eq!(config.device_address, 0x01);
        assert_eq!(config.commands.data_register_count, 14);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_command_frames() {
        let commands = CommandTable::default();
        assert_eq!(commands.start_registers.len(), 8);
        assert_eq!(commands.stop_registers, vec![0x00FF; 8]);

        let start = encode(
            &ModbusRequest::WriteMultipleRegisters {
                address: commands.command_register,
                values: commands.start_registers.clone(),
            },
            0x01,
        );
        assert_eq!(
            &start[..start.len() - 2],
            &[
                0x01, 0x10, 0x01, 0x00, 0x00, 0x08, 0x10, 0x00, 0x01, 0x00, 0x10, 0x00, 0x9A,
                0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0xEB, 0x00, 0x6B,
            ][..]
        );

        let stop = encode(
            &ModbusRequest::WriteMultipleRegisters {
                address: commands.command_register,
                values: commands.stop_registers.clone(),
            },
            0x01,
        );
        assert_eq!(&stop[4..7], &[0x00, 0x08, 0x10]);
        assert!(stop[7..stop.len() - 2].chunks(2).all(|w| w == [0x00, 0xFF]));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut config = Config::default();
        config.commands.stop_registers.clear();
        assert!(matches!(config.validate(), Err(ModbusError::Config(_))));

        let mut config = Config::default();
        config.commands.start_registers = vec![0; MAX_WRITE_COUNT as usize + 1];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_data_block() {
        let mut config = Config::default();
        config.commands.data_register_count = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_serial_parameters() {
        let mut config = Config::default();
        config.serial.stop_bits = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_format() {
        let config: Config = toml::from_str(
            r#"
            [output]
            default_format = "xml"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ModbusError::Config(_))));

        let mut config = Config::default();
        config.output.default_format = "csv".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parity_from_str() {
        assert_eq!("N".parse::<ParityConfig>().unwrap(), ParityConfig::None);
        assert_eq!("even".parse::<ParityConfig>().unwrap(), ParityConfig::Even);
        assert_eq!("O".parse::<ParityConfig>().unwrap(), ParityConfig::Odd);
        assert!("mark".parse::<ParityConfig>().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ftsensor.toml");

        let mut config = Config::default();
        config.serial.port = "/dev/ttyACM3".to_string();
        config.commands.command_register = 0x9A00;
        config.commands.start_registers = vec![0x0001, 0x0002];
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            device_address = 3

            [serial]
            port = "COM4"
            parity = "Even"
            "#,
        )
        .unwrap();
        assert_eq!(config.device_address, 3);
        assert_eq!(config.serial.port, "COM4");
        assert_eq!(config.serial.parity, ParityConfig::Even);
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.commands, CommandTable::default());
    }
}
