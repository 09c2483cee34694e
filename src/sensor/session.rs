use log::{error, info, warn};
use std::fmt;

use super::decoder::{decode, ForceTorqueSample, SensorReading};
use crate::config::settings::{CommandTable, Config};
use crate::modbus::client::ModbusClient;
use crate::modbus::protocol::DeviceAddress;
use crate::utils::error::{ModbusError, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Stopping,
    Faulted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Starting => "Starting",
            SessionState::Streaming => "Streaming",
            SessionState::Stopping => "Stopping",
            SessionState::Faulted => "Faulted",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub successful_polls: u64,
    pub failed_polls: u64,
    pub retried_timeouts: u64,
}

/// Streaming driver for one sensor. Owns the client, and through it the
/// serial port; dropping the session stops streaming and closes the port.
pub struct SensorSession {
    client: ModbusClient,
    address: DeviceAddress,
    commands: CommandTable,
    poll_retries: u32,
    state: SessionState,
    stats: SessionStats,
}

impl SensorSession {
    /// Validates `config` and opens the serial port it names.
    pub fn open(config: &Config) -> Result<Self, ModbusError> {
        config.validate()?;
        let client = ModbusClient::connect(&config.serial)?;
        Ok(Self::new(client, config.device_address, config.commands.clone())
            .with_poll_retries(config.poll_retries))
    }

    pub fn new(client: ModbusClient, address: DeviceAddress, commands: CommandTable) -> Self {
        Self {
            client,
            address,
            commands,
            poll_retries: 1,
            state: SessionState::Idle,
            stats: SessionStats::default(),
        }
    }

    /// Number of times a timed-out poll is reissued before the timeout is reported.
    pub fn with_poll_retries(mut self, retries: u32) -> Self {
        self.poll_retries = retries;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state.as_str()));
        }
        if !self.client.is_connected() {
            return Err(ModbusError::NotConnected.into());
        }

        info!(
            "▶️  Starting stream on device {} (register 0x{:04X})",
            self.address, self.commands.command_register
        );
        self.state = SessionState::Starting;
        let registers = self.commands.start_registers.clone();

        match self
            .client
            .write_multiple_registers(self.address, self.commands.command_register, &registers)
        {
            Ok(()) => {
                self.state = SessionState::Streaming;
                info!("✅ Device {} is streaming", self.address);
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                self.fault(&e);
                Err(e.into())
            }
            Err(e) => {
                warn!("⚠️  Start command not accepted: {}", e);
                self.state = SessionState::Idle;
                Err(e.into())
            }
        }
    }

    pub fn poll(&mut self) -> Result<ForceTorqueSample, SessionError> {
        if self.state != SessionState::Streaming {
            return Err(SessionError::NotStreaming(self.state.as_str()));
        }

        let mut retries = 0;
        let registers = loop {
            match self.client.read_holding_registers(
                self.address,
                self.commands.data_register,
                self.commands.data_register_count,
            ) {
                Ok(registers) => break registers,
                Err(ModbusError::Timeout) if retries < self.poll_retries => {
                    retries += 1;
                    self.stats.retried_timeouts += 1;
                    warn!(
                        "⏰ Poll timeout on device {}, retrying ({}/{})",
                        self.address, retries, self.poll_retries
                    );
                }
                Err(e) => {
                    self.stats.failed_polls += 1;
                    if e.is_fatal() {
                        self.fault(&e);
                    }
                    return Err(e.into());
                }
            }
        };

        match decode(&registers) {
            Ok(sample) => {
                self.stats.successful_polls += 1;
                Ok(sample)
            }
            Err(e) => {
                self.stats.failed_polls += 1;
                Err(e.into())
            }
        }
    }

    pub fn poll_reading(&mut self) -> Result<SensorReading, SessionError> {
        let sample = self.poll()?;
        Ok(SensorReading::new(self.address, sample))
    }

    /// Best-effort stop followed by disconnect. Never fails and may be
    /// called repeatedly.
    pub fn stop(&mut self) {
        if matches!(self.state, SessionState::Streaming | SessionState::Starting) {
            self.state = SessionState::Stopping;
            let registers = self.commands.stop_registers.clone();
            match self.client.write_multiple_registers(
                self.address,
                self.commands.command_register,
                &registers,
            ) {
                Ok(()) => info!("🛑 Device {} stopped streaming", self.address),
                Err(e) => warn!(
                    "⚠️  Stop command to device {} not acknowledged: {}",
                    self.address, e
                ),
            }
            self.state = SessionState::Idle;
        }
        self.client.disconnect();
    }

    fn fault(&mut self, err: &ModbusError) {
        error!("💥 Session for device {} faulted: {}", self.address, err);
        self.state = SessionState::Faulted;
        self.client.disconnect();
    }
}

impl Drop for SensorSession {
    fn drop(&mut self) {
        self.stop();
    }
}
