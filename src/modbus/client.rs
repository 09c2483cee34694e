use log::{debug, error, info, warn};
use std::time::Duration;

use super::protocol::{
    decode, encode, expected_response_len, DeviceAddress, ModbusRequest, ModbusResponse,
    RegisterAddress, RegisterCount, EXCEPTION_FLAG, EXCEPTION_FRAME_LEN,
};
use crate::config::settings::SerialConfig;
use crate::transport::{SerialTransport, Transport};
use crate::utils::error::{CodecError, ModbusError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
}

/// Request/response sequencing over one exclusively owned transport.
///
/// The client never retries. A timeout or a bad frame leaves the link open;
/// a fatal transport failure closes it.
pub struct ModbusClient {
    transport: Option<Box<dyn Transport>>,
    timeout: Duration,
}

impl ModbusClient {
    pub fn connect(config: &SerialConfig) -> Result<Self, ModbusError> {
        let transport = SerialTransport::open(config)?;
        Ok(Self::with_transport(Box::new(transport), config.timeout()))
    }

    pub fn with_transport(transport: Box<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            timeout,
        }
    }

    pub fn state(&self) -> ClientState {
        if self.transport.is_some() {
            ClientState::Connected
        } else {
            ClientState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn read_holding_registers(
        &mut self,
        slave_id: DeviceAddress,
        start_addr: RegisterAddress,
        count: RegisterCount,
    ) -> Result<Vec<u16>, ModbusError> {
        debug!(
            "📊 Reading {} registers from device {} starting at 0x{:04X}",
            count, slave_id, start_addr
        );

        let request = ModbusRequest::ReadHoldingRegisters {
            address: start_addr,
            count,
        };
        match self.execute(slave_id, &request)? {
            ModbusResponse::Registers(values) => Ok(values),
            other => Err(unexpected(other)),
        }
    }

    pub fn write_single_register(
        &mut self,
        slave_id: DeviceAddress,
        register: RegisterAddress,
        value: u16,
    ) -> Result<(), ModbusError> {
        debug!(
            "📝 Writing 0x{:04X} to register 0x{:04X} on device {}",
            value, register, slave_id
        );

        let request = ModbusRequest::WriteSingleRegister {
            address: register,
            value,
        };
        match self.execute(slave_id, &request)? {
            ModbusResponse::WriteAck { address, value: echoed } => {
                check_echo(register, value, address, echoed)
            }
            other => Err(unexpected(other)),
        }
    }

    pub fn write_multiple_registers(
        &mut self,
        slave_id: DeviceAddress,
        register: RegisterAddress,
        values: &[u16],
    ) -> Result<(), ModbusError> {
        debug!(
            "📝 Writing {} registers to device {} starting at 0x{:04X}",
            values.len(),
            slave_id,
            register
        );

        let request = ModbusRequest::WriteMultipleRegisters {
            address: register,
            values: values.to_vec(),
        };
        match self.execute(slave_id, &request)? {
            ModbusResponse::WriteAck { address, value: quantity } => {
                check_echo(register, values.len() as u16, address, quantity)
            }
            other => Err(unexpected(other)),
        }
    }

    /// Releases the transport. Safe to call any number of times.
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            info!("🔌 Disconnecting from {}", transport.name());
            transport.close();
        }
    }

    fn execute(
        &mut self,
        slave_id: DeviceAddress,
        request: &ModbusRequest,
    ) -> Result<ModbusResponse, ModbusError> {
        request.validate()?;
        let timeout = self.timeout;
        let transport = self.transport.as_mut().ok_or(ModbusError::NotConnected)?;

        let result = exchange(&mut **transport, slave_id, request, timeout);
        if let Err(ref e) = result {
            if e.is_fatal() {
                error!("💥 Unrecoverable transport failure: {}", e);
                self.disconnect();
            } else {
                warn!("⚠️  Request to device {} failed: {}", slave_id, e);
            }
        }
        result
    }
}

impl Drop for ModbusClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn exchange(
    transport: &mut dyn Transport,
    slave_id: DeviceAddress,
    request: &ModbusRequest,
    timeout: Duration,
) -> Result<ModbusResponse, ModbusError> {
    let frame = encode(request, slave_id);
    debug!("📤 TX [{}]", hex::encode(&frame));

    transport.discard_input().map_err(transport_error)?;
    transport.send(&frame).map_err(transport_error)?;

    let normal_len = expected_response_len(request);
    let mut header = [0u8; 2];
    match transport.receive_exact(&mut header, timeout) {
        Ok(()) => {}
        Err(TransportError::Timeout { received: 0 }) => return Err(ModbusError::Timeout),
        Err(TransportError::Timeout { received }) => {
            return Err(CodecError::Truncated {
                expected: normal_len,
                received,
            }
            .into())
        }
        Err(e) => return Err(transport_error(e)),
    }

    let total = if header[1] & EXCEPTION_FLAG != 0 {
        EXCEPTION_FRAME_LEN
    } else {
        normal_len
    };
    let mut response = vec![0u8; total];
    response[..2].copy_from_slice(&header);

    match transport.receive_exact(&mut response[2..], timeout) {
        Ok(()) => {}
        Err(TransportError::Timeout { received }) => {
            return Err(CodecError::Truncated {
                expected: total,
                received: 2 + received,
            }
            .into())
        }
        Err(e) => return Err(transport_error(e)),
    }
    debug!("📥 RX [{}]", hex::encode(&response));

    match decode(&response, slave_id, request)? {
        ModbusResponse::Exception { code, .. } => Err(ModbusError::DeviceException { code }),
        other => Ok(other),
    }
}

fn transport_error(err: TransportError) -> ModbusError {
    match err {
        TransportError::Timeout { .. } => ModbusError::Timeout,
        TransportError::Io(e) => ModbusError::Io(e.to_string()),
        fatal => ModbusError::Transport(fatal.to_string()),
    }
}

fn check_echo(
    sent_register: u16,
    sent_value: u16,
    echo_register: u16,
    echo_value: u16,
) -> Result<(), ModbusError> {
    if sent_register == echo_register && sent_value == echo_value {
        Ok(())
    } else {
        Err(CodecError::EchoMismatch {
            sent_register,
            sent_value,
            echo_register,
            echo_value,
        }
        .into())
    }
}

fn unexpected(response: ModbusResponse) -> ModbusError {
    CodecError::MalformedResponse(format!("unexpected response {:?}", response)).into()
}
