//! Scripted in-memory device for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::Transport;
use crate::modbus::protocol::{decode_request, encode_response, ModbusRequest, ModbusResponse};
use crate::utils::error::TransportError;

/// What the device does with the next request it receives.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Say nothing.
    Silent,
    CorruptCrc,
    WrongAddress(u8),
    Exception(u8),
    /// Send only the first n bytes of the reply.
    Truncate(usize),
    /// Acknowledge a write with a different value.
    BadEcho,
    /// The link dies.
    Unplug,
    /// The next read fails with a framing error; the link survives.
    LineNoise,
}

#[derive(Default)]
struct DeviceState {
    address: u8,
    registers: HashMap<u16, u16>,
    faults: VecDeque<Fault>,
    pending: VecDeque<u8>,
    requests: Vec<ModbusRequest>,
    unplugged: bool,
    line_noise: bool,
    close_count: usize,
}

pub struct MockTransport {
    state: Arc<Mutex<DeviceState>>,
}

/// Test-side view of the device once the transport is owned by a client.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<DeviceState>>,
}

impl MockTransport {
    pub fn new(address: u8) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(DeviceState {
            address,
            ..DeviceState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }
}

impl MockHandle {
    pub fn set_registers(&self, start: u16, values: &[u16]) {
        let mut state = self.state.lock().unwrap();
        for (offset, value) in values.iter().enumerate() {
            state.registers.insert(start + offset as u16, *value);
        }
    }

    pub fn register(&self, address: u16) -> u16 {
        self.state
            .lock()
            .unwrap()
            .registers
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    pub fn push_fault(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push_back(fault);
    }

    pub fn requests(&self) -> Vec<ModbusRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().close_count
    }

    /// Leaves garbage in the receive buffer, as a late reply would.
    pub fn inject_stale(&self, bytes: &[u8]) {
        self.state.lock().unwrap().pending.extend(bytes);
    }
}

impl DeviceState {
    fn respond(&mut self, request: &ModbusRequest) -> ModbusResponse {
        match request {
            ModbusRequest::ReadHoldingRegisters { address, count } => ModbusResponse::Registers(
                (0..*count)
                    .map(|i| self.registers.get(&(address + i)).copied().unwrap_or(0))
                    .collect(),
            ),
            ModbusRequest::WriteSingleRegister { address, value } => {
                self.registers.insert(*address, *value);
                ModbusResponse::WriteAck {
                    address: *address,
                    value: *value,
                }
            }
            ModbusRequest::WriteMultipleRegisters { address, values } => {
                for (offset, value) in values.iter().enumerate() {
                    self.registers.insert(address + offset as u16, *value);
                }
                ModbusResponse::WriteAck {
                    address: *address,
                    value: values.len() as u16,
                }
            }
        }
    }
}

impl Transport for MockTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.unplugged {
            return Err(TransportError::Disconnected("device unplugged".to_string()));
        }

        let (address, request) = match decode_request(frame) {
            Ok(parsed) => parsed,
            Err(_) => return Ok(()),
        };
        state.requests.push(request.clone());
        if address != state.address {
            return Ok(());
        }

        let fault = state.faults.pop_front();
        let mut response = state.respond(&request);
        let mut reply_address = state.address;

        match &fault {
            Some(Fault::Silent) => return Ok(()),
            Some(Fault::Unplug) => {
                state.unplugged = true;
                return Ok(());
            }
            Some(Fault::LineNoise) => {
                state.line_noise = true;
                return Ok(());
            }
            Some(Fault::Exception(code)) => {
                response = ModbusResponse::Exception {
                    function: request.function_code(),
                    code: *code,
                };
            }
            Some(Fault::WrongAddress(other)) => reply_address = *other,
            Some(Fault::BadEcho) => {
                if let ModbusResponse::WriteAck { address, value } = response {
                    response = ModbusResponse::WriteAck {
                        address,
                        value: value.wrapping_add(1),
                    };
                }
            }
            _ => {}
        }

        let mut reply = encode_response(reply_address, &request, &response);
        match fault {
            Some(Fault::CorruptCrc) => {
                let last = reply.len() - 1;
                reply[last] ^= 0xFF;
            }
            Some(Fault::Truncate(n)) => reply.truncate(n),
            _ => {}
        }

        state.pending.extend(reply);
        Ok(())
    }

    fn receive_exact(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.unplugged {
            return Err(TransportError::Disconnected("device unplugged".to_string()));
        }
        if state.line_noise {
            state.line_noise = false;
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "framing error",
            )));
        }

        let available = state.pending.len().min(buf.len());
        for slot in buf.iter_mut().take(available) {
            *slot = state.pending.pop_front().unwrap();
        }
        if available < buf.len() {
            return Err(TransportError::Timeout {
                received: available,
            });
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().pending.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().unwrap().close_count += 1;
    }

    fn name(&self) -> &str {
        "mock"
    }
}
