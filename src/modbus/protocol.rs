//! Modbus RTU framing: `[address][function][payload][CRC-16 LE]`.
//!
//! Everything here is a pure transform over byte slices. The client decides
//! how many bytes to pull off the wire using [`expected_response_len`].

use super::crc::{append_crc, verify_crc};
use crate::utils::error::{CodecError, ModbusError};

pub type DeviceAddress = u8;
pub type RegisterAddress = u16;
pub type RegisterCount = u16;

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
pub const EXCEPTION_FLAG: u8 = 0x80;

/// address + function + CRC
pub const MIN_FRAME_LEN: usize = 4;
/// address + function + exception code + CRC
pub const EXCEPTION_FRAME_LEN: usize = 5;
/// address + function + register + value + CRC
pub const WRITE_ACK_FRAME_LEN: usize = 8;

pub const MAX_READ_COUNT: RegisterCount = 125;
pub const MAX_WRITE_COUNT: RegisterCount = 123;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadHoldingRegisters {
        address: RegisterAddress,
        count: RegisterCount,
    },
    WriteSingleRegister {
        address: RegisterAddress,
        value: u16,
    },
    WriteMultipleRegisters {
        address: RegisterAddress,
        values: Vec<u16>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    Registers(Vec<u16>),
    /// Echo of a write. `value` is the written value for 0x06 and the
    /// register quantity for 0x10.
    WriteAck { address: RegisterAddress, value: u16 },
    Exception { function: u8, code: u8 },
}

impl ModbusRequest {
    pub fn function_code(&self) -> u8 {
        match self {
            ModbusRequest::ReadHoldingRegisters { .. } => READ_HOLDING_REGISTERS,
            ModbusRequest::WriteSingleRegister { .. } => WRITE_SINGLE_REGISTER,
            ModbusRequest::WriteMultipleRegisters { .. } => WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// Rejects requests the protocol cannot carry before any byte is sent.
    pub fn validate(&self) -> Result<(), ModbusError> {
        match self {
            ModbusRequest::ReadHoldingRegisters { count, .. } => {
                if *count == 0 || *count > MAX_READ_COUNT {
                    return Err(ModbusError::InvalidRequest(format!(
                        "read count {} outside 1..={}",
                        count, MAX_READ_COUNT
                    )));
                }
            }
            ModbusRequest::WriteSingleRegister { .. } => {}
            ModbusRequest::WriteMultipleRegisters { values, .. } => {
                if values.is_empty() || values.len() > MAX_WRITE_COUNT as usize {
                    return Err(ModbusError::InvalidRequest(format!(
                        "write count {} outside 1..={}",
                        values.len(),
                        MAX_WRITE_COUNT
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Builds a complete request frame for `address`.
pub fn encode(request: &ModbusRequest, address: DeviceAddress) -> Vec<u8> {
    let mut frame = vec![address, request.function_code()];

    match request {
        ModbusRequest::ReadHoldingRegisters { address, count } => {
            frame.extend_from_slice(&address.to_be_bytes());
            frame.extend_from_slice(&count.to_be_bytes());
        }
        ModbusRequest::WriteSingleRegister { address, value } => {
            frame.extend_from_slice(&address.to_be_bytes());
            frame.extend_from_slice(&value.to_be_bytes());
        }
        ModbusRequest::WriteMultipleRegisters { address, values } => {
            debug_assert!(
                values.len() <= MAX_WRITE_COUNT as usize,
                "write of {} registers exceeds the byte count field",
                values.len()
            );
            frame.extend_from_slice(&address.to_be_bytes());
            frame.extend_from_slice(&(values.len() as u16).to_be_bytes());
            frame.push((values.len() * 2) as u8);
            for value in values {
                frame.extend_from_slice(&value.to_be_bytes());
            }
        }
    }

    append_crc(&mut frame);
    frame
}

/// Length of a normal (non-exception) reply to `request`.
pub fn expected_response_len(request: &ModbusRequest) -> usize {
    match request {
        ModbusRequest::ReadHoldingRegisters { count, .. } => 5 + (*count as usize) * 2,
        ModbusRequest::WriteSingleRegister { .. } | ModbusRequest::WriteMultipleRegisters { .. } => {
            WRITE_ACK_FRAME_LEN
        }
    }
}

/// Parses a reply to `request`, which must come from `expected_address`.
///
/// The CRC is checked before anything else in the frame is trusted, so a
/// corrupted byte anywhere (address included) reports [`CodecError::Crc`].
pub fn decode(
    bytes: &[u8],
    expected_address: DeviceAddress,
    request: &ModbusRequest,
) -> Result<ModbusResponse, CodecError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(CodecError::TooShort(bytes.len()));
    }

    verify_crc(bytes).map_err(|(calculated, received)| CodecError::Crc {
        calculated,
        received,
    })?;

    if bytes[0] != expected_address {
        return Err(CodecError::AddressMismatch {
            expected: expected_address,
            actual: bytes[0],
        });
    }

    let function = bytes[1];
    let payload = &bytes[2..bytes.len() - 2];
    let expected_function = request.function_code();

    if function & EXCEPTION_FLAG != 0 {
        if function & !EXCEPTION_FLAG != expected_function {
            return Err(CodecError::UnexpectedFunction {
                expected: expected_function | EXCEPTION_FLAG,
                actual: function,
            });
        }
        if payload.len() != 1 {
            return Err(CodecError::MalformedResponse(format!(
                "exception payload of {} bytes",
                payload.len()
            )));
        }
        return Ok(ModbusResponse::Exception {
            function: expected_function,
            code: payload[0],
        });
    }

    if function != expected_function {
        return Err(CodecError::UnexpectedFunction {
            expected: expected_function,
            actual: function,
        });
    }

    match request {
        ModbusRequest::ReadHoldingRegisters { count, .. } => {
            let (&byte_count, data) = payload
                .split_first()
                .ok_or_else(|| CodecError::MalformedResponse("missing byte count".to_string()))?;
            let byte_count = byte_count as usize;
            if byte_count != (*count as usize) * 2 {
                return Err(CodecError::MalformedResponse(format!(
                    "declared {} bytes for {} registers",
                    byte_count, count
                )));
            }
            if data.len() != byte_count {
                return Err(CodecError::MalformedResponse(format!(
                    "declared {} bytes, carried {}",
                    byte_count,
                    data.len()
                )));
            }
            Ok(ModbusResponse::Registers(be_words(data)))
        }
        ModbusRequest::WriteSingleRegister { .. } | ModbusRequest::WriteMultipleRegisters { .. } => {
            if payload.len() != 4 {
                return Err(CodecError::MalformedResponse(format!(
                    "write echo of {} bytes",
                    payload.len()
                )));
            }
            Ok(ModbusResponse::WriteAck {
                address: u16::from_be_bytes([payload[0], payload[1]]),
                value: u16::from_be_bytes([payload[2], payload[3]]),
            })
        }
    }
}

/// Parses a request frame as a device would see it.
pub fn decode_request(bytes: &[u8]) -> Result<(DeviceAddress, ModbusRequest), CodecError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(CodecError::TooShort(bytes.len()));
    }

    verify_crc(bytes).map_err(|(calculated, received)| CodecError::Crc {
        calculated,
        received,
    })?;

    let address = bytes[0];
    let function = bytes[1];
    let payload = &bytes[2..bytes.len() - 2];

    let request = match function {
        READ_HOLDING_REGISTERS | WRITE_SINGLE_REGISTER => {
            if payload.len() != 4 {
                return Err(CodecError::MalformedResponse(format!(
                    "function 0x{:02X} payload of {} bytes",
                    function,
                    payload.len()
                )));
            }
            let register = u16::from_be_bytes([payload[0], payload[1]]);
            let word = u16::from_be_bytes([payload[2], payload[3]]);
            if function == READ_HOLDING_REGISTERS {
                ModbusRequest::ReadHoldingRegisters {
                    address: register,
                    count: word,
                }
            } else {
                ModbusRequest::WriteSingleRegister {
                    address: register,
                    value: word,
                }
            }
        }
        WRITE_MULTIPLE_REGISTERS => {
            if payload.len() < 5 {
                return Err(CodecError::MalformedResponse(
                    "write multiple header truncated".to_string(),
                ));
            }
            let register = u16::from_be_bytes([payload[0], payload[1]]);
            let quantity = u16::from_be_bytes([payload[2], payload[3]]) as usize;
            let byte_count = payload[4] as usize;
            let data = &payload[5..];
            if byte_count != quantity * 2 || data.len() != byte_count {
                return Err(CodecError::MalformedResponse(format!(
                    "quantity {} with byte count {} and {} data bytes",
                    quantity,
                    byte_count,
                    data.len()
                )));
            }
            ModbusRequest::WriteMultipleRegisters {
                address: register,
                values: be_words(data),
            }
        }
        other => return Err(CodecError::UnsupportedFunction(other)),
    };

    Ok((address, request))
}

/// Builds the frame a device at `address` sends back for `request`.
pub fn encode_response(
    address: DeviceAddress,
    request: &ModbusRequest,
    response: &ModbusResponse,
) -> Vec<u8> {
    let mut frame = vec![address];

    match response {
        ModbusResponse::Registers(values) => {
            debug_assert!(
                values.len() <= MAX_READ_COUNT as usize,
                "reply of {} registers exceeds the byte count field",
                values.len()
            );
            frame.push(request.function_code());
            frame.push((values.len() * 2) as u8);
            for value in values {
                frame.extend_from_slice(&value.to_be_bytes());
            }
        }
        ModbusResponse::WriteAck { address, value } => {
            frame.push(request.function_code());
            frame.extend_from_slice(&address.to_be_bytes());
            frame.extend_from_slice(&value.to_be_bytes());
        }
        ModbusResponse::Exception { function, code } => {
            frame.push(function | EXCEPTION_FLAG);
            frame.push(*code);
        }
    }

    append_crc(&mut frame);
    frame
}

fn be_words(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}
