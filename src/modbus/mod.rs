pub mod client;
pub mod protocol;
pub mod crc;

pub use client::{ClientState, ModbusClient};
pub use protocol::{
    decode, decode_request, encode, encode_response, DeviceAddress, ModbusRequest, ModbusResponse,
    RegisterAddress, RegisterCount,
};
pub use crc::crc16_modbus;
