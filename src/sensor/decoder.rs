use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::modbus::protocol::DeviceAddress;
use crate::utils::error::DecodeError;

pub const CHANNEL_COUNT: usize = 6;
pub const FORCE_DIVISOR: f64 = 100.0;
pub const TORQUE_DIVISOR: f64 = 1000.0;

/// One six-axis reading. Forces in N, torques in N·m.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ForceTorqueSample {
    pub fx: f64,
    pub fy: f64,
    pub fz: f64,
    pub mx: f64,
    pub my: f64,
    pub mz: f64,
}

/// A sample stamped with where and when it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub device_address: DeviceAddress,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub sample: ForceTorqueSample,
}

impl ForceTorqueSample {
    pub fn force(&self) -> [f64; 3] {
        [self.fx, self.fy, self.fz]
    }

    pub fn torque(&self) -> [f64; 3] {
        [self.mx, self.my, self.mz]
    }

    /// `(name, value, unit)` in wire order.
    pub fn channels(&self) -> [(&'static str, f64, &'static str); CHANNEL_COUNT] {
        [
            ("Fx", self.fx, "N"),
            ("Fy", self.fy, "N"),
            ("Fz", self.fz, "N"),
            ("Mx", self.mx, "Nm"),
            ("My", self.my, "Nm"),
            ("Mz", self.mz, "Nm"),
        ]
    }
}

impl fmt::Display for ForceTorqueSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fx: {} N, Fy: {} N, Fz: {} N, Mx: {} Nm, My: {} Nm, Mz: {} Nm",
            self.fx, self.fy, self.fz, self.mx, self.my, self.mz
        )
    }
}

impl SensorReading {
    pub fn new(device_address: DeviceAddress, sample: ForceTorqueSample) -> Self {
        Self {
            device_address,
            timestamp: Utc::now(),
            sample,
        }
    }
}

/// Decodes the leading six registers; anything after them is ignored.
pub fn decode(registers: &[u16]) -> Result<ForceTorqueSample, DecodeError> {
    if registers.len() < CHANNEL_COUNT {
        return Err(DecodeError::InsufficientData {
            expected: CHANNEL_COUNT,
            actual: registers.len(),
        });
    }

    let raw = |i: usize| registers[i] as i16 as f64;
    Ok(ForceTorqueSample {
        fx: raw(0) / FORCE_DIVISOR,
        fy: raw(1) / FORCE_DIVISOR,
        fz: raw(2) / FORCE_DIVISOR,
        mx: raw(3) / TORQUE_DIVISOR,
        my: raw(4) / TORQUE_DIVISOR,
        mz: raw(5) / TORQUE_DIVISOR,
    })
}

/// Same as [`decode`] over the raw big-endian payload (12 bytes minimum).
pub fn decode_bytes(bytes: &[u8]) -> Result<ForceTorqueSample, DecodeError> {
    if bytes.len() < CHANNEL_COUNT * 2 {
        return Err(DecodeError::InsufficientData {
            expected: CHANNEL_COUNT * 2,
            actual: bytes.len(),
        });
    }

    let registers: Vec<u16> = bytes[..CHANNEL_COUNT * 2]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    decode(&registers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registers(values: [i16; 6]) -> Vec<u16> {
        values.iter().map(|v| *v as u16).collect()
    }

    #[test]
    fn test_decode_scaling() {
        let sample = decode(&registers([250, -300, 1000, 500, -1500, 0])).unwrap();
        assert_eq!(
            sample,
            ForceTorqueSample {
                fx: 2.5,
                fy: -3.0,
                fz: 10.0,
                mx: 0.5,
                my: -1.5,
                mz: 0.0,
            }
        );
    }

    #[test]
    fn test_decode_extremes() {
        let sample = decode(&[0x7FFF, 0x8000, 0xFFFF, 0x7FFF, 0x8000, 0xFFFF]).unwrap();
        assert_eq!(sample.fx, 327.67);
        assert_eq!(sample.fy, -327.68);
        assert_eq!(sample.fz, -0.01);
        assert_eq!(sample.mx, 32.767);
        assert_eq!(sample.my, -32.768);
        assert_eq!(sample.mz, -0.001);
    }

    #[test]
    fn test_decode_ignores_trailing_registers() {
        let mut block = registers([100, 200, 300, 400, 500, 600]);
        block.extend_from_slice(&[0xAAAA; 8]);
        let sample = decode(&block).unwrap();
        assert_eq!(sample.force(), [1.0, 2.0, 3.0]);
        assert_eq!(sample.torque(), [0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_decode_insufficient_data() {
        for len in 0..CHANNEL_COUNT {
            assert_eq!(
                decode(&vec![1u16; len]),
                Err(DecodeError::InsufficientData {
                    expected: 6,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn test_decode_bytes_matches_registers() {
        let bytes = [0x00, 0xFA, 0xFE, 0xD4, 0x03, 0xE8, 0x01, 0xF4, 0xFA, 0x24, 0x00, 0x00];
        assert_eq!(
            decode_bytes(&bytes).unwrap(),
            decode(&registers([250, -300, 1000, 500, -1500, 0])).unwrap()
        );
        assert!(matches!(
            decode_bytes(&bytes[..11]),
            Err(DecodeError::InsufficientData {
                expected: 12,
                actual: 11
            })
        ));
    }

    #[test]
    fn test_reading_serializes_flat() {
        let reading = SensorReading::new(1, decode(&registers([250, 0, 0, 0, 0, 0])).unwrap());
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["device_address"], 1);
        assert_eq!(json["fx"], 2.5);
        assert!(json.get("sample").is_none());
    }
}
