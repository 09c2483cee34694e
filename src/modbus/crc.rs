/// CRC-16/MODBUS: reflected polynomial 0xA001, initial value 0xFFFF.
/// Goes on the wire low byte first.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let poly: u16 = 0xA001;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Appends the CRC trailer in wire order.
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16_modbus(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Checks the trailing two bytes of `frame` against the CRC of everything before them.
/// Returns `(calculated, received)` on mismatch.
pub fn verify_crc(frame: &[u8]) -> Result<(), (u16, u16)> {
    if frame.len() < 2 {
        return Err((0, 0));
    }
    let data_len = frame.len() - 2;
    let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    let calculated = crc16_modbus(&frame[..data_len]);
    if received == calculated {
        Ok(())
    } else {
        Err((calculated, received))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus_check_value() {
        assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_crc16_modbus_known_frame() {
        // Read one holding register at 0 from unit 1.
        let mut frame = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        append_crc(&mut frame);
        assert_eq!(&frame[6..], &[0x84, 0x0A]);
        assert!(verify_crc(&frame).is_ok());
    }

    #[test]
    fn test_verify_crc_rejects_flipped_bit() {
        let mut frame = vec![0x01, 0x03, 0x02, 0x12, 0x34];
        append_crc(&mut frame);
        frame[3] ^= 0x01;
        assert!(verify_crc(&frame).is_err());
    }

    #[test]
    fn test_crc_of_empty_is_initial_value() {
        assert_eq!(crc16_modbus(&[]), 0xFFFF);
    }
}
