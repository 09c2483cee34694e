use chrono::Utc;

use crate::sensor::decoder::SensorReading;

pub trait DataFormatter: Send + Sync {
    fn format_reading(&self, reading: &SensorReading) -> String;
    fn format_registers(&self, addr: u8, start: u16, registers: &[u16]) -> String;
    fn format_header(&self) -> String;
}

pub const FORMAT_NAMES: [&str; 3] = ["console", "json", "csv"];

/// Picks a formatter by name, falling back to the console one.
pub fn formatter_for(name: &str) -> Box<dyn DataFormatter> {
    match name {
        "json" => Box::new(JsonFormatter),
        "csv" => Box::new(CsvFormatter),
        _ => Box::new(ConsoleFormatter),
    }
}

pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format_reading(&self, reading: &SensorReading) -> String {
        let sample = &reading.sample;
        format!(
            "🔹 Device {} @ {}\n   Fx: {:.2} N, Fy: {:.2} N, Fz: {:.2} N\n   Mx: {:.3} Nm, My: {:.3} Nm, Mz: {:.3} Nm",
            reading.device_address,
            reading.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            sample.fx,
            sample.fy,
            sample.fz,
            sample.mx,
            sample.my,
            sample.mz
        )
    }

    fn format_registers(&self, addr: u8, start: u16, registers: &[u16]) -> String {
        let mut output = format!("📊 Device {} registers:\n", addr);
        for (offset, value) in registers.iter().enumerate() {
            output.push_str(&format!(
                "  0x{:04X}: 0x{:04X} ({})\n",
                start as usize + offset,
                value,
                value
            ));
        }
        output
    }

    fn format_header(&self) -> String {
        format!(
            "🚀 Force/Torque Sensor Data - {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        )
    }
}

pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format_reading(&self, reading: &SensorReading) -> String {
        serde_json::to_string(reading).unwrap_or_default()
    }

    fn format_registers(&self, addr: u8, start: u16, registers: &[u16]) -> String {
        let result = serde_json::json!({
            "device_address": addr,
            "start_register": start,
            "timestamp": Utc::now().to_rfc3339(),
            "registers": registers,
        });
        serde_json::to_string(&result).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new() // JSON doesn't need headers
    }
}

pub struct CsvFormatter;

impl DataFormatter for CsvFormatter {
    fn format_reading(&self, reading: &SensorReading) -> String {
        let sample = &reading.sample;
        format!(
            "{},{},{},{},{},{},{},{}",
            reading.timestamp.to_rfc3339(),
            reading.device_address,
            sample.fx,
            sample.fy,
            sample.fz,
            sample.mx,
            sample.my,
            sample.mz
        )
    }

    fn format_registers(&self, addr: u8, start: u16, registers: &[u16]) -> String {
        registers
            .iter()
            .enumerate()
            .map(|(offset, value)| format!("{},{},{}", addr, start as usize + offset, value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_header(&self) -> String {
        "timestamp,device_address,fx,fy,fz,mx,my,mz".to_string()
    }
}
