use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info, warn};
use std::time::Duration;
use tokio::task::block_in_place;

use crate::config::Config;
use crate::modbus::ModbusClient;
use crate::output::{formatter_for, ConsoleSender, FORMAT_NAMES, DataFormatter, DataSender, FileSender};
use crate::sensor::{decode_bytes, SensorReading, SensorSession};
use crate::transport::list_ports;

pub fn build_cli() -> Command {
    Command::new("ftsensor")
        .version(crate::VERSION)
        .about("Six-axis force/torque sensor driver over Modbus RTU")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("TOML configuration file"),
        )
        .arg(Arg::new("port").short('p').long("port").help("Serial port"))
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .value_parser(value_parser!(u32))
                .help("Baud rate"),
        )
        .arg(
            Arg::new("parity")
                .long("parity")
                .help("Parity: none, even or odd"),
        )
        .arg(
            Arg::new("address")
                .short('a')
                .long("address")
                .value_parser(parse_u8)
                .help("Device address (decimal or 0x-prefixed hex)"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_parser(value_parser!(u64))
                .help("Response timeout in milliseconds"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(FORMAT_NAMES)
                .help("Output format"),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .help("Also write formatted output to this file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log every frame sent and received"),
        )
        .subcommand(
            Command::new("stream")
                .about("Start streaming, poll until interrupted, then stop")
                .arg(
                    Arg::new("interval")
                        .short('i')
                        .long("interval")
                        .value_parser(value_parser!(u64))
                        .help("Poll interval in milliseconds"),
                )
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .value_parser(value_parser!(u64))
                        .help("Stop after this many samples"),
                ),
        )
        .subcommand(
            Command::new("read")
                .about("Read holding registers")
                .arg(Arg::new("register").required(true).value_parser(parse_u16))
                .arg(Arg::new("count").required(true).value_parser(parse_u16)),
        )
        .subcommand(
            Command::new("write")
                .about("Write a single holding register")
                .arg(Arg::new("register").required(true).value_parser(parse_u16))
                .arg(Arg::new("value").required(true).value_parser(parse_u16)),
        )
        .subcommand(Command::new("start").about("Send only the start-streaming command"))
        .subcommand(Command::new("stop").about("Send only the stop-streaming command"))
        .subcommand(
            Command::new("decode")
                .about("Decode a hex payload of six big-endian channels")
                .arg(Arg::new("hex").required(true)),
        )
        .subcommand(
            Command::new("genconfig")
                .about("Write the default configuration")
                .arg(Arg::new("path").required(true)),
        )
        .subcommand(Command::new("ports").about("List available serial ports"))
}

pub async fn handle_subcommands(matches: &ArgMatches, config: &Config) -> Result<()> {
    let formatter = formatter_for(&config.output.default_format);
    let mut senders: Vec<Box<dyn DataSender>> = vec![Box::new(ConsoleSender)];
    if let Some(path) = &config.output.file_path {
        info!("📝 Adding file output: {}", path);
        senders.push(Box::new(FileSender::new(path)));
    }

    match matches.subcommand() {
        Some(("stream", sub)) => {
            let interval = sub
                .get_one::<u64>("interval")
                .map(|ms| Duration::from_millis(*ms))
                .unwrap_or_else(|| config.poll_interval());
            let count = sub.get_one::<u64>("count").copied();
            stream(config, interval, count, formatter.as_ref(), &senders).await
        }
        Some(("read", sub)) => {
            let register = *sub.get_one::<u16>("register").context("register")?;
            let count = *sub.get_one::<u16>("count").context("count")?;
            let mut client = ModbusClient::connect(&config.serial)?;
            let registers = block_in_place(|| {
                client.read_holding_registers(config.device_address, register, count)
            })?;
            info!("📥 Raw payload: {}", hex::encode(words_to_bytes(&registers)));
            let text = formatter.format_registers(config.device_address, register, &registers);
            dispatch(&senders, &text).await
        }
        Some(("write", sub)) => {
            let register = *sub.get_one::<u16>("register").context("register")?;
            let value = *sub.get_one::<u16>("value").context("value")?;
            let mut client = ModbusClient::connect(&config.serial)?;
            block_in_place(|| client.write_single_register(config.device_address, register, value))?;
            println!(
                "✅ Wrote 0x{:04X} to register 0x{:04X} on device {}",
                value, register, config.device_address
            );
            Ok(())
        }
        Some(("start", _)) => {
            let mut client = ModbusClient::connect(&config.serial)?;
            block_in_place(|| {
                client.write_multiple_registers(
                    config.device_address,
                    config.commands.command_register,
                    &config.commands.start_registers,
                )
            })?;
            println!("✅ Start command sent to device {}", config.device_address);
            Ok(())
        }
        Some(("stop", _)) => {
            let mut client = ModbusClient::connect(&config.serial)?;
            block_in_place(|| {
                client.write_multiple_registers(
                    config.device_address,
                    config.commands.command_register,
                    &config.commands.stop_registers,
                )
            })?;
            println!("✅ Stop command sent to device {}", config.device_address);
            Ok(())
        }
        Some(("decode", sub)) => {
            let text = sub.get_one::<String>("hex").context("hex")?;
            let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = hex::decode(cleaned.trim_start_matches("0x"))
                .with_context(|| format!("'{}' is not a hex string", text))?;
            let sample = decode_bytes(&bytes)?;
            let reading = SensorReading::new(config.device_address, sample);
            dispatch(&senders, &formatter.format_reading(&reading)).await
        }
        Some(("genconfig", sub)) => {
            let path = sub.get_one::<String>("path").context("path")?;
            Config::default().save_to_file(path)?;
            println!("✅ Default configuration written to {}", path);
            Ok(())
        }
        Some(("ports", _)) => {
            println!("📡 Available Serial Ports:");
            for (index, port) in list_ports()?.iter().enumerate() {
                println!("   {}. {}", index + 1, port.port_name);
                if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                    if let Some(manufacturer) = &usb.manufacturer {
                        println!("      📱 Manufacturer: {}", manufacturer);
                    }
                    if let Some(serial_number) = &usb.serial_number {
                        println!("      🔢 Serial Number: {}", serial_number);
                    }
                }
            }
            Ok(())
        }
        _ => bail!("no subcommand given, see --help"),
    }
}

async fn stream(
    config: &Config,
    interval: Duration,
    count: Option<u64>,
    formatter: &dyn DataFormatter,
    senders: &[Box<dyn DataSender>],
) -> Result<()> {
    let mut session = SensorSession::open(config)?;

    let mut attempts = 0;
    loop {
        match block_in_place(|| session.start()) {
            Ok(()) => break,
            Err(e) if !e.is_fatal() && attempts < config.poll_retries => {
                attempts += 1;
                warn!("⚠️  Start failed ({}), retrying {}/{}", e, attempts, config.poll_retries);
            }
            Err(e) => return Err(e).context("failed to start streaming"),
        }
    }

    info!("🔄 Streaming from device {} every {:?}", config.device_address, interval);
    info!("🛑 Press Ctrl+C to stop");

    let header = formatter.format_header();
    if !header.is_empty() {
        dispatch(senders, &header).await?;
    }

    let mut ticker = tokio::time::interval(interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut delivered = 0u64;
    let mut consecutive_failures = 0u32;
    let outcome: Result<()> = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("🛑 Interrupt received, stopping stream...");
                break Ok(());
            }
            _ = ticker.tick() => {
                match block_in_place(|| session.poll_reading()) {
                    Ok(reading) => {
                        consecutive_failures = 0;
                        if let Err(e) = dispatch(senders, &formatter.format_reading(&reading)).await {
                            break Err(e);
                        }
                        delivered += 1;
                        if count.map_or(false, |limit| delivered >= limit) {
                            break Ok(());
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        error!("💥 Stream aborted: {}", e);
                        break Err(e.into());
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        warn!("📵 Sample dropped: {}", e);
                        if consecutive_failures >= config.max_consecutive_failures {
                            error!("❌ {} consecutive failures, giving up", consecutive_failures);
                            break Err(e.into());
                        }
                    }
                }
            }
        }
    };

    block_in_place(|| session.stop());

    let stats = session.stats();
    let total = stats.successful_polls + stats.failed_polls;
    info!("📊 Final Statistics:");
    info!("   ✅ Successful reads: {}", stats.successful_polls);
    info!("   ❌ Failed reads: {}", stats.failed_polls);
    info!("   ⏰ Retried timeouts: {}", stats.retried_timeouts);
    if total > 0 {
        info!(
            "   📈 Success rate: {:.1}%",
            stats.successful_polls as f64 / total as f64 * 100.0
        );
    }

    outcome
}

async fn dispatch(senders: &[Box<dyn DataSender>], text: &str) -> Result<()> {
    for sender in senders {
        sender
            .send(text)
            .await
            .with_context(|| format!("{} output to {}", sender.sender_type(), sender.destination()))?;
    }
    Ok(())
}

fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("'{}' is not a 16-bit value: {}", s, e))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let value = parse_u16(s)?;
    u8::try_from(value).map_err(|_| format!("'{}' does not fit in one byte", s))
}
