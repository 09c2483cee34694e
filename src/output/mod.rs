pub mod formatters;
pub mod senders;

pub use formatters::{formatter_for, FORMAT_NAMES, ConsoleFormatter, CsvFormatter, DataFormatter, JsonFormatter};
pub use senders::{ConsoleSender, DataSender, FileSender};
