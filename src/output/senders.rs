use async_trait::async_trait;
use log::{debug, error};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::utils::error::ModbusError;

#[async_trait]
pub trait DataSender: Send + Sync {
    async fn send(&self, data: &str) -> Result<(), ModbusError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

#[async_trait]
impl DataSender for ConsoleSender {
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        println!("{}", data);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Appends one record per line, creating the file on first write.
pub struct FileSender {
    file_path: String,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
        }
    }

    fn output_error(&self, action: &str, err: std::io::Error) -> ModbusError {
        error!("❌ Failed to {} {}: {}", action, self.file_path, err);
        ModbusError::Output(format!("Failed to {} {}: {}", action, self.file_path, err))
    }
}

#[async_trait]
impl DataSender for FileSender {
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        if data.is_empty() {
            return Ok(());
        }
        debug!("📝 Writing {} bytes to {}", data.len(), self.file_path);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await
            .map_err(|e| self.output_error("open", e))?;

        file.write_all(data.as_bytes())
            .await
            .map_err(|e| self.output_error("write", e))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| self.output_error("write", e))?;
        file.flush().await.map_err(|e| self.output_error("flush", e))?;
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sender_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        std::fs::write(&path, "old\n").unwrap();

        let sender = FileSender::new(&path);
        sender.send("a,b").await.unwrap();
        sender.send("c,d").await.unwrap();
        sender.send("").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old\na,b\nc,d\n");
        assert_eq!(sender.sender_type(), "file");
    }

    #[tokio::test]
    async fn test_file_sender_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let sender = FileSender::new(dir.path().join("missing").join("out.txt"));
        assert!(matches!(
            sender.send("x").await,
            Err(ModbusError::Output(_))
        ));
    }
}
