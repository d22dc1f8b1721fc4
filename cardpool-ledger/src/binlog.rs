use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use cardpool_common::model::{BaasEvent, PostingReceipt};
use cardpool_common::Result;

/// One line in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BinlogRecord {
    Posting { receipt: PostingReceipt },
    Event { event: BaasEvent },
}

/// Append-only JSON-lines audit log of committed postings and ingested
/// events, kept for offline replay and reconciliation. Not read at boot.
#[derive(Debug)]
pub struct Binlog {
    current_file: File,
    current_offset: u64,
    data_dir: PathBuf,
}

impl Binlog {
    pub async fn new(data_dir: &str) -> Result<Self> {
        let path = Path::new(data_dir).join("binlog");
        fs::create_dir_all(&path).await?;

        let file_path = path.join("00000.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .await?;

        let metadata = file.metadata().await?;

        Ok(Self {
            current_file: file,
            current_offset: metadata.len(),
            data_dir: path,
        })
    }

    pub async fn append(&mut self, record: &BinlogRecord) -> Result<(u64, u64)> {
        let mut data = serde_json::to_vec(record)?;
        data.push(b'\n');
        let len = data.len() as u64;
        let offset = self.current_offset;

        self.current_file.write_all(&data).await?;
        self.current_file.flush().await?;

        self.current_offset += len;

        Ok((offset, len))
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join("00000.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardpool_common::utils::time::current_time;

    #[tokio::test]
    async fn test_append_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut binlog = Binlog::new(dir.path().to_str().unwrap()).await.unwrap();

        let event = BaasEvent {
            provider_name: "MOCK".to_string(),
            provider_event_id: "evt_1".to_string(),
            event_type: "WALLET_FUNDING".to_string(),
            payload: serde_json::json!({"amount": 1}),
            received_at: current_time(),
            processed_at: None,
        };
        let (offset, len) = binlog.append(&BinlogRecord::Event { event: event.clone() }).await.unwrap();
        assert_eq!(offset, 0);
        assert!(len > 0);

        let (offset2, _) = binlog.append(&BinlogRecord::Event { event }).await.unwrap();
        assert_eq!(offset2, len);

        let content = std::fs::read_to_string(binlog.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: BinlogRecord = serde_json::from_str(lines[0]).unwrap();
        match parsed {
            BinlogRecord::Event { event } => assert_eq!(event.provider_event_id, "evt_1"),
            other => panic!("unexpected record: {:?}", other),
        }
    }
}
