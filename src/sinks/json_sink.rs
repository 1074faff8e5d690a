//! Newline-delimited JSON sink. Each `PageRecord` is one JSON object per
//! line, batched in memory and flushed to the append-mode file every
//! `batch_size` records and on `close`, the same batching shape as
//! `JSONStorage` in the Python original.

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::parser::PageRecord;
use crate::sink::PageSink;

const DEFAULT_BATCH_SIZE: usize = 50;

struct Inner {
    writer: BufWriter<File>,
    buffer: Vec<String>,
}

pub struct JsonSink {
    inner: Mutex<Inner>,
    batch_size: usize,
}

impl JsonSink {
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        Self::with_batch_size(path, DEFAULT_BATCH_SIZE).await
    }

    pub async fn with_batch_size(path: &str, batch_size: usize) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        Ok(Self {
            inner: Mutex::new(Inner {
                writer: BufWriter::new(file),
                buffer: Vec::new(),
            }),
            batch_size,
        })
    }

    async fn flush_locked(inner: &mut Inner) -> anyhow::Result<()> {
        if inner.buffer.is_empty() {
            return Ok(());
        }
        for line in inner.buffer.drain(..) {
            inner.writer.write_all(line.as_bytes()).await?;
            inner.writer.write_all(b"\n").await?;
        }
        inner.writer.flush().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PageSink for JsonSink {
    async fn save(&self, record: &PageRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(record)?;
        let mut inner = self.inner.lock().await;
        inner.buffer.push(line);
        if inner.buffer.len() >= self.batch_size {
            Self::flush_locked(&mut inner).await?;
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        Self::flush_locked(&mut inner).await?;
        inner.writer.shutdown().await?;
        Ok(())
    }
}
