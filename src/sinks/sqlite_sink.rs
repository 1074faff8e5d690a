//! SQLite sink. Same `pages` table and `INSERT OR REPLACE` batching as
//! `SQLiteStorage`, with `links`/`metadata` JSON-encoded into TEXT columns.
//! `rusqlite` is synchronous, so every call into the connection runs on a
//! blocking thread via `spawn_blocking` rather than on the async runtime.

use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::parser::PageRecord;
use crate::sink::PageSink;

const DEFAULT_BATCH_SIZE: usize = 50;

struct PendingRow {
    url: String,
    title: String,
    text: String,
    links: String,
    metadata: String,
    crawled_at: String,
    status_code: u16,
    content_type: Option<String>,
}

impl From<&PageRecord> for PendingRow {
    fn from(record: &PageRecord) -> Self {
        Self {
            url: record.url.to_string(),
            title: record.title.clone(),
            text: record.text.clone(),
            links: serde_json::to_string(&record.links).unwrap_or_default(),
            metadata: serde_json::to_string(&record.metadata).unwrap_or_default(),
            crawled_at: record.crawled_at.to_rfc3339(),
            status_code: record.status_code,
            content_type: record.content_type.clone(),
        }
    }
}

pub struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
    buffer: Mutex<Vec<PendingRow>>,
    batch_size: usize,
}

impl SqliteSink {
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        Self::with_batch_size(path, DEFAULT_BATCH_SIZE).await
    }

    pub async fn with_batch_size(path: &str, batch_size: usize) -> anyhow::Result<Self> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(path)?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS pages (
                    url TEXT PRIMARY KEY,
                    title TEXT,
                    text TEXT,
                    links TEXT,
                    metadata TEXT,
                    crawled_at TEXT,
                    status_code INTEGER,
                    content_type TEXT
                )",
                [],
            )?;
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            buffer: Mutex::new(Vec::new()),
            batch_size,
        })
    }

    async fn flush(&self) -> anyhow::Result<()> {
        let rows = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *buffer)
        };

        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> rusqlite::Result<()> {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO pages
                     (url, title, text, links, metadata, crawled_at, status_code, content_type)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for row in &rows {
                    stmt.execute(rusqlite::params![
                        row.url,
                        row.title,
                        row.text,
                        row.links,
                        row.metadata,
                        row.crawled_at,
                        row.status_code,
                        row.content_type,
                    ])?;
                }
            }
            tx.commit()
        })
        .await??;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PageSink for SqliteSink {
    async fn save(&self, record: &PageRecord) -> anyhow::Result<()> {
        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(PendingRow::from(record));
            buffer.len() >= self.batch_size
        };
        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.flush().await
    }
}
