//! CSV sink. Fixed column set (url/title/text/links/metadata/status_code/
//! content_type/crawled_at), links and metadata flattened to JSON strings
//! per cell since CSV has no nested-value notion, the same flattening
//! `CSVStorage` leans on implicitly by writing whatever `json.dumps`-able
//! dict it's handed. Batched the same way: buffer rows, flush every
//! `batch_size` records and on close.

use tokio::sync::Mutex;

use crate::parser::PageRecord;
use crate::sink::PageSink;

const DEFAULT_BATCH_SIZE: usize = 50;

struct Row {
    url: String,
    title: String,
    text: String,
    links: String,
    metadata: String,
    status_code: u16,
    content_type: String,
    crawled_at: String,
}

impl From<&PageRecord> for Row {
    fn from(record: &PageRecord) -> Self {
        Self {
            url: record.url.to_string(),
            title: record.title.clone(),
            text: record.text.clone(),
            links: serde_json::to_string(&record.links).unwrap_or_default(),
            metadata: serde_json::to_string(&record.metadata).unwrap_or_default(),
            status_code: record.status_code,
            content_type: record.content_type.clone().unwrap_or_default(),
            crawled_at: record.crawled_at.to_rfc3339(),
        }
    }
}

struct Inner {
    path: std::path::PathBuf,
    header_written: bool,
    buffer: Vec<Row>,
}

pub struct CsvSink {
    inner: Mutex<Inner>,
    batch_size: usize,
}

impl CsvSink {
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        Self::with_batch_size(path, DEFAULT_BATCH_SIZE).await
    }

    pub async fn with_batch_size(path: &str, batch_size: usize) -> anyhow::Result<Self> {
        let path = std::path::PathBuf::from(path);
        let header_written = path.exists() && std::fs::metadata(&path)?.len() > 0;
        Ok(Self {
            inner: Mutex::new(Inner {
                path,
                header_written,
                buffer: Vec::new(),
            }),
            batch_size,
        })
    }

    fn flush_locked(inner: &mut Inner) -> anyhow::Result<()> {
        if inner.buffer.is_empty() {
            return Ok(());
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&inner.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(std::io::BufWriter::new(file));

        if !inner.header_written {
            writer.write_record([
                "url",
                "title",
                "text",
                "links",
                "metadata",
                "status_code",
                "content_type",
                "crawled_at",
            ])?;
            inner.header_written = true;
        }

        for row in inner.buffer.drain(..) {
            writer.write_record([
                row.url,
                row.title,
                row.text,
                row.links,
                row.metadata,
                row.status_code.to_string(),
                row.content_type,
                row.crawled_at,
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PageSink for CsvSink {
    async fn save(&self, record: &PageRecord) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        inner.buffer.push(Row::from(record));
        if inner.buffer.len() >= self.batch_size {
            Self::flush_locked(&mut inner)?;
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        Self::flush_locked(&mut inner)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use url::Url;

    fn sample_record() -> PageRecord {
        crate::parser::parse(
            "<html><head><title>T</title></head><body>hi</body></html>",
            Url::parse("https://example.com/").unwrap(),
            200,
            None,
            Utc::now(),
        )
    }

    fn tempdir() -> std::path::PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("async_crawler_test_{}_{n}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn writes_header_once_and_one_row_per_record() {
        let dir = tempdir();
        let path = dir.join("out.csv");
        let sink = CsvSink::with_batch_size(path.to_str().unwrap(), 10).await.unwrap();

        sink.save(&sample_record()).await.unwrap();
        sink.save(&sample_record()).await.unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "url,title,text,links,metadata,status_code,content_type,crawled_at");
        assert_eq!(lines.count(), 2);
    }

    #[tokio::test]
    async fn flushes_automatically_at_batch_size() {
        let dir = tempdir();
        let path = dir.join("out.csv");
        let sink = CsvSink::with_batch_size(path.to_str().unwrap(), 1).await.unwrap();

        sink.save(&sample_record()).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn reopening_an_existing_file_does_not_rewrite_the_header() {
        let dir = tempdir();
        let path = dir.join("out.csv");
        {
            let sink = CsvSink::with_batch_size(path.to_str().unwrap(), 10).await.unwrap();
            sink.save(&sample_record()).await.unwrap();
            sink.close().await.unwrap();
        }
        let sink = CsvSink::with_batch_size(path.to_str().unwrap(), 10).await.unwrap();
        sink.save(&sample_record()).await.unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("status_code").count(), 1);
    }
}
