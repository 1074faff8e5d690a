//! Sink implementations: JSON, CSV, SQLite. All batch writes and flush on
//! `close`, grounded in `storage/json_storage.py`, `storage/csv_storage.py`
//! and `storage/sqlite_storage.py`.

pub mod csv_sink;
pub mod json_sink;
pub mod sqlite_sink;

pub use csv_sink::CsvSink;
pub use json_sink::JsonSink;
pub use sqlite_sink::SqliteSink;

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::sink::PageSink;

/// Build the sink named by `storage.type`, creating its output file/DB as
/// needed. `"json"`, `"csv"`, and `"sqlite"` are recognized; anything else
/// is a configuration error.
pub async fn build_sink(storage: &StorageConfig) -> anyhow::Result<Arc<dyn PageSink>> {
    match storage.kind.as_str() {
        "json" => Ok(Arc::new(JsonSink::new(&storage.path).await?)),
        "csv" => Ok(Arc::new(CsvSink::new(&storage.path).await?)),
        "sqlite" => Ok(Arc::new(SqliteSink::new(&storage.path).await?)),
        other => Err(anyhow::anyhow!("unknown storage type: {other}")),
    }
}
