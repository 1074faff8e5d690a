//! Sink contract: append-only `save` + `close`. Ordering across records is
//! not guaranteed; batching is each sink's own choice. The core is
//! sink-agnostic: `Orchestrator` only ever talks to this trait object.

use async_trait::async_trait;

use crate::parser::PageRecord;

#[async_trait]
pub trait PageSink: Send + Sync {
    async fn save(&self, record: &PageRecord) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}
