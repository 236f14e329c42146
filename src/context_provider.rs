//! Optional business-context lookup consumed by the router during triage.
//! Absent (no implementation wired) means no business context is injected.

use async_trait::async_trait;

#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn query(&self, keywords: &str) -> anyhow::Result<Vec<String>>;
    async fn store(&self, entry: String) -> anyhow::Result<()>;
}
