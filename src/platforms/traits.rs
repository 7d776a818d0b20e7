use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the host can tell us about the page it is currently showing.
#[derive(Debug, Clone, Default)]
pub struct PageDocument {
    pub location: String,
    pub html: String,
    /// Player configuration object the page exposes directly, when the host
    /// is able to read it out of the live page.
    pub player_config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadHandle(pub u64);

impl fmt::Display for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait]
pub trait PageHost: Send + Sync {
    async fn active_page(&self) -> anyhow::Result<PageDocument>;
}

/// Platform service that performs the actual transfer.
#[async_trait]
pub trait DownloadService: Send + Sync {
    async fn submit(&self, url: &str, filename: &str) -> anyhow::Result<DownloadHandle>;
}
