use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::models::settings::ProxySettings;
use crate::platforms::traits::{PageDocument, PageHost};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub fn proxy_url(proxy: &ProxySettings) -> Option<String> {
    if !proxy.enabled || proxy.host.is_empty() {
        return None;
    }
    let scheme = match proxy.proxy_type.as_str() {
        "socks5" => "socks5",
        "https" => "https",
        _ => "http",
    };
    if !proxy.username.is_empty() {
        Some(format!(
            "{}://{}:{}@{}:{}",
            scheme, proxy.username, proxy.password, proxy.host, proxy.port
        ))
    } else {
        Some(format!("{}://{}:{}", scheme, proxy.host, proxy.port))
    }
}

pub fn apply_proxy(
    builder: reqwest::ClientBuilder,
    proxy: &ProxySettings,
) -> reqwest::ClientBuilder {
    let Some(url) = proxy_url(proxy) else {
        return builder;
    };
    match reqwest::Proxy::all(&url) {
        Ok(p) => builder.proxy(p),
        Err(e) => {
            tracing::warn!("Invalid proxy URL: {}", e);
            builder
        }
    }
}

/// Page host backed by a plain HTTP fetch of one location. It never sees a
/// live player object, so extraction always goes through the inline scripts.
pub struct HttpPageHost {
    client: reqwest::Client,
    location: String,
}

impl HttpPageHost {
    pub fn new(location: impl Into<String>, proxy: &ProxySettings, timeout: Duration) -> anyhow::Result<Self> {
        let builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout);
        let client = apply_proxy(builder, proxy).build()?;
        Ok(Self {
            client,
            location: location.into(),
        })
    }
}

#[async_trait]
impl PageHost for HttpPageHost {
    async fn active_page(&self) -> anyhow::Result<PageDocument> {
        let response = self
            .client
            .get(&self.location)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .with_context(|| format!("fetch {}", self.location))?
            .error_for_status()?;

        let location = response.url().to_string();
        let html = response.text().await?;
        tracing::debug!("[http] fetched {} ({} bytes)", location, html.len());

        Ok(PageDocument {
            location,
            html,
            player_config: None,
        })
    }
}
