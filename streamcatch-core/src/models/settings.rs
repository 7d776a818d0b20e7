use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub schema_version: u32,
    #[serde(default)]
    pub observer: ObserverSettings,
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverSettings {
    /// Delay after an in-page route change before re-reading the markup.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_store_file")]
    pub store_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Used when the page title sanitizes down to nothing.
    #[serde(default = "default_fallback_title")]
    pub fallback_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProxySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_proxy_type")]
    pub proxy_type: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_mailbox_capacity() -> usize {
    64
}

fn default_event_capacity() -> usize {
    32
}

pub fn default_namespace() -> String {
    "streamcatch.session".into()
}

fn default_store_file() -> String {
    "session-store.json".into()
}

pub fn default_fallback_title() -> String {
    "video".into()
}

fn default_proxy_type() -> String {
    "http".into()
}

fn default_proxy_port() -> u16 {
    8080
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            store_file: default_store_file(),
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            fallback_title: default_fallback_title(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: 1,
            observer: ObserverSettings::default(),
            coordinator: CoordinatorSettings::default(),
            storage: StorageSettings::default(),
            download: DownloadSettings::default(),
            proxy: ProxySettings::default(),
        }
    }
}
