//! Short-lived view over the coordinator, opened once per activation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::core::coordinator::CoordinatorHandle;
use crate::core::errors::{DispatchError, QueryError};
use crate::core::session::SessionView;
use crate::models::media::{FormatKind, ResolvedFormat};
use crate::platforms::traits::DownloadHandle;

const NO_DATA_TEXT: &str = "No video detected. Open a video page and try again.";
const LOADING_TEXT: &str = "Reading available formats...";
const STALE_TEXT: &str = "Could not read formats for this video. Reload the page to retry.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatRow {
    pub kind: FormatKind,
    pub itag: String,
    pub text: String,
    pub enabled: bool,
}

type ActionKey = (FormatKind, String);

pub struct ControlSurface {
    coordinator: CoordinatorHandle,
    view: Result<SessionView, QueryError>,
    pending: Arc<Mutex<HashSet<ActionKey>>>,
}

impl ControlSurface {
    pub async fn open(coordinator: CoordinatorHandle) -> Self {
        let view = coordinator.query().await;
        Self {
            coordinator,
            view,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn view(&self) -> Option<&SessionView> {
        self.view.as_ref().ok()
    }

    /// Text shown instead of rows, if any.
    pub fn placeholder(&self) -> Option<&'static str> {
        match &self.view {
            Err(_) => Some(NO_DATA_TEXT),
            Ok(view) if view.catalog.is_empty() && view.stale => Some(STALE_TEXT),
            Ok(view) if view.catalog.is_empty() => Some(LOADING_TEXT),
            Ok(_) => None,
        }
    }

    pub fn rows(&self) -> Vec<FormatRow> {
        let Some(view) = self.view() else {
            return Vec::new();
        };
        view.catalog
            .video
            .iter()
            .chain(view.catalog.audio.iter())
            .map(|format| FormatRow {
                kind: format.kind,
                itag: format.itag.clone(),
                text: format_row_text(format),
                enabled: format.url.is_some() && !self.is_pending(format.kind, &format.itag),
            })
            .collect()
    }

    pub fn is_pending(&self, kind: FormatKind, itag: &str) -> bool {
        self.pending
            .lock()
            .map(|p| p.contains(&(kind, itag.to_string())))
            .unwrap_or(false)
    }

    /// Dispatches one format. The action stays disabled until the
    /// coordinator answers; a repeat in the meantime is refused locally.
    pub async fn download(&self, kind: FormatKind, itag: &str) -> Result<DownloadHandle, DispatchError> {
        let key = (kind, itag.to_string());
        {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| DispatchError::Unavailable)?;
            if !pending.insert(key.clone()) {
                return Err(DispatchError::AlreadyPending);
            }
        }
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            key,
        };

        self.coordinator.dispatch(itag, kind).await
    }
}

struct PendingGuard {
    pending: Arc<Mutex<HashSet<ActionKey>>>,
    key: ActionKey,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.key);
        }
    }
}

/// `"720p 30fps - video/mp4 (12MB)"` / `"medium 128kbps - audio/mp4 (3MB)"`.
pub fn format_row_text(format: &ResolvedFormat) -> String {
    let mut text = format.label.clone();
    match format.kind {
        FormatKind::Video => {
            if let Some(fps) = format.fps {
                text.push_str(&format!(" {}fps", fps));
            }
        }
        FormatKind::Audio => {
            if let Some(bitrate) = format.bitrate {
                text.push_str(&format!(" {}kbps", bitrate.saturating_add(500) / 1000));
            }
        }
    }

    let mime = format.container.split(';').next().unwrap_or_default().trim();
    if !mime.is_empty() {
        text.push_str(" - ");
        text.push_str(mime);
    }
    if let Some(size) = format.size {
        text.push_str(&format!(" ({})", format_size(size)));
    }
    text
}

fn format_size(bytes: u64) -> String {
    const MB: u64 = 1024 * 1024;
    if bytes >= MB {
        format!("{}MB", bytes.saturating_add(MB / 2) / MB)
    } else {
        format!("{}KB", bytes.saturating_add(512) / 1024)
    }
}
