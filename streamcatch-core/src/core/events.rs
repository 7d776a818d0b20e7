use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    Detected {
        generation: u64,
        video_id: String,
    },
    Ready {
        generation: u64,
        video_id: String,
        video_formats: usize,
        audio_formats: usize,
        stale: bool,
    },
    Discarded {
        generation: u64,
        echoed_id: String,
    },
}

pub trait EventEmitter: Send + Sync + 'static {
    fn emit(&self, event: &SessionEvent);
}

#[derive(Clone, Default)]
pub struct TracingEmitter;

impl EventEmitter for TracingEmitter {
    fn emit(&self, event: &SessionEvent) {
        tracing::debug!("[session] {:?}", event);
    }
}

/// Fans session events out to any number of subscribers. Events sent while
/// nobody listens are dropped.
#[derive(Clone)]
pub struct BroadcastEmitter {
    tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit(&self, event: &SessionEvent) {
        let _ = self.tx.send(event.clone());
    }
}
