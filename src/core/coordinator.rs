//! The session coordinator: one task owns `SessionState` and every mutation
//! goes through its mailbox.
//!
//! Extraction runs on a spawned task and reports back with an
//! `ExtractionFinished` message, so detections, queries and dispatches keep
//! flowing while a page is being read. A result is only committed when its
//! generation and echoed video id still match the current session; that
//! check and the write happen inside the same message handler.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::{mpsc, oneshot};

use super::errors::{DispatchError, QueryError};
use super::events::{EventEmitter, SessionEvent};
use super::filename::download_filename;
use super::instructions::{self, InstructionSheet};
use super::session::{Commit, Detection, SessionPhase, SessionState, SessionView};
use crate::models::descriptor::ExtractionResult;
use crate::models::media::{FormatKind, VideoIdentity};
use crate::models::settings::AppSettings;
use crate::platforms::traits::{DownloadHandle, DownloadService, PageHost};
use crate::platforms::youtube::extractor;
use crate::storage::snapshot::SnapshotStore;

enum Command {
    IdentityDetected(VideoIdentity),
    Query(oneshot::Sender<Result<SessionView, QueryError>>),
    Dispatch {
        kind: FormatKind,
        itag: String,
        reply: oneshot::Sender<Result<DownloadHandle, DispatchError>>,
    },
    Instructions {
        kind: FormatKind,
        reply: oneshot::Sender<Result<InstructionSheet, QueryError>>,
    },
    ExtractionFinished {
        generation: u64,
        result: ExtractionResult,
    },
}

/// Host collaborators the coordinator talks to.
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub host: Arc<dyn PageHost>,
    pub store: Arc<dyn SnapshotStore>,
    pub downloads: Arc<dyn DownloadService>,
    pub events: Arc<dyn EventEmitter>,
}

#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    pub async fn identity_detected(&self, identity: VideoIdentity) {
        if self.tx.send(Command::IdentityDetected(identity)).await.is_err() {
            tracing::warn!("[coordinator] gone, detection dropped");
        }
    }

    pub async fn query(&self) -> Result<SessionView, QueryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Query(reply))
            .await
            .map_err(|_| QueryError::Unavailable)?;
        rx.await.map_err(|_| QueryError::Unavailable)?
    }

    pub async fn dispatch(
        &self,
        format_id: &str,
        kind: FormatKind,
    ) -> Result<DownloadHandle, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Dispatch {
                kind,
                itag: format_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| DispatchError::Unavailable)?;
        rx.await.map_err(|_| DispatchError::Unavailable)?
    }

    pub async fn instructions(&self, kind: FormatKind) -> Result<InstructionSheet, QueryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Instructions { kind, reply })
            .await
            .map_err(|_| QueryError::Unavailable)?;
        rx.await.map_err(|_| QueryError::Unavailable)?
    }
}

pub struct Coordinator {
    state: SessionState,
    /// Generation whose extraction has not reported back yet.
    in_flight: Option<u64>,
    deps: CoordinatorDeps,
    namespace: String,
    fallback_title: String,
    mailbox: mpsc::WeakSender<Command>,
}

impl Coordinator {
    /// Starts the coordinator task. It runs until every handle is dropped
    /// and no extraction is outstanding.
    pub fn spawn(deps: CoordinatorDeps, settings: &AppSettings) -> CoordinatorHandle {
        let (tx, rx) = mpsc::channel(settings.coordinator.mailbox_capacity.max(1));
        let actor = Coordinator {
            state: SessionState::default(),
            in_flight: None,
            deps,
            namespace: settings.storage.namespace.clone(),
            fallback_title: settings.download.fallback_title.clone(),
            mailbox: tx.downgrade(),
        };
        tokio::spawn(actor.run(rx));
        CoordinatorHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::debug!("[coordinator] started");
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
        tracing::debug!("[coordinator] stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::IdentityDetected(identity) => self.on_identity_detected(identity).await,
            Command::Query(reply) => {
                self.ensure_loaded().await;
                let _ = reply.send(self.state.view().ok_or(QueryError::NoData));
            }
            Command::Dispatch { kind, itag, reply } => self.on_dispatch(kind, itag, reply).await,
            Command::Instructions { kind, reply } => {
                self.ensure_loaded().await;
                let sheet = self
                    .state
                    .identity
                    .as_ref()
                    .map(|identity| {
                        instructions::render(identity, kind, &self.fallback_title, Local::now())
                    })
                    .ok_or(QueryError::NoData);
                let _ = reply.send(sheet);
            }
            Command::ExtractionFinished { generation, result } => {
                self.on_extraction_finished(generation, result).await
            }
        }
    }

    /// Adopts the persisted snapshot while nothing is held in memory. Storage
    /// errors leave the session empty.
    async fn ensure_loaded(&mut self) {
        if !self.state.is_empty() {
            return;
        }
        match self.deps.store.load(&self.namespace).await {
            Ok(Some(snapshot)) if snapshot.state.identity.as_ref().is_some_and(|i| i.is_present()) => {
                tracing::info!(
                    "[coordinator] adopted snapshot from {} (generation {})",
                    snapshot.saved_at,
                    snapshot.state.generation
                );
                self.state = snapshot.state;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("[coordinator] snapshot unavailable: {}", e);
            }
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.deps.store.save(&self.namespace, &self.state.snapshot()).await {
            tracing::warn!("[coordinator] failed to persist session: {}", e);
        }
    }

    async fn on_identity_detected(&mut self, identity: VideoIdentity) {
        if !identity.is_present() {
            tracing::debug!("[coordinator] ignoring detection without an id");
            return;
        }
        self.ensure_loaded().await;

        match self.state.detect(identity) {
            Detection::Unchanged => {
                let resumable = self.state.phase == SessionPhase::Detected
                    && self.in_flight != Some(self.state.generation);
                if resumable {
                    tracing::info!(
                        "[coordinator] resuming extraction for generation {}",
                        self.state.generation
                    );
                    self.start_extraction();
                }
            }
            Detection::New { generation } => {
                let video_id = self.state.current_id().unwrap_or_default().to_string();
                tracing::info!("[coordinator] new item {} (generation {})", video_id, generation);
                self.persist().await;
                self.deps.events.emit(&SessionEvent::Detected {
                    generation,
                    video_id,
                });
                self.start_extraction();
            }
        }
    }

    fn start_extraction(&mut self) {
        let Some(mailbox) = self.mailbox.upgrade() else {
            return;
        };
        let generation = self.state.generation;
        let host = self.deps.host.clone();
        self.in_flight = Some(generation);

        tokio::spawn(async move {
            let result = match tokio::spawn(async move { extractor::run(host.as_ref()).await }).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("[extract] task for generation {} failed: {}", generation, e);
                    ExtractionResult::Failure {
                        error: format!("Extraction task failed: {}", e),
                    }
                }
            };
            let _ = mailbox
                .send(Command::ExtractionFinished { generation, result })
                .await;
        });
    }

    async fn on_extraction_finished(&mut self, generation: u64, result: ExtractionResult) {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }

        let echoed_id = match &result {
            ExtractionResult::Success { identity_echo, .. } => identity_echo.clone(),
            ExtractionResult::Failure { error } => {
                tracing::warn!("[coordinator] extraction failed for generation {}: {}", generation, error);
                String::new()
            }
        };

        match self.state.commit(generation, result) {
            Commit::Applied => {
                tracing::info!(
                    "[coordinator] ready: {} video, {} audio{}",
                    self.state.catalog.video.len(),
                    self.state.catalog.audio.len(),
                    if self.state.stale { " (stale)" } else { "" }
                );
                self.persist().await;
                self.deps.events.emit(&SessionEvent::Ready {
                    generation,
                    video_id: self.state.current_id().unwrap_or_default().to_string(),
                    video_formats: self.state.catalog.video.len(),
                    audio_formats: self.state.catalog.audio.len(),
                    stale: self.state.stale,
                });
            }
            Commit::Discarded { reason } => {
                tracing::debug!(
                    "[coordinator] discarded result for generation {} ({}), current is {}",
                    generation,
                    reason,
                    self.state.generation
                );
                self.deps.events.emit(&SessionEvent::Discarded {
                    generation,
                    echoed_id,
                });
            }
        }
    }

    async fn on_dispatch(
        &mut self,
        kind: FormatKind,
        itag: String,
        reply: oneshot::Sender<Result<DownloadHandle, DispatchError>>,
    ) {
        self.ensure_loaded().await;

        let Some(format) = self.state.catalog.find(kind, &itag) else {
            let _ = reply.send(Err(DispatchError::FormatNotFound { kind, itag }));
            return;
        };
        let Some(url) = format.url.clone() else {
            let _ = reply.send(Err(DispatchError::MissingUrl { kind, itag }));
            return;
        };

        let title = self
            .state
            .identity
            .as_ref()
            .map(|i| i.title.as_str())
            .unwrap_or_default();
        let filename = download_filename(title, format, &self.fallback_title);
        let downloads = self.deps.downloads.clone();

        tracing::info!("[coordinator] dispatching {} {} as {}", kind, itag, filename);
        tokio::spawn(async move {
            let result = downloads
                .submit(&url, &filename)
                .await
                .map_err(|e| DispatchError::Rejected(e.to_string()));
            if let Err(e) = &result {
                tracing::warn!("[coordinator] download service refused {}: {}", filename, e);
            }
            let _ = reply.send(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::broadcast;

    use super::*;
    use crate::core::events::BroadcastEmitter;
    use crate::platforms::traits::PageDocument;
    use crate::storage::snapshot::MemoryStore;

    struct ScriptedHost {
        calls: AtomicUsize,
        script: Mutex<VecDeque<(Option<oneshot::Receiver<()>>, PageDocument)>>,
    }

    impl ScriptedHost {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(VecDeque::new()),
            })
        }

        fn push(&self, page: PageDocument) {
            self.script.lock().unwrap().push_back((None, page));
        }

        fn push_gated(&self, page: PageDocument) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.script.lock().unwrap().push_back((Some(rx), page));
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageHost for ScriptedHost {
        async fn active_page(&self) -> anyhow::Result<PageDocument> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let Some((gate, page)) = next else {
                anyhow::bail!("tab closed");
            };
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(page)
        }
    }

    struct PanickingHost;

    #[async_trait]
    impl PageHost for PanickingHost {
        async fn active_page(&self) -> anyhow::Result<PageDocument> {
            panic!("renderer crashed");
        }
    }

    #[derive(Default)]
    struct RecordingDownloads {
        submitted: Mutex<Vec<(String, String)>>,
        refuse: bool,
    }

    #[async_trait]
    impl DownloadService for RecordingDownloads {
        async fn submit(&self, url: &str, filename: &str) -> anyhow::Result<DownloadHandle> {
            if self.refuse {
                anyhow::bail!("Download blocked by policy");
            }
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push((url.to_string(), filename.to_string()));
            Ok(DownloadHandle(submitted.len() as u64))
        }
    }

    struct Harness {
        handle: CoordinatorHandle,
        events: broadcast::Receiver<SessionEvent>,
    }

    fn start(
        host: Arc<dyn PageHost>,
        store: Arc<MemoryStore>,
        downloads: Arc<RecordingDownloads>,
    ) -> Harness {
        let emitter = BroadcastEmitter::new(32);
        let events = emitter.subscribe();
        let handle = Coordinator::spawn(
            CoordinatorDeps {
                host,
                store,
                downloads,
                events: Arc::new(emitter),
            },
            &AppSettings::default(),
        );
        Harness { handle, events }
    }

    fn identity(id: &str) -> VideoIdentity {
        VideoIdentity {
            id: id.into(),
            title: "Unknown Title".into(),
            author: "Unknown Channel".into(),
            thumbnail_url: String::new(),
            source_url: format!("https://www.youtube.com/watch?v={}", id),
            duration_seconds: None,
        }
    }

    fn page(id: &str, video_itags: &[u32]) -> PageDocument {
        let formats: Vec<_> = video_itags
            .iter()
            .map(|itag| {
                json!({
                    "itag": itag,
                    "qualityLabel": "720p",
                    "mimeType": "video/mp4",
                    "url": format!("https://cdn.example/{}/{}", id, itag)
                })
            })
            .collect();
        PageDocument {
            location: format!("https://www.youtube.com/watch?v={}", id),
            html: String::new(),
            player_config: Some(json!({
                "videoDetails": {"videoId": id, "title": format!("Clip {}", id), "lengthSeconds": "61"},
                "streamingData": {
                    "formats": formats,
                    "adaptiveFormats": [
                        {"itag": 140, "audioQuality": "AUDIO_QUALITY_MEDIUM", "mimeType": "audio/mp4"},
                    ]
                }
            })),
        }
    }

    async fn next_event<F>(events: &mut broadcast::Receiver<SessionEvent>, want: F) -> SessionEvent
    where
        F: Fn(&SessionEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.expect("event stream closed");
                if want(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for session event")
    }

    fn is_ready(event: &SessionEvent) -> bool {
        matches!(event, SessionEvent::Ready { .. })
    }

    async fn wait_for_calls(host: &ScriptedHost, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while host.calls() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("host never called");
    }

    #[tokio::test]
    async fn query_before_detection_has_no_data() {
        let h = start(ScriptedHost::new(), Arc::default(), Arc::default());
        assert_eq!(h.handle.query().await, Err(QueryError::NoData));
    }

    #[tokio::test]
    async fn detection_produces_ready_catalog() {
        let host = ScriptedHost::new();
        host.push(page("aaa", &[22, 18]));
        let store = Arc::new(MemoryStore::new());
        let mut h = start(host.clone(), store.clone(), Arc::default());

        h.handle.identity_detected(identity("aaa")).await;
        next_event(&mut h.events, is_ready).await;

        let view = h.handle.query().await.unwrap();
        assert_eq!(view.phase, SessionPhase::Ready);
        assert!(!view.stale);
        assert_eq!(view.catalog.video.len(), 2);
        assert_eq!(view.catalog.audio.len(), 1);
        assert_eq!(view.identity.title, "Clip aaa");
        assert_eq!(view.identity.duration_seconds, Some(61));
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn blank_identity_is_ignored() {
        let host = ScriptedHost::new();
        let h = start(host.clone(), Arc::default(), Arc::default());
        h.handle.identity_detected(identity("  ")).await;
        assert_eq!(h.handle.query().await, Err(QueryError::NoData));
        assert_eq!(host.calls(), 0);
    }

    #[tokio::test]
    async fn late_result_for_previous_item_is_not_committed() {
        let host = ScriptedHost::new();
        let release_first = host.push_gated(page("aaa", &[22, 18, 137]));
        host.push(page("bbb", &[22]));
        let mut h = start(host.clone(), Arc::default(), Arc::default());

        h.handle.identity_detected(identity("aaa")).await;
        wait_for_calls(&host, 1).await;
        h.handle.identity_detected(identity("bbb")).await;
        next_event(&mut h.events, is_ready).await;

        release_first.send(()).unwrap();
        let discarded = next_event(&mut h.events, |e| matches!(e, SessionEvent::Discarded { .. })).await;
        assert_eq!(
            discarded,
            SessionEvent::Discarded {
                generation: 1,
                echoed_id: "aaa".into()
            }
        );

        let view = h.handle.query().await.unwrap();
        assert_eq!(view.identity.id, "bbb");
        assert_eq!(view.generation, 2);
        assert_eq!(view.catalog.video.len(), 1);
    }

    #[tokio::test]
    async fn same_id_while_extracting_does_not_extract_again() {
        let host = ScriptedHost::new();
        let release = host.push_gated(page("aaa", &[22]));
        let mut h = start(host.clone(), Arc::default(), Arc::default());

        h.handle.identity_detected(identity("aaa")).await;
        wait_for_calls(&host, 1).await;
        h.handle.identity_detected(identity("aaa")).await;
        h.handle.identity_detected(identity("aaa")).await;
        release.send(()).unwrap();
        next_event(&mut h.events, is_ready).await;

        assert_eq!(host.calls(), 1);
        assert_eq!(h.handle.query().await.unwrap().generation, 1);
    }

    #[tokio::test]
    async fn extraction_failure_marks_stale() {
        let host = ScriptedHost::new();
        let mut h = start(host.clone(), Arc::default(), Arc::default());

        h.handle.identity_detected(identity("aaa")).await;
        let ready = next_event(&mut h.events, is_ready).await;
        assert!(matches!(ready, SessionEvent::Ready { stale: true, .. }));

        let view = h.handle.query().await.unwrap();
        assert!(view.stale);
        assert!(view.catalog.is_empty());
        assert_eq!(view.phase, SessionPhase::Ready);
    }

    #[tokio::test]
    async fn panicking_extraction_is_folded_into_failure() {
        let mut h = start(Arc::new(PanickingHost), Arc::default(), Arc::default());
        h.handle.identity_detected(identity("aaa")).await;
        next_event(&mut h.events, is_ready).await;
        assert!(h.handle.query().await.unwrap().stale);
    }

    #[tokio::test]
    async fn restart_adopts_persisted_snapshot() {
        let store = Arc::new(MemoryStore::new());
        {
            let host = ScriptedHost::new();
            host.push(page("aaa", &[22, 18]));
            let mut h = start(host, store.clone(), Arc::default());
            h.handle.identity_detected(identity("aaa")).await;
            next_event(&mut h.events, is_ready).await;
        }

        let host = ScriptedHost::new();
        let h = start(host.clone(), store, Arc::default());
        let view = h.handle.query().await.unwrap();
        assert_eq!(view.identity.id, "aaa");
        assert_eq!(view.catalog.video.len(), 2);

        h.handle.identity_detected(identity("aaa")).await;
        assert_eq!(h.handle.query().await.unwrap().generation, 1);
        assert_eq!(host.calls(), 0);
    }

    #[tokio::test]
    async fn adopted_unfinished_session_resumes_extraction() {
        let store = Arc::new(MemoryStore::new());
        let mut interrupted = SessionState::default();
        interrupted.detect(identity("aaa"));
        store
            .save(&AppSettings::default().storage.namespace, &interrupted.snapshot())
            .await
            .unwrap();

        let host = ScriptedHost::new();
        host.push(page("aaa", &[22]));
        let mut h = start(host.clone(), store, Arc::default());
        h.handle.identity_detected(identity("aaa")).await;
        next_event(&mut h.events, is_ready).await;

        let view = h.handle.query().await.unwrap();
        assert_eq!(view.generation, 1);
        assert_eq!(view.catalog.video.len(), 1);
        assert_eq!(host.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_format_never_reaches_download_service() {
        let host = ScriptedHost::new();
        host.push(page("aaa", &[22]));
        let downloads = Arc::new(RecordingDownloads::default());
        let mut h = start(host, Arc::default(), downloads.clone());
        h.handle.identity_detected(identity("aaa")).await;
        next_event(&mut h.events, is_ready).await;

        assert_eq!(
            h.handle.dispatch("999", FormatKind::Video).await,
            Err(DispatchError::FormatNotFound {
                kind: FormatKind::Video,
                itag: "999".into()
            })
        );
        assert!(matches!(
            h.handle.dispatch("140", FormatKind::Video).await,
            Err(DispatchError::FormatNotFound { .. })
        ));
        assert!(downloads.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn format_without_url_is_reported() {
        let host = ScriptedHost::new();
        host.push(page("aaa", &[22]));
        let downloads = Arc::new(RecordingDownloads::default());
        let mut h = start(host, Arc::default(), downloads.clone());
        h.handle.identity_detected(identity("aaa")).await;
        next_event(&mut h.events, is_ready).await;

        assert!(matches!(
            h.handle.dispatch("140", FormatKind::Audio).await,
            Err(DispatchError::MissingUrl { .. })
        ));
        assert!(downloads.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dispatch_submits_url_with_filename() {
        let host = ScriptedHost::new();
        host.push(page("aaa", &[22]));
        let downloads = Arc::new(RecordingDownloads::default());
        let mut h = start(host, Arc::default(), downloads.clone());
        h.handle.identity_detected(identity("aaa")).await;
        next_event(&mut h.events, is_ready).await;

        let handle = h.handle.dispatch("22", FormatKind::Video).await.unwrap();
        assert_eq!(handle, DownloadHandle(1));
        assert_eq!(
            downloads.submitted.lock().unwrap().as_slice(),
            &[(
                "https://cdn.example/aaa/22".to_string(),
                "Clip_aaa_720p.mp4".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn refused_submission_keeps_host_message() {
        let host = ScriptedHost::new();
        host.push(page("aaa", &[22]));
        let downloads = Arc::new(RecordingDownloads {
            refuse: true,
            ..Default::default()
        });
        let mut h = start(host, Arc::default(), downloads);
        h.handle.identity_detected(identity("aaa")).await;
        next_event(&mut h.events, is_ready).await;

        assert_eq!(
            h.handle.dispatch("22", FormatKind::Video).await,
            Err(DispatchError::Rejected("Download blocked by policy".into()))
        );
    }

    #[tokio::test]
    async fn instructions_need_an_identity() {
        let host = ScriptedHost::new();
        host.push(page("aaa", &[22]));
        let mut h = start(host, Arc::default(), Arc::default());
        assert_eq!(
            h.handle.instructions(FormatKind::Video).await,
            Err(QueryError::NoData)
        );

        h.handle.identity_detected(identity("aaa")).await;
        next_event(&mut h.events, is_ready).await;
        let sheet = h.handle.instructions(FormatKind::Audio).await.unwrap();
        assert_eq!(sheet.filename, "Clip_aaa_audio_download_info.txt");
    }
}
