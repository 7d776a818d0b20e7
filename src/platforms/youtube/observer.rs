//! Detects which video the page shows and reports it to the coordinator.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{extract_video_id, fallback_thumbnail};
use crate::core::coordinator::CoordinatorHandle;
use crate::models::media::{VideoIdentity, UNKNOWN_AUTHOR, UNKNOWN_TITLE};
use crate::platforms::traits::{PageDocument, PageHost};

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static ISO_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").unwrap()
});

const SITE_SUFFIX: &str = " - YouTube";

enum Source {
    Text(&'static str),
    Attr(&'static str, &'static str),
}

const TITLE_SOURCES: &[Source] = &[
    Source::Text("h1.title"),
    Source::Text("h1[class*=\"title\"]"),
    Source::Attr("meta[property=\"og:title\"]", "content"),
    Source::Attr("meta[name=\"title\"]", "content"),
    Source::Text("title"),
];

const AUTHOR_SOURCES: &[Source] = &[
    Source::Attr("[itemprop=\"author\"] [itemprop=\"name\"]", "content"),
    Source::Text("[itemprop=\"author\"] [itemprop=\"name\"]"),
    Source::Text("#owner-name a"),
    Source::Text("#channel-name a"),
    Source::Attr("link[itemprop=\"name\"]", "content"),
];

const THUMBNAIL_SOURCES: &[Source] = &[
    Source::Attr("meta[property=\"og:image\"]", "content"),
    Source::Attr("link[itemprop=\"thumbnailUrl\"]", "href"),
];

const DURATION_SOURCES: &[Source] = &[Source::Attr("meta[itemprop=\"duration\"]", "content")];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    /// The document was (re)loaded from scratch.
    FullLoad { location: String },
    /// The page changed its location in place.
    RouteChange { location: String },
}

/// Derives the identity of the video on `page`. `None` when the page is not
/// a video page; that is not an error.
pub fn detect(page: &PageDocument) -> Option<VideoIdentity> {
    let id = extract_video_id(&page.location)?;
    let doc = Html::parse_document(&page.html);

    let title = first_value(&doc, TITLE_SOURCES)
        .map(|t| t.trim_end_matches(SITE_SUFFIX).trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    let author = first_value(&doc, AUTHOR_SOURCES).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
    let thumbnail_url =
        first_value(&doc, THUMBNAIL_SOURCES).unwrap_or_else(|| fallback_thumbnail(&id));
    let duration_seconds = first_value(&doc, DURATION_SOURCES).and_then(|d| parse_iso_duration(&d));

    Some(VideoIdentity {
        id,
        title,
        author,
        thumbnail_url,
        source_url: page.location.clone(),
        duration_seconds,
    })
}

fn first_value(doc: &Html, sources: &[Source]) -> Option<String> {
    sources.iter().find_map(|source| read_source(doc, source))
}

fn read_source(doc: &Html, source: &Source) -> Option<String> {
    let (css, attr) = match source {
        Source::Text(css) => (*css, None),
        Source::Attr(css, attr) => (*css, Some(*attr)),
    };
    let sel = Selector::parse(css).ok()?;

    doc.select(&sel).find_map(|el| {
        let raw = match attr {
            Some(name) => el.value().attr(name)?.to_string(),
            None => el.text().collect::<String>(),
        };
        let value = WS_RE.replace_all(raw.trim(), " ").to_string();
        (!value.is_empty()).then_some(value)
    })
}

/// `PT1H2M3S` style durations, in seconds.
/// `None` when a component does not fit in the total.
pub fn parse_iso_duration(value: &str) -> Option<u64> {
    let caps = ISO_DURATION_RE.captures(value.trim())?;
    if (1..=4).all(|i| caps.get(i).is_none()) {
        return None;
    }
    [(1, 86_400u64), (2, 3_600), (3, 60), (4, 1)]
        .into_iter()
        .try_fold(0u64, |total, (i, unit)| {
            let count = match caps.get(i) {
                Some(m) => m.as_str().parse::<u64>().ok()?,
                None => 0,
            };
            count.checked_mul(unit)?.checked_add(total)
        })
}

pub struct PageObserver {
    host: Arc<dyn PageHost>,
    coordinator: CoordinatorHandle,
    settle_delay: Duration,
}

impl PageObserver {
    pub fn new(host: Arc<dyn PageHost>, coordinator: CoordinatorHandle, settle_delay: Duration) -> Self {
        Self {
            host,
            coordinator,
            settle_delay,
        }
    }

    /// Reads the page once and reports what it shows, if anything.
    pub async fn observe_now(&self) -> Option<VideoIdentity> {
        let page = match self.host.active_page().await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("[observer] could not read page: {}", e);
                return None;
            }
        };

        let Some(identity) = detect(&page) else {
            tracing::debug!("[observer] no video on {}", page.location);
            return None;
        };

        tracing::info!("[observer] detected {} ({})", identity.id, identity.title);
        self.coordinator.identity_detected(identity.clone()).await;
        Some(identity)
    }

    /// Follows navigation until `cancel` fires or the signal closes.
    ///
    /// A full load is observed right away. A route change to a new location
    /// is observed once the settle delay has passed without further
    /// navigation; a full load in the meantime supersedes it.
    pub async fn watch(self, mut navigation: mpsc::Receiver<NavigationEvent>, cancel: CancellationToken) {
        let mut last_location: Option<String> = None;
        let mut settle_deadline: Option<Instant> = None;

        loop {
            let deadline = settle_deadline;
            let settled = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                event = navigation.recv() => match event {
                    None => break,
                    Some(NavigationEvent::FullLoad { location }) => {
                        settle_deadline = None;
                        last_location = Some(location);
                        self.observe_now().await;
                    }
                    Some(NavigationEvent::RouteChange { location }) => {
                        if last_location.as_deref() == Some(location.as_str()) {
                            continue;
                        }
                        tracing::debug!("[observer] route change to {}", location);
                        last_location = Some(location);
                        settle_deadline = Some(Instant::now() + self.settle_delay);
                    }
                },
                _ = settled => {
                    settle_deadline = None;
                    self.observe_now().await;
                }
            }
        }

        tracing::debug!("[observer] stopped");
    }
}
