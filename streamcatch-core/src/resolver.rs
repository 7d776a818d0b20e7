//! Turns raw stream descriptors into a labeled, categorized catalog.
//!
//! Pure and total: unclassifiable entries and entries without an itag are
//! dropped, duplicate itags keep their first occurrence, and input order is
//! preserved within each kind.

use std::collections::HashSet;

use crate::models::descriptor::RawDescriptor;
use crate::models::media::{FormatCatalog, FormatKind, ResolvedFormat};

const AUDIO_QUALITY_PREFIX: &str = "AUDIO_QUALITY_";

pub fn resolve(descriptors: &[RawDescriptor]) -> FormatCatalog {
    let mut catalog = FormatCatalog::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for d in descriptors {
        let Some(kind) = classify(d) else {
            continue;
        };
        let Some(itag) = d.itag.as_deref() else {
            continue;
        };
        if !seen.insert(itag) {
            continue;
        }

        let format = project(d, itag, kind);
        match kind {
            FormatKind::Video => catalog.video.push(format),
            FormatKind::Audio => catalog.audio.push(format),
        }
    }

    catalog
}

pub fn classify(d: &RawDescriptor) -> Option<FormatKind> {
    if d.has_dimension() {
        Some(FormatKind::Video)
    } else if d.audio_quality.is_some() {
        Some(FormatKind::Audio)
    } else {
        None
    }
}

pub fn label_for(d: &RawDescriptor) -> String {
    if let Some(label) = &d.quality_label {
        return label.clone();
    }
    if let Some(height) = d.height {
        return format!("{}p", height);
    }
    if let Some(aq) = &d.audio_quality {
        return aq
            .strip_prefix(AUDIO_QUALITY_PREFIX)
            .unwrap_or(aq)
            .to_lowercase();
    }
    d.quality.clone().unwrap_or_else(|| "unknown".to_string())
}

fn project(d: &RawDescriptor, itag: &str, kind: FormatKind) -> ResolvedFormat {
    let (fps, bitrate) = match kind {
        FormatKind::Video => (d.fps, None),
        FormatKind::Audio => (None, d.average_bitrate.or(d.bitrate)),
    };

    ResolvedFormat {
        itag: itag.to_string(),
        kind,
        label: label_for(d),
        container: d.mime_type.clone().unwrap_or_default(),
        url: d.url.clone(),
        size: d.content_length,
        fps,
        bitrate,
    }
}
