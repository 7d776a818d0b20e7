use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::descriptor::ExtractionResult;
use crate::models::media::{FormatCatalog, VideoIdentity};
use crate::resolver;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Detected,
    Ready,
}

/// Session state. Only the coordinator task holds one mutably.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub identity: Option<VideoIdentity>,
    #[serde(default)]
    pub catalog: FormatCatalog,
    pub generation: u64,
    #[serde(default)]
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub state: SessionState,
    pub saved_at: DateTime<Utc>,
}

/// Read-only copy of a non-idle session, as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub phase: SessionPhase,
    pub identity: VideoIdentity,
    pub catalog: FormatCatalog,
    pub stale: bool,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Unchanged,
    New { generation: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    Applied,
    Discarded { reason: &'static str },
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        self.identity.is_none()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.id.as_str())
    }

    /// Retires the current item when `identity` names a different one.
    pub fn detect(&mut self, identity: VideoIdentity) -> Detection {
        if self.phase != SessionPhase::Idle && self.current_id() == Some(identity.id.as_str()) {
            return Detection::Unchanged;
        }

        self.generation += 1;
        self.identity = Some(identity);
        self.catalog = FormatCatalog::default();
        self.stale = false;
        self.phase = SessionPhase::Detected;
        Detection::New {
            generation: self.generation,
        }
    }

    /// Applies an extraction result started under `generation`. The staleness
    /// check and the write happen here together.
    pub fn commit(&mut self, generation: u64, result: ExtractionResult) -> Commit {
        if generation != self.generation {
            return Commit::Discarded {
                reason: "superseded generation",
            };
        }
        let Some(identity) = self.identity.as_mut() else {
            return Commit::Discarded {
                reason: "no identity",
            };
        };

        match result {
            ExtractionResult::Success {
                raw_descriptors,
                identity_echo,
                details,
            } => {
                if identity.id != identity_echo {
                    return Commit::Discarded {
                        reason: "echoed identity mismatch",
                    };
                }
                identity.enrich(&details);
                self.catalog = resolver::resolve(&raw_descriptors);
                self.stale = false;
            }
            ExtractionResult::Failure { .. } => {
                self.stale = true;
            }
        }

        self.phase = SessionPhase::Ready;
        Commit::Applied
    }

    pub fn view(&self) -> Option<SessionView> {
        let identity = self.identity.clone()?;
        Some(SessionView {
            phase: self.phase,
            identity,
            catalog: self.catalog.clone(),
            stale: self.stale,
            generation: self.generation,
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.clone(),
            saved_at: Utc::now(),
        }
    }
}
