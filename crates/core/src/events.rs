use crate::cleaning::DocumentStats;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

/// Progress reported by the index builder.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    IndexPresent {
        location: PathBuf,
    },
    NoIndexPresent {
        location: PathBuf,
    },
    LoadStarted {
        path: PathBuf,
    },
    DocumentSkipped {
        path: PathBuf,
        reason: String,
    },
    DocumentsLoaded {
        count: usize,
        skipped: usize,
    },
    Cleaned {
        before: DocumentStats,
        after: DocumentStats,
        character_reduction: f64,
        word_reduction: f64,
    },
    Chunked {
        documents: usize,
        chunks: usize,
    },
    EmbeddingProgress {
        embedded: usize,
        total: usize,
    },
    IndexPersisted {
        location: PathBuf,
        entries: usize,
    },
    IndexLoaded {
        location: PathBuf,
        entries: usize,
    },
    RebuildingAfterMismatch {
        stored: String,
        configured: String,
    },
}

pub trait BuildObserver: Send + Sync {
    fn on_event(&self, event: &BuildEvent);
}

/// Forwards build events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl BuildObserver for TracingObserver {
    fn on_event(&self, event: &BuildEvent) {
        match event {
            BuildEvent::IndexPresent { location } => {
                info!(location = %location.display(), "persisted index found")
            }
            BuildEvent::NoIndexPresent { location } => {
                info!(location = %location.display(), "no persisted index, building")
            }
            BuildEvent::LoadStarted { path } => {
                info!(path = %path.display(), "loading documents")
            }
            BuildEvent::DocumentSkipped { path, reason } => {
                debug!(path = %path.display(), reason = %reason, "skipped document")
            }
            BuildEvent::DocumentsLoaded { count, skipped } => {
                info!(count, skipped, "documents loaded")
            }
            BuildEvent::Cleaned {
                before,
                after,
                character_reduction,
                word_reduction,
            } => info!(
                characters_before = before.total_characters,
                characters_after = after.total_characters,
                character_reduction = format!("{character_reduction:.1}%"),
                word_reduction = format!("{word_reduction:.1}%"),
                "documents cleaned"
            ),
            BuildEvent::Chunked { documents, chunks } => {
                info!(documents, chunks, "documents chunked")
            }
            BuildEvent::EmbeddingProgress { embedded, total } => {
                debug!(embedded, total, "embedding chunks")
            }
            BuildEvent::IndexPersisted { location, entries } => {
                info!(location = %location.display(), entries, "index persisted")
            }
            BuildEvent::IndexLoaded { location, entries } => {
                info!(location = %location.display(), entries, "index loaded")
            }
            BuildEvent::RebuildingAfterMismatch { stored, configured } => debug!(
                stored = %stored,
                configured = %configured,
                "embedding model changed, rebuilding index"
            ),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<BuildEvent>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<BuildEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl BuildObserver for EventLog {
    fn on_event(&self, event: &BuildEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
