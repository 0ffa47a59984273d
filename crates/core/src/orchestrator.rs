//! Build-or-load coordination for the vector index.
//!
//! On startup the builder looks at the storage location. When it exists it
//! must hold a persisted index, which is loaded and checked against the
//! configured embedding model; anything else there is reported, never
//! overwritten. Otherwise documents are loaded, cleaned, chunked, embedded and
//! the finished index is persisted before anyone can query it.

use crate::chunking::{chunk_documents, ChunkingConfig};
use crate::cleaning::{document_stats, reduction_percent, NormalizerOptions, TextNormalizer};
use crate::config::Settings;
use crate::embeddings::{Embedder, DEFAULT_BATCH_SIZE};
use crate::error::{ConfigError, IndexError, PipelineError};
use crate::events::{BuildEvent, BuildObserver, TracingObserver};
use crate::index::VectorIndex;
use crate::loader::{load_documents, LoadOptions};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub documents_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub load: LoadOptions,
    pub clean_text: bool,
    pub normalizer: NormalizerOptions,
    pub chunking: ChunkingConfig,
    pub embed_batch_size: usize,
    pub rebuild_on_model_mismatch: bool,
}

impl BuildOptions {
    pub fn new(documents_dir: impl Into<PathBuf>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            documents_dir: documents_dir.into(),
            storage_dir: storage_dir.into(),
            load: LoadOptions::default(),
            clean_text: true,
            normalizer: NormalizerOptions::default(),
            chunking: ChunkingConfig::default(),
            embed_batch_size: DEFAULT_BATCH_SIZE,
            rebuild_on_model_mismatch: false,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            documents_dir: settings.documents_dir.clone(),
            storage_dir: settings.storage_dir.clone(),
            load: LoadOptions {
                recursive: settings.recursive_load,
            },
            clean_text: settings.clean_text,
            normalizer: settings.normalizer,
            chunking: settings.chunking,
            embed_batch_size: settings.embedding.batch_size(),
            rebuild_on_model_mismatch: settings.rebuild_on_model_mismatch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    NoIndexPresent,
    IndexPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Built,
    Loaded,
}

/// A finished index, ready to hand to a query engine.
#[derive(Debug, Clone)]
pub struct ReadyIndex {
    pub index: Arc<VectorIndex>,
    pub origin: IndexOrigin,
}

pub struct IndexBuilder {
    options: BuildOptions,
    embedder: Arc<dyn Embedder>,
    observer: Arc<dyn BuildObserver>,
}

impl IndexBuilder {
    pub fn new(options: BuildOptions, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            options,
            embedder,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BuildObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Presence of the storage location alone decides between load and build.
    pub fn state(&self) -> IndexState {
        if self.options.storage_dir.exists() {
            IndexState::IndexPresent
        } else {
            IndexState::NoIndexPresent
        }
    }

    /// Loads the persisted index, or builds and persists one when none exists.
    pub async fn build_or_load(&self) -> Result<ReadyIndex, PipelineError> {
        self.check_locations()?;
        let location = self.options.storage_dir.clone();
        match self.state() {
            IndexState::IndexPresent => {
                self.observer.on_event(&BuildEvent::IndexPresent { location });
                self.load_or_rebuild().await
            }
            IndexState::NoIndexPresent => {
                self.observer
                    .on_event(&BuildEvent::NoIndexPresent { location });
                Ok(ReadyIndex {
                    index: self.build().await?,
                    origin: IndexOrigin::Built,
                })
            }
        }
    }

    async fn load_or_rebuild(&self) -> Result<ReadyIndex, PipelineError> {
        match self.load().await {
            Ok(index) => Ok(ReadyIndex {
                index,
                origin: IndexOrigin::Loaded,
            }),
            Err(PipelineError::Config(ConfigError::ModelMismatch { stored, configured }))
                if self.options.rebuild_on_model_mismatch =>
            {
                warn!(stored = %stored, configured = %configured, "rebuilding index for new embedding model");
                self.observer
                    .on_event(&BuildEvent::RebuildingAfterMismatch { stored, configured });
                Ok(ReadyIndex {
                    index: self.build().await?,
                    origin: IndexOrigin::Built,
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Reads the persisted index, rejecting one built by another embedding model.
    pub async fn load(&self) -> Result<Arc<VectorIndex>, PipelineError> {
        let storage = self.options.storage_dir.clone();
        let configured = self.embedder.model_identity();
        let expected = configured.clone();

        let loaded =
            tokio::task::spawn_blocking(move || VectorIndex::load(&storage, Some(expected.as_str())))
                .await?;

        let index = match loaded {
            Ok(index) => index,
            Err(IndexError::ModelMismatch { stored, .. }) => {
                return Err(ConfigError::ModelMismatch { stored, configured }.into())
            }
            Err(error) => return Err(error.into()),
        };

        self.observer.on_event(&BuildEvent::IndexLoaded {
            location: self.options.storage_dir.clone(),
            entries: index.len(),
        });
        Ok(Arc::new(index))
    }

    /// Runs the full pipeline and persists the result. Nothing is written
    /// unless every step succeeds.
    pub async fn build(&self) -> Result<Arc<VectorIndex>, PipelineError> {
        self.check_locations()?;
        let options = &self.options;

        self.observer.on_event(&BuildEvent::LoadStarted {
            path: options.documents_dir.clone(),
        });
        let documents_dir = options.documents_dir.clone();
        let load = options.load;
        let report =
            tokio::task::spawn_blocking(move || load_documents(&documents_dir, load)).await??;

        for skipped in &report.skipped {
            self.observer.on_event(&BuildEvent::DocumentSkipped {
                path: skipped.path.clone(),
                reason: skipped.reason.clone(),
            });
        }
        self.observer.on_event(&BuildEvent::DocumentsLoaded {
            count: report.documents.len(),
            skipped: report.skipped.len(),
        });

        let documents = if options.clean_text {
            let normalizer = TextNormalizer::new(options.normalizer)?;
            let cleaned = normalizer.normalize_all(&report.documents);
            let before = document_stats(&report.documents);
            let after = document_stats(&cleaned);
            self.observer.on_event(&BuildEvent::Cleaned {
                character_reduction: reduction_percent(
                    before.total_characters,
                    after.total_characters,
                ),
                word_reduction: reduction_percent(before.total_words, after.total_words),
                before,
                after,
            });
            cleaned
        } else {
            report.documents
        };

        let chunks = chunk_documents(&documents, &options.chunking);
        self.observer.on_event(&BuildEvent::Chunked {
            documents: documents.len(),
            chunks: chunks.len(),
        });

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(options.embed_batch_size.max(1)) {
            vectors.extend(self.embedder.embed_batch(batch).await?);
            self.observer.on_event(&BuildEvent::EmbeddingProgress {
                embedded: vectors.len(),
                total: texts.len(),
            });
        }

        let index = Arc::new(VectorIndex::from_chunks(
            self.embedder.model_identity(),
            chunks,
            vectors,
        )?);

        let storage = options.storage_dir.clone();
        let to_persist = Arc::clone(&index);
        tokio::task::spawn_blocking(move || to_persist.persist(&storage)).await??;

        info!(entries = index.len(), model = %index.model_identity(), "index built");
        self.observer.on_event(&BuildEvent::IndexPersisted {
            location: options.storage_dir.clone(),
            entries: index.len(),
        });
        Ok(index)
    }

    /// Replacing the storage location must never touch the documents folder.
    fn check_locations(&self) -> Result<(), IndexError> {
        let storage = resolve(&self.options.storage_dir);
        let documents = resolve(&self.options.documents_dir);
        if documents.starts_with(&storage) {
            return Err(IndexError::StorageOverlapsDocuments {
                storage: self.options.storage_dir.clone(),
                documents: self.options.documents_dir.clone(),
            });
        }
        Ok(())
    }
}

fn resolve(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
