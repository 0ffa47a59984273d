//! Brute-force cosine similarity index with on-disk persistence.
//!
//! A persisted index is a directory holding `manifest.json` (format version,
//! embedding model identity, dimensions, entry count) and `entries.json`
//! (chunks with their vectors). It is written to a sibling staging directory
//! first and renamed into place once complete, so a crash mid-write never
//! leaves a loadable partial index behind.

use crate::error::IndexError;
use crate::models::{Chunk, IndexEntry, RetrievalResult, ScoredChunk};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const INDEX_FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
pub const ENTRIES_FILE: &str = "entries.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub format_version: u32,
    #[serde(default)]
    pub model_identity: String,
    pub dimensions: usize,
    pub entry_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    model_identity: String,
    dimensions: usize,
    entries: Vec<IndexEntry>,
    norms: Vec<f32>,
}

impl VectorIndex {
    pub fn empty(model_identity: impl Into<String>) -> Self {
        Self {
            model_identity: model_identity.into(),
            dimensions: 0,
            entries: Vec::new(),
            norms: Vec::new(),
        }
    }

    /// Builds an index in one pass; ids follow insertion order starting at 0.
    pub fn build<I>(model_identity: impl Into<String>, items: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = (Chunk, Vec<f32>)>,
    {
        let entries = items
            .into_iter()
            .enumerate()
            .map(|(position, (chunk, vector))| IndexEntry {
                id: position as u64,
                chunk,
                vector,
            })
            .collect::<Vec<_>>();

        Self::from_entries(model_identity.into(), entries)
    }

    /// Pairs chunks with the vectors computed for them, in order.
    pub fn from_chunks(
        model_identity: impl Into<String>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        Self::build(model_identity, chunks.into_iter().zip(vectors))
    }

    fn from_entries(model_identity: String, entries: Vec<IndexEntry>) -> Result<Self, IndexError> {
        let dimensions = entries.first().map_or(0, |entry| entry.vector.len());

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if entry.vector.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    found: entry.vector.len(),
                });
            }
            if entry.vector.iter().any(|value| !value.is_finite()) {
                return Err(IndexError::Inconsistent(format!(
                    "entry {} has a non-finite vector component",
                    entry.id
                )));
            }
            if !seen.insert(entry.id) {
                return Err(IndexError::Inconsistent(format!(
                    "duplicate entry id {}",
                    entry.id
                )));
            }
        }

        let norms = entries.iter().map(|entry| norm(&entry.vector)).collect();

        Ok(Self {
            model_identity,
            dimensions,
            entries,
            norms,
        })
    }

    pub fn model_identity(&self) -> &str {
        &self.model_identity
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// The `top_k` most similar entries, best first; equal scores keep insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<RetrievalResult, IndexError> {
        if self.entries.is_empty() || top_k == 0 {
            return Ok(RetrievalResult::default());
        }

        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                found: query.len(),
            });
        }

        let query_norm = norm(query);
        let mut scored = self
            .entries
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(position, (entry, entry_norm))| {
                (position, cosine(query, query_norm, &entry.vector, *entry_norm))
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored.truncate(top_k);

        Ok(RetrievalResult {
            hits: scored
                .into_iter()
                .map(|(position, score)| {
                    let entry = &self.entries[position];
                    ScoredChunk {
                        entry_id: entry.id,
                        chunk: entry.chunk.clone(),
                        score,
                    }
                })
                .collect(),
        })
    }

    pub fn manifest(&self) -> IndexManifest {
        IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            model_identity: self.model_identity.clone(),
            dimensions: self.dimensions,
            entry_count: self.entries.len(),
            created_at: Utc::now(),
        }
    }

    /// Writes the index to `target`, replacing any index already there.
    ///
    /// An existing `target` that is not a persisted index is left untouched
    /// and reported as [`IndexError::NotAnIndex`].
    pub fn persist(&self, target: &Path) -> Result<(), IndexError> {
        let (parent, name) = split_location(target)?;
        if target.exists() && !holds_index(target) {
            return Err(IndexError::NotAnIndex {
                path: target.to_path_buf(),
            });
        }
        fs::create_dir_all(&parent).map_err(|source| IndexError::io(&parent, source))?;

        let staging = parent.join(format!(".{name}.staging-{}", Uuid::new_v4()));
        if let Err(error) = self.write_files(&staging) {
            discard(&staging);
            return Err(error);
        }

        if target.exists() {
            let previous = parent.join(format!(".{name}.previous-{}", Uuid::new_v4()));
            fs::rename(target, &previous).map_err(|source| {
                discard(&staging);
                IndexError::io(target, source)
            })?;
            if let Err(source) = fs::rename(&staging, target) {
                // Put the old index back so the location stays loadable.
                if let Err(restore) = fs::rename(&previous, target) {
                    warn!(path = %previous.display(), error = %restore, "failed to restore previous index");
                }
                discard(&staging);
                return Err(IndexError::io(target, source));
            }
            discard(&previous);
        } else {
            fs::rename(&staging, target).map_err(|source| {
                discard(&staging);
                IndexError::io(target, source)
            })?;
        }
        sync_dir(&parent)?;

        info!(
            location = %target.display(),
            entries = self.entries.len(),
            model = %self.model_identity,
            "persisted vector index"
        );
        Ok(())
    }

    fn write_files(&self, directory: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(directory).map_err(|source| IndexError::io(directory, source))?;
        write_json(&directory.join(ENTRIES_FILE), &self.entries)?;
        // Manifest last: a directory without one is never treated as complete.
        write_json(&directory.join(MANIFEST_FILE), &self.manifest())?;
        sync_dir(directory)
    }

    /// Reads a persisted index. When `expected_identity` is given the stored
    /// model identity must match it exactly.
    pub fn load(source: &Path, expected_identity: Option<&str>) -> Result<Self, IndexError> {
        if source.exists() && !holds_index(source) {
            return Err(IndexError::NotAnIndex {
                path: source.to_path_buf(),
            });
        }
        let manifest: IndexManifest = read_json(&source.join(MANIFEST_FILE))?;

        if manifest.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found: manifest.format_version,
                supported: INDEX_FORMAT_VERSION,
            });
        }

        if manifest.model_identity.trim().is_empty() {
            return Err(IndexError::MissingModelIdentity {
                path: source.to_path_buf(),
            });
        }

        if let Some(expected) = expected_identity {
            if manifest.model_identity != expected {
                return Err(IndexError::ModelMismatch {
                    stored: manifest.model_identity,
                    expected: expected.to_string(),
                });
            }
        }

        let entries: Vec<IndexEntry> = read_json(&source.join(ENTRIES_FILE))?;
        if entries.len() != manifest.entry_count {
            return Err(IndexError::Inconsistent(format!(
                "manifest lists {} entries but {} were stored",
                manifest.entry_count,
                entries.len()
            )));
        }

        let index = Self::from_entries(manifest.model_identity, entries)?;
        if !index.is_empty() && index.dimensions != manifest.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: manifest.dimensions,
                found: index.dimensions,
            });
        }

        debug!(location = %source.display(), entries = index.len(), "loaded vector index");
        Ok(index)
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, vector: &[f32], vector_norm: f32) -> f32 {
    if query_norm == 0.0 || vector_norm == 0.0 {
        return 0.0;
    }
    let dot = query
        .iter()
        .zip(vector)
        .map(|(left, right)| left * right)
        .sum::<f32>();
    let score = dot / (query_norm * vector_norm);
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

fn split_location(target: &Path) -> Result<(PathBuf, String), IndexError> {
    let name = target
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IndexError::Inconsistent(format!(
                "storage location has no directory name: {}",
                target.display()
            ))
        })?;
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name.to_string()))
}

/// Whether `location` looks like a directory written by [`VectorIndex::persist`].
pub fn holds_index(location: &Path) -> bool {
    location.join(MANIFEST_FILE).is_file()
}

/// Flushes directory entries so completed renames survive a crash.
#[cfg(unix)]
fn sync_dir(directory: &Path) -> Result<(), IndexError> {
    File::open(directory)
        .and_then(|handle| handle.sync_all())
        .map_err(|source| IndexError::io(directory, source))
}

#[cfg(not(unix))]
fn sync_dir(_directory: &Path) -> Result<(), IndexError> {
    Ok(())
}

fn discard(path: &Path) {
    if path.exists() {
        if let Err(error) = fs::remove_dir_all(path) {
            warn!(path = %path.display(), error = %error, "failed to remove temporary index directory");
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    let file = File::create(path).map_err(|source| IndexError::io(path, source))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|source| IndexError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| IndexError::io(path, source))?;
    let file = writer
        .into_inner()
        .map_err(|error| IndexError::io(path, error.into_error()))?;
    file.sync_all().map_err(|source| IndexError::io(path, source))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    let file = File::open(path).map_err(|source| IndexError::io(path, source))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| IndexError::Format {
        path: path.to_path_buf(),
        source,
    })
}
