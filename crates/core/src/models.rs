use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Display length used for citation excerpts.
pub const DEFAULT_EXCERPT_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Text,
    Markdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub source_path: String,
    pub file_name: String,
    pub file_type: FileType,
    #[serde(default)]
    pub page_count: Option<u32>,
    pub checksum: String,
    #[serde(default)]
    pub cleaned: bool,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// One loaded source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.metadata.file_name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: DocumentMetadata,
    /// Position of the chunk within its document.
    pub chunk_index: u64,
    /// Offset of the first character, counted in chars.
    pub start_offset: usize,
}

impl Chunk {
    pub fn source_name(&self) -> &str {
        &self.metadata.file_name
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub id: u64,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub entry_id: u64,
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked passages for one query, highest score first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredChunk> {
        self.hits.iter()
    }

    pub fn citations(&self, excerpt_chars: usize) -> Vec<Citation> {
        self.hits
            .iter()
            .enumerate()
            .map(|(position, hit)| Citation {
                rank: position + 1,
                score: hit.score,
                source_excerpt: excerpt(&hit.chunk.text, excerpt_chars),
                source_name: hit.chunk.metadata.file_name.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub rank: usize,
    pub score: f32,
    pub source_excerpt: String,
    pub source_name: String,
}

/// Truncates `text` to `max_chars` characters, appending "..." when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn test_metadata(file_name: &str) -> DocumentMetadata {
    DocumentMetadata {
        source_path: format!("/corpus/{file_name}"),
        file_name: file_name.to_string(),
        file_type: FileType::Text,
        page_count: None,
        checksum: "checksum".to_string(),
        cleaned: false,
        extra: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_keeps_short_text() {
        assert_eq!(excerpt("insuline", 300), "insuline");
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("glycémie élevée", 4), "glyc...");
        assert_eq!(excerpt("éééé", 4), "éééé");
    }

    #[test]
    fn citations_are_ranked_from_one() {
        let chunk = Chunk {
            text: "a".repeat(400),
            metadata: test_metadata("guide.pdf"),
            chunk_index: 0,
            start_offset: 0,
        };
        let result = RetrievalResult {
            hits: vec![
                ScoredChunk {
                    entry_id: 7,
                    chunk: chunk.clone(),
                    score: 0.9,
                },
                ScoredChunk {
                    entry_id: 3,
                    chunk,
                    score: 0.5,
                },
            ],
        };

        let citations = result.citations(DEFAULT_EXCERPT_CHARS);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].rank, 1);
        assert_eq!(citations[1].rank, 2);
        assert_eq!(citations[0].source_name, "guide.pdf");
        assert_eq!(citations[0].source_excerpt.chars().count(), 303);
        assert!(citations[0].source_excerpt.ends_with("..."));
    }
}
