//! Overlapping fixed-size chunking.
//!
//! Sizes and offsets are counted in chars. Every chunk after the first starts
//! exactly `chunk_overlap` chars before the end of the previous one, and the
//! last chunk ends at the end of the document.
//!
//! With [`BoundaryPolicy::Characters`] each chunk is a full `chunk_size`
//! window (except the last), so a document of `L > chunk_size` chars yields
//! `ceil((L - overlap) / (chunk_size - overlap))` chunks. With
//! [`BoundaryPolicy::Sentence`] the cut is moved back, within the second half
//! of the window, to the last paragraph break, then sentence end, then line
//! break, then space; when none exists the window is cut hard.

use crate::error::ConfigError;
use crate::models::{Chunk, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    Characters,
    #[default]
    Sentence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    chunk_overlap: usize,
    boundary: BoundaryPolicy,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidChunking {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            boundary: BoundaryPolicy::default(),
        })
    }

    pub fn with_boundary(mut self, boundary: BoundaryPolicy) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn boundary(&self) -> BoundaryPolicy {
        self.boundary
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            boundary: BoundaryPolicy::default(),
        }
    }
}

/// Number of chunks the `Characters` policy produces for `len` chars.
pub fn expected_chunk_count(len: usize, chunk_size: usize, chunk_overlap: usize) -> usize {
    if len == 0 {
        0
    } else if len <= chunk_size {
        1
    } else {
        let stride = chunk_size - chunk_overlap;
        1 + (len - chunk_size).div_ceil(stride)
    }
}

pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|document| chunk_document(document, config))
        .collect()
}

pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    split_text(&document.text, config)
        .into_iter()
        .enumerate()
        .map(|(index, (start_offset, text))| Chunk {
            text,
            metadata: document.metadata.clone(),
            chunk_index: index as u64,
            start_offset,
        })
        .collect()
}

/// Splits `text` into `(start_offset, chunk_text)` pairs.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut pieces = Vec::new();
    if len == 0 {
        return pieces;
    }

    let mut start = 0;
    loop {
        let window_end = (start + config.chunk_size).min(len);
        let end = if window_end == len {
            len
        } else {
            match config.boundary {
                BoundaryPolicy::Characters => window_end,
                BoundaryPolicy::Sentence => {
                    preferred_cut(&chars, start, window_end, config).unwrap_or(window_end)
                }
            }
        };

        pieces.push((start, chars[start..end].iter().collect()));

        if end == len {
            break;
        }
        start = end - config.chunk_overlap;
    }

    pieces
}

fn preferred_cut(
    chars: &[char],
    start: usize,
    window_end: usize,
    config: &ChunkingConfig,
) -> Option<usize> {
    // Cuts must leave room for the overlap so the next window moves forward.
    let lower = start + (config.chunk_overlap + 1).max(config.chunk_size / 2);
    if lower > window_end {
        return None;
    }

    let paragraph = |cut: usize| cut >= 2 && chars[cut - 1] == '\n' && chars[cut - 2] == '\n';
    let sentence = |cut: usize| {
        cut >= 2 && chars[cut - 1].is_whitespace() && matches!(chars[cut - 2], '.' | '!' | '?')
    };
    let line = |cut: usize| chars[cut - 1] == '\n';
    let word = |cut: usize| chars[cut - 1].is_whitespace();

    let rules: [&dyn Fn(usize) -> bool; 4] = [&paragraph, &sentence, &line, &word];
    rules
        .iter()
        .find_map(|rule| (lower..=window_end).rev().find(|cut| rule(*cut)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_metadata;
    use proptest::prelude::*;

    fn document(text: &str) -> Document {
        Document::new(text, test_metadata("guide-diabete.pdf"))
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(matches!(
            ChunkingConfig::new(100, 100),
            Err(ConfigError::InvalidChunking { size: 100, overlap: 100 })
        ));
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(ChunkingConfig::new(800, 100).is_ok());
    }

    #[test]
    fn short_document_is_a_single_chunk() -> Result<(), ConfigError> {
        let text = "g".repeat(650);
        let config = ChunkingConfig::new(800, 100)?;

        let chunks = chunk_document(&document(&text), &config);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].start_offset, 0);
        Ok(())
    }

    #[test]
    fn long_document_is_cut_with_exact_overlap() -> Result<(), ConfigError> {
        let text = (0..1700)
            .map(|index| char::from(b'a' + (index % 26) as u8))
            .collect::<String>();
        let config = ChunkingConfig::new(800, 100)?;

        let chunks = chunk_document(&document(&text), &config);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].char_len(), 800);
        assert_eq!(chunks[1].char_len(), 800);
        assert_eq!(chunks[2].char_len(), 300);
        assert_eq!(chunks[1].start_offset, 700);
        assert_eq!(chunks[2].start_offset, 1400);
        assert_eq!(&chunks[0].text[700..], &chunks[1].text[..100]);
        assert_eq!(&chunks[1].text[700..], &chunks[2].text[..100]);
        assert_eq!(expected_chunk_count(1700, 800, 100), 3);
        Ok(())
    }

    #[test]
    fn empty_document_has_no_chunks() {
        let chunks = chunk_document(&document(""), &ChunkingConfig::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn sentence_policy_cuts_after_sentence_end() -> Result<(), ConfigError> {
        let text = "Le DT2 est fréquent. Il touche les adultes. L'activité physique aide beaucoup.";
        let config = ChunkingConfig::new(50, 5)?;

        let chunks = chunk_document(&document(text), &config);

        assert_eq!(chunks[0].text, "Le DT2 est fréquent. Il touche les adultes. ");
        assert_eq!(chunks[1].start_offset, chunks[0].char_len() - 5);
        assert!(chunks.iter().all(|chunk| chunk.char_len() <= 50));
        Ok(())
    }

    #[test]
    fn sentence_policy_prefers_paragraph_breaks() -> Result<(), ConfigError> {
        let text = "Première partie. Encore.\n\nSeconde partie du texte. Et la suite du propos.";
        let config = ChunkingConfig::new(40, 4)?;

        let chunks = chunk_document(&document(text), &config);

        assert_eq!(chunks[0].text, "Première partie. Encore.\n\n");
        Ok(())
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Glycémie. ".repeat(300);
        let config = ChunkingConfig::default();
        let first = chunk_document(&document(&text), &config);
        let second = chunk_document(&document(&text), &config);
        assert_eq!(first, second);
    }

    #[test]
    fn chunks_keep_source_metadata() {
        let text = "Insuline et glycémie. ".repeat(100);
        let chunks = chunk_documents(&[document(&text)], &ChunkingConfig::default());
        assert!(chunks.len() > 1);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source_name(), "guide-diabete.pdf");
            assert_eq!(chunk.chunk_index, index as u64);
        }
    }

    fn sizes() -> impl Strategy<Value = (usize, usize)> {
        (2usize..120).prop_flat_map(|size| (Just(size), 0..size))
    }

    fn corpus_text() -> impl Strategy<Value = String> {
        "[a-zé .!?\n]{0,600}"
    }

    proptest! {
        #[test]
        fn character_policy_count_matches_formula(
            text in corpus_text(),
            (size, overlap) in sizes(),
        ) {
            let config = ChunkingConfig::new(size, overlap)
                .unwrap()
                .with_boundary(BoundaryPolicy::Characters);
            let len = text.chars().count();

            let pieces = split_text(&text, &config);

            prop_assert_eq!(pieces.len(), expected_chunk_count(len, size, overlap));
            if len > overlap {
                prop_assert_eq!(
                    pieces.len(),
                    (len - overlap).div_ceil(size - overlap)
                );
            }
        }

        #[test]
        fn chunks_are_bounded_overlapping_and_cover_the_text(
            text in corpus_text(),
            (size, overlap) in sizes(),
            sentence: bool,
        ) {
            let boundary = if sentence { BoundaryPolicy::Sentence } else { BoundaryPolicy::Characters };
            let config = ChunkingConfig::new(size, overlap).unwrap().with_boundary(boundary);
            let chars: Vec<char> = text.chars().collect();

            let pieces = split_text(&text, &config);

            for (start, piece) in &pieces {
                let piece_len = piece.chars().count();
                prop_assert!(piece_len <= size);
                prop_assert!(piece_len > 0);
                let expected: String = chars[*start..*start + piece_len].iter().collect();
                prop_assert_eq!(piece, &expected);
            }
            for pair in pieces.windows(2) {
                let (start, piece) = &pair[0];
                let (next_start, _) = &pair[1];
                prop_assert_eq!(*next_start, start + piece.chars().count() - overlap);
            }
            if let Some((start, piece)) = pieces.last() {
                prop_assert_eq!(start + piece.chars().count(), chars.len());
            }
        }
    }
}
