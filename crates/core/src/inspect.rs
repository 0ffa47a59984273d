//! Corpus inspection: what cleaning would change and what looks wrong.

use crate::cleaning::{
    document_stats, reduction_percent, repeated_short_lines, DocumentStats, TextNormalizer,
    MEDICAL_ABBREVIATIONS,
};
use crate::models::{excerpt, Document, DEFAULT_EXCERPT_CHARS};
use std::fmt;

pub const MIN_DOCUMENT_CHARS: usize = 100;
/// A short line has to appear more often than this to be flagged.
pub const REPEATED_LINE_LIMIT: usize = 5;
pub const CLEANING_RECOMMENDATION_PERCENT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Problem {
    TooShort {
        document: usize,
        file_name: String,
        chars: usize,
    },
    RepeatedLines {
        document: usize,
        file_name: String,
        lines: usize,
    },
    Urls {
        document: usize,
        file_name: String,
        count: usize,
    },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort {
                document,
                file_name,
                chars,
            } => write!(f, "document {document} ({file_name}): text too short ({chars} characters)"),
            Self::RepeatedLines {
                document,
                file_name,
                lines,
            } => write!(
                f,
                "document {document} ({file_name}): {lines} repeated line(s), likely headers or footers"
            ),
            Self::Urls {
                document,
                file_name,
                count,
            } => write!(f, "document {document} ({file_name}): {count} URL(s) found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recommendation {
    EnableCleaning { reduction: f64 },
    EnableUrlRemoval,
    EnableMedicalNormalization,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnableCleaning { reduction } => write!(
                f,
                "cleaning shrinks the corpus by {reduction:.1}%; keep CLEAN_TEXT=true"
            ),
            Self::EnableUrlRemoval => f.write_str("URLs were found; keep REMOVE_URLS=true"),
            Self::EnableMedicalNormalization => f.write_str(
                "medical abbreviations were found; consider NORMALIZE_MEDICAL=true",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPreview {
    pub file_name: String,
    pub original: String,
    pub original_chars: usize,
    pub original_words: usize,
    pub cleaned: String,
    pub cleaned_chars: usize,
    pub cleaned_words: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorpusInspection {
    pub before: DocumentStats,
    pub after: DocumentStats,
    pub character_reduction: f64,
    pub word_reduction: f64,
    pub problems: Vec<Problem>,
    pub recommendations: Vec<Recommendation>,
    pub previews: Vec<DocumentPreview>,
}

pub fn inspect_corpus(documents: &[Document], normalizer: &TextNormalizer) -> CorpusInspection {
    let cleaned = normalizer.normalize_all(documents);
    let before = document_stats(documents);
    let after = document_stats(&cleaned);
    let character_reduction = reduction_percent(before.total_characters, after.total_characters);
    let word_reduction = reduction_percent(before.total_words, after.total_words);

    let problems = documents
        .iter()
        .enumerate()
        .flat_map(|(position, document)| document_problems(position + 1, document))
        .collect();

    let mut recommendations = Vec::new();
    if character_reduction > CLEANING_RECOMMENDATION_PERCENT {
        recommendations.push(Recommendation::EnableCleaning {
            reduction: character_reduction,
        });
    }
    if documents.iter().any(|document| url_count(&document.text) > 0) {
        recommendations.push(Recommendation::EnableUrlRemoval);
    }
    if documents.iter().any(|document| {
        MEDICAL_ABBREVIATIONS
            .iter()
            .any(|(abbreviation, _)| document.text.contains(abbreviation))
    }) {
        recommendations.push(Recommendation::EnableMedicalNormalization);
    }

    let previews = documents
        .iter()
        .zip(&cleaned)
        .map(|(original, cleaned)| DocumentPreview {
            file_name: original.file_name().to_string(),
            original: excerpt(&original.text, DEFAULT_EXCERPT_CHARS),
            original_chars: original.text.chars().count(),
            original_words: original.text.split_whitespace().count(),
            cleaned: excerpt(&cleaned.text, DEFAULT_EXCERPT_CHARS),
            cleaned_chars: cleaned.text.chars().count(),
            cleaned_words: cleaned.text.split_whitespace().count(),
        })
        .collect();

    CorpusInspection {
        before,
        after,
        character_reduction,
        word_reduction,
        problems,
        recommendations,
        previews,
    }
}

fn document_problems(position: usize, document: &Document) -> Vec<Problem> {
    let file_name = document.file_name().to_string();
    let mut problems = Vec::new();

    let chars = document.text.chars().count();
    if chars < MIN_DOCUMENT_CHARS {
        problems.push(Problem::TooShort {
            document: position,
            file_name: file_name.clone(),
            chars,
        });
    }

    let lines = repeated_short_lines(&document.text, REPEATED_LINE_LIMIT + 1).len();
    if lines > 0 {
        problems.push(Problem::RepeatedLines {
            document: position,
            file_name: file_name.clone(),
            lines,
        });
    }

    let count = url_count(&document.text);
    if count > 0 {
        problems.push(Problem::Urls {
            document: position,
            file_name,
            count,
        });
    }

    problems
}

fn url_count(text: &str) -> usize {
    text.to_lowercase().matches("http").count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaning::NormalizerOptions;
    use crate::models::test_metadata;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::new(NormalizerOptions::default()).unwrap()
    }

    #[test]
    fn flags_short_documents_and_urls() {
        let documents = vec![Document::new(
            "Voir https://www.federationdesdiabetiques.org",
            test_metadata("liens.txt"),
        )];

        let report = inspect_corpus(&documents, &normalizer());

        assert!(report.problems.contains(&Problem::TooShort {
            document: 1,
            file_name: "liens.txt".to_string(),
            chars: 45,
        }));
        assert!(report.problems.contains(&Problem::Urls {
            document: 1,
            file_name: "liens.txt".to_string(),
            count: 1,
        }));
        assert!(report
            .recommendations
            .contains(&Recommendation::EnableUrlRemoval));
        assert!(report.character_reduction > CLEANING_RECOMMENDATION_PERCENT);
        assert!(matches!(
            report.recommendations[0],
            Recommendation::EnableCleaning { .. }
        ));
    }

    #[test]
    fn flags_lines_repeated_more_than_five_times() {
        let page = "Guide du diabète\nLe contenu de la page change ici et reste assez long.\n";
        let five = Document::new(page.repeat(5), test_metadata("cinq.pdf"));
        let six = Document::new(page.repeat(6), test_metadata("six.pdf"));

        let report = inspect_corpus(&[five, six], &normalizer());

        let repeated: Vec<_> = report
            .problems
            .iter()
            .filter_map(|problem| match problem {
                Problem::RepeatedLines { file_name, .. } => Some(file_name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(repeated, vec!["six.pdf"]);
    }

    #[test]
    fn recommends_medical_normalization_for_abbreviations() {
        let text = format!("Le suivi de l'HbA1c est essentiel. {}", "x".repeat(120));
        let report = inspect_corpus(&[Document::new(text, test_metadata("suivi.txt"))], &normalizer());

        assert!(report
            .recommendations
            .contains(&Recommendation::EnableMedicalNormalization));
        assert!(report.problems.is_empty());
    }

    #[test]
    fn previews_are_truncated_to_excerpt_length() {
        let text = "glycémie ".repeat(100);
        let report = inspect_corpus(&[Document::new(text, test_metadata("long.txt"))], &normalizer());

        let preview = &report.previews[0];
        assert_eq!(preview.original.chars().count(), DEFAULT_EXCERPT_CHARS + 3);
        assert_eq!(preview.original_words, 100);
        assert_eq!(preview.cleaned_words, 100);
    }
}
