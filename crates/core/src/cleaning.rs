//! Cleanup of text extracted from PDFs and plain-text sources.
//!
//! [`TextNormalizer`] runs a fixed sequence of passes: punctuation and control
//! characters, broken hyphenation, page numbers, running headers/footers,
//! optional URL/e-mail stripping, optional expansion of diabetes
//! abbreviations, and finally whitespace collapsing. The sequence is repeated
//! until the text stops changing, so cleaning an already-cleaned document is a
//! no-op.

use crate::models::Document;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Lines at least this long are never treated as headers or footers.
pub const MAX_HEADER_CHARS: usize = 100;

/// Abbreviations expanded when `normalize_medical` is on.
pub const MEDICAL_ABBREVIATIONS: [(&str, &str); 4] = [
    ("DT1", "diabète de type 1"),
    ("DT2", "diabète de type 2"),
    ("HbA1c", "hémoglobine glyquée"),
    ("IMC", "indice de masse corporelle"),
];

const MAX_PASSES: usize = 16;

const PUNCTUATION_REPLACEMENTS: [(char, &str); 8] = [
    ('\u{00a0}', " "),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201c}', "\""),
    ('\u{201d}', "\""),
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2026}', "..."),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerOptions {
    pub remove_urls: bool,
    pub normalize_medical: bool,
    pub min_header_repetition: usize,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            remove_urls: true,
            normalize_medical: false,
            min_header_repetition: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    options: NormalizerOptions,
    control_chars: Regex,
    hyphen_break: Regex,
    inline_page: Regex,
    inline_page_short: Regex,
    page_number_line: Regex,
    url: Regex,
    email: Regex,
    medical: Vec<(Regex, &'static str)>,
    spaces: Regex,
    blank_lines: Regex,
}

impl TextNormalizer {
    pub fn new(options: NormalizerOptions) -> Result<Self, regex::Error> {
        let medical = MEDICAL_ABBREVIATIONS
            .iter()
            .map(|(abbreviation, expansion)| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(abbreviation)))
                    .map(|pattern| (pattern, *expansion))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            options,
            control_chars: Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F-\x{9F}]")?,
            hyphen_break: Regex::new(r"(\w+)-[^\S\n]*\n\s*(\w+)")?,
            inline_page: Regex::new(r"\b[Pp]age\s+\d+\b")?,
            inline_page_short: Regex::new(r"\bp\.\s*\d+\b")?,
            page_number_line: Regex::new(r"(?m)^[^\S\n]*\d+[^\S\n]*$")?,
            url: Regex::new(r"https?://(?:[a-zA-Z0-9$-_@.&+!*(),]|%[0-9a-fA-F]{2})+")?,
            email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            medical,
            spaces: Regex::new(r" {2,}")?,
            blank_lines: Regex::new(r"\n{3,}")?,
        })
    }

    pub fn options(&self) -> NormalizerOptions {
        self.options
    }

    /// Returns a cleaned copy of `document`; metadata is kept and flagged as cleaned.
    pub fn normalize(&self, document: &Document) -> Document {
        let mut metadata = document.metadata.clone();
        metadata.cleaned = true;
        Document {
            text: self.normalize_text(&document.text),
            metadata,
        }
    }

    pub fn normalize_all(&self, documents: &[Document]) -> Vec<Document> {
        documents
            .iter()
            .map(|document| self.normalize(document))
            .collect()
    }

    pub fn normalize_text(&self, text: &str) -> String {
        let mut current = self.single_pass(text);
        for _ in 1..MAX_PASSES {
            let next = self.single_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn single_pass(&self, text: &str) -> String {
        let text = self.clean_special_characters(text);
        let text = self.fix_hyphenation(&text);
        let text = self.remove_page_numbers(&text);
        let mut text = remove_headers_footers(&text, self.options.min_header_repetition);

        if self.options.remove_urls {
            text = self.remove_urls_and_emails(&text);
        }

        if self.options.normalize_medical {
            text = self.expand_medical_terms(&text);
        }

        self.clean_whitespace(&text)
    }

    fn clean_special_characters(&self, text: &str) -> String {
        let mut replaced = String::with_capacity(text.len());
        for character in text.chars() {
            match PUNCTUATION_REPLACEMENTS
                .iter()
                .find(|(from, _)| *from == character)
            {
                Some((_, to)) => replaced.push_str(to),
                None => replaced.push(character),
            }
        }
        self.control_chars.replace_all(&replaced, "").into_owned()
    }

    fn fix_hyphenation(&self, text: &str) -> String {
        self.hyphen_break
            .replace_all(text, "${1}${2}")
            .into_owned()
    }

    fn remove_page_numbers(&self, text: &str) -> String {
        let text = self.inline_page.replace_all(text, "");
        let text = self.inline_page_short.replace_all(&text, "");
        self.page_number_line.replace_all(&text, "").into_owned()
    }

    fn remove_urls_and_emails(&self, text: &str) -> String {
        let text = self.url.replace_all(text, "");
        self.email.replace_all(&text, "").into_owned()
    }

    fn expand_medical_terms(&self, text: &str) -> String {
        let mut expanded = text.to_string();
        for (pattern, replacement) in &self.medical {
            expanded = pattern
                .replace_all(&expanded, NoExpand(*replacement))
                .into_owned();
        }
        expanded
    }

    fn clean_whitespace(&self, text: &str) -> String {
        let collapsed = self.spaces.replace_all(text, " ");
        let trimmed_lines = collapsed
            .split('\n')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n");
        self.blank_lines
            .replace_all(&trimmed_lines, "\n\n")
            .trim()
            .to_string()
    }
}

/// Short lines repeated at least `min_repetition` times, compared after trimming.
pub fn repeated_short_lines(text: &str, min_repetition: usize) -> HashSet<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in text.split('\n') {
        let trimmed = line.trim();
        if !trimmed.is_empty() && trimmed.chars().count() < MAX_HEADER_CHARS {
            *counts.entry(trimmed).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count >= min_repetition)
        .map(|(line, _)| line.to_string())
        .collect()
}

fn remove_headers_footers(text: &str, min_repetition: usize) -> String {
    let repeated = repeated_short_lines(text, min_repetition);
    if repeated.is_empty() {
        return text.to_string();
    }

    text.split('\n')
        .filter(|line| !repeated.contains(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub num_documents: usize,
    pub total_characters: usize,
    pub total_words: usize,
    pub avg_chars_per_document: f64,
    pub avg_words_per_document: f64,
}

pub fn document_stats(documents: &[Document]) -> DocumentStats {
    let total_characters = documents
        .iter()
        .map(|document| document.text.chars().count())
        .sum::<usize>();
    let total_words = documents
        .iter()
        .map(|document| document.text.split_whitespace().count())
        .sum::<usize>();
    let count = documents.len();

    let average = |total: usize| {
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    };

    DocumentStats {
        num_documents: count,
        total_characters,
        total_words,
        avg_chars_per_document: average(total_characters),
        avg_words_per_document: average(total_words),
    }
}

/// Percentage removed going from `before` to `after`; 0 when `before` is 0.
pub fn reduction_percent(before: usize, after: usize) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (before as f64 - after as f64) / before as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_metadata;
    use proptest::prelude::*;

    fn normalizer(remove_urls: bool, normalize_medical: bool) -> TextNormalizer {
        TextNormalizer::new(NormalizerOptions {
            remove_urls,
            normalize_medical,
            min_header_repetition: 3,
        })
        .expect("built-in patterns compile")
    }

    #[test]
    fn replaces_typographic_punctuation() {
        let cleaned = normalizer(false, false)
            .normalize_text("\u{201c}Glyc\u{e9}mie\u{201d}\u{a0}\u{2013} l\u{2019}insuline\u{2026}");
        assert_eq!(cleaned, "\"Glycémie\" - l'insuline...");
    }

    #[test]
    fn strips_control_characters_but_keeps_tabs_and_newlines() {
        let cleaned = normalizer(false, false).normalize_text("a\u{0007}b\tc\nd\u{0085}e");
        assert_eq!(cleaned, "ab\tc\nde");
    }

    #[test]
    fn rejoins_words_broken_across_lines() {
        let cleaned = normalizer(false, false).normalize_text("l'hypo-\nglycémie est rare");
        assert_eq!(cleaned, "l'hypoglycémie est rare");
    }

    #[test]
    fn keeps_genuine_hyphenated_compounds() {
        let cleaned = normalizer(false, false).normalize_text("un auto-contrôle quotidien");
        assert_eq!(cleaned, "un auto-contrôle quotidien");
    }

    #[test]
    fn removes_page_numbers() {
        let text = "Introduction\n12\nVoir Page 4 et p. 17 pour le détail.\n  3  \nFin";
        let cleaned = normalizer(false, false).normalize_text(text);
        assert_eq!(cleaned, "Introduction\n\nVoir et pour le détail.\n\nFin");
    }

    #[test]
    fn removes_running_headers() {
        let text = "Guide HAS 2024\nPremier paragraphe.\nGuide HAS 2024\nDeuxième paragraphe.\nGuide HAS 2024\nTroisième.";
        let cleaned = normalizer(false, false).normalize_text(text);
        assert_eq!(cleaned, "Premier paragraphe.\nDeuxième paragraphe.\nTroisième.");
    }

    #[test]
    fn header_detection_is_case_sensitive() {
        let text = "Guide\nguide\nGUIDE\nbody";
        let cleaned = normalizer(false, false).normalize_text(text);
        assert_eq!(cleaned, text);
    }

    #[test]
    fn long_repeated_lines_are_kept() {
        let line = "x".repeat(MAX_HEADER_CHARS);
        let text = format!("{line}\n{line}\n{line}");
        let cleaned = normalizer(false, false).normalize_text(&text);
        assert_eq!(cleaned, text);
    }

    #[test]
    fn strips_urls_and_emails_only_when_enabled() {
        let text = "Contact: info@diabete.fr ou https://www.diabete.fr/aide";
        assert_eq!(normalizer(true, false).normalize_text(text), "Contact: ou");
        assert_eq!(normalizer(false, false).normalize_text(text), text);
    }

    #[test]
    fn expands_medical_abbreviations_and_urls() {
        let document = Document::new(
            "DT1 et DT2 sont suivis par HbA1c et IMC. Visitez http://example.com.",
            test_metadata("guide.txt"),
        );
        let cleaned = normalizer(true, true).normalize(&document);

        assert!(cleaned.text.contains("diabète de type 1"));
        assert!(cleaned.text.contains("diabète de type 2"));
        assert!(cleaned.text.contains("hémoglobine glyquée"));
        assert!(cleaned.text.contains("indice de masse corporelle"));
        assert!(!cleaned.text.contains("http"));
        assert!(cleaned.metadata.cleaned);
        assert_eq!(cleaned.metadata.file_name, "guide.txt");
    }

    #[test]
    fn medical_expansion_matches_whole_words_case_insensitively() {
        let cleaned = normalizer(false, true).normalize_text("hba1c, imc et DT10");
        assert_eq!(cleaned, "hémoglobine glyquée, indice de masse corporelle et DT10");
    }

    #[test]
    fn collapses_whitespace() {
        let cleaned = normalizer(false, false).normalize_text("  a    b  \n\n\n\n  c \n \n \n d  ");
        assert_eq!(cleaned, "a b\n\nc\n\nd");
    }

    #[test]
    fn repeats_until_stable() {
        let text = "See https://a.org\nbody one\nSee https://b.org\nbody two\nSee https://c.org";
        let cleaner = normalizer(true, false);
        let once = cleaner.normalize_text(text);
        assert_eq!(once, "body one\nbody two");
        assert_eq!(cleaner.normalize_text(&once), once);
    }

    #[test]
    fn stats_on_empty_corpus_are_zero() {
        let stats = document_stats(&[]);
        assert_eq!(stats.num_documents, 0);
        assert_eq!(stats.total_characters, 0);
        assert_eq!(stats.avg_chars_per_document, 0.0);
        assert_eq!(stats.avg_words_per_document, 0.0);
    }

    #[test]
    fn stats_count_characters_and_words() {
        let documents = vec![
            Document::new("glycémie à jeun", test_metadata("a.txt")),
            Document::new("insuline", test_metadata("b.txt")),
        ];
        let stats = document_stats(&documents);
        assert_eq!(stats.num_documents, 2);
        assert_eq!(stats.total_characters, 23);
        assert_eq!(stats.total_words, 4);
        assert_eq!(stats.avg_chars_per_document, 11.5);
        assert_eq!(stats.avg_words_per_document, 2.0);
    }

    #[test]
    fn reduction_with_zero_baseline_is_zero() {
        assert_eq!(reduction_percent(0, 0), 0.0);
        assert_eq!(reduction_percent(200, 150), 25.0);
    }

    const NOISE: [&str; 14] = [
        "Page 3",
        "p. 12",
        "\n",
        "  ",
        "-\n",
        "DT2",
        "HbA1c",
        "http://x.fr",
        "a@b.fr",
        "\u{2019}",
        "\u{2026}",
        "\u{a0}",
        "42",
        "Header",
    ];

    fn noisy_text() -> impl Strategy<Value = String> {
        let token = prop_oneof![
            proptest::sample::select(NOISE.to_vec()).prop_map(str::to_string),
            "[a-zé]{1,8}",
        ];
        proptest::collection::vec(token, 0..60).prop_map(|parts| parts.concat())
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(text in noisy_text(), urls: bool, medical: bool) {
            let cleaner = normalizer(urls, medical);
            let once = cleaner.normalize_text(&text);
            prop_assert_eq!(cleaner.normalize_text(&once), once);
        }

        #[test]
        fn normalization_never_grows_text(text in noisy_text(), urls: bool) {
            let cleaned = normalizer(urls, false).normalize_text(&text);
            prop_assert!(cleaned.len() <= text.len());
        }

        #[test]
        fn output_has_no_outer_whitespace_or_triple_newlines(text in noisy_text()) {
            let cleaned = normalizer(true, true).normalize_text(&text);
            prop_assert_eq!(cleaned.trim(), cleaned.as_str());
            prop_assert!(!cleaned.contains("\n\n\n"));
        }
    }
}
