//! PDF text extraction, page by page.

use crate::error::LoadError;
use lopdf::Document;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// What the loader needs from one PDF: the readable pages and the real page
/// count, blank and undecodable pages included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPdf {
    /// Pages that produced text, ordered by page number.
    pub pages: Vec<PageText>,
    pub page_count: u32,
    /// Pages whose content stream could not be decoded.
    pub unreadable: Vec<u32>,
}

impl ExtractedPdf {
    /// Collects per-page results. A page that fails is skipped rather than
    /// failing the file; a file with no text at all is an error.
    pub fn from_pages<I>(path: &Path, results: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = (u32, Result<String, String>)>,
    {
        let mut page_count = 0u32;
        let mut pages = Vec::new();
        let mut unreadable = Vec::new();

        for (number, result) in results {
            page_count = page_count.saturating_add(1);
            match result {
                Ok(text) if !text.trim().is_empty() => pages.push(PageText { number, text }),
                Ok(_) => {}
                Err(details) => {
                    debug!(path = %path.display(), page = number, error = %details, "pdf page has no decodable text");
                    unreadable.push(number);
                }
            }
        }

        if pages.is_empty() {
            return Err(LoadError::PdfParse {
                path: path.to_path_buf(),
                details: format!("no readable text in {page_count} page(s)"),
            });
        }
        pages.sort_by_key(|page| page.number);

        Ok(Self {
            pages,
            page_count,
            unreadable,
        })
    }

    /// Page texts separated by a blank line, so paragraph splitting and
    /// repeated header detection see page boundaries.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.text.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub trait PdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedPdf, LoadError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedPdf, LoadError> {
        let document = Document::load(path).map_err(|error| LoadError::PdfParse {
            path: path.to_path_buf(),
            details: error.to_string(),
        })?;

        // Page numbers come back sorted and 1-based.
        let results = document.get_pages().into_keys().map(|number| {
            let text = document
                .extract_text(&[number])
                .map_err(|error| error.to_string());
            (number, text)
        });
        ExtractedPdf::from_pages(path, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn page(number: u32, text: &str) -> (u32, Result<String, String>) {
        (number, Ok(text.to_string()))
    }

    #[test]
    fn text_follows_page_numbers() -> Result<(), LoadError> {
        let pdf = ExtractedPdf::from_pages(
            Path::new("guide.pdf"),
            vec![page(2, "Second\n"), page(1, "First")],
        )?;

        assert_eq!(pdf.text(), "First\n\nSecond");
        assert_eq!(pdf.page_count, 2);
        Ok(())
    }

    #[test]
    fn blank_and_undecodable_pages_still_count() -> Result<(), LoadError> {
        let pdf = ExtractedPdf::from_pages(
            Path::new("guide.pdf"),
            vec![
                page(1, "Couverture"),
                page(2, "   \n"),
                (3, Err("unknown font encoding".to_string())),
                page(4, "Glycémie à jeun"),
            ],
        )?;

        assert_eq!(pdf.page_count, 4);
        assert_eq!(pdf.unreadable, vec![3]);
        let numbers = pdf.pages.iter().map(|page| page.number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 4]);
        Ok(())
    }

    #[test]
    fn pdf_without_any_text_is_a_parse_error() {
        let result = ExtractedPdf::from_pages(
            Path::new("scan.pdf"),
            vec![page(1, ""), (2, Err("image only".to_string()))],
        );

        match result {
            Err(LoadError::PdfParse { details, .. }) => assert!(details.contains("2 page(s)")),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn broken_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = LopdfExtractor.extract(&path);
        assert!(matches!(result, Err(LoadError::PdfParse { .. })));
        Ok(())
    }
}
