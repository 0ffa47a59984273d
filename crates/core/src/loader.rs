use crate::error::LoadError;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::models::{Document, DocumentMetadata, FileType};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Descend into subdirectories when loading a folder.
    pub recursive: bool,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

pub fn file_type(path: &Path) -> Option<FileType> {
    let extension = path.extension().and_then(|ext| ext.to_str())?;
    if extension.eq_ignore_ascii_case("pdf") {
        Some(FileType::Pdf)
    } else if extension.eq_ignore_ascii_case("txt") {
        Some(FileType::Text)
    } else if extension.eq_ignore_ascii_case("md") || extension.eq_ignore_ascii_case("markdown") {
        Some(FileType::Markdown)
    } else {
        None
    }
}

/// Supported files under `folder`, sorted by path.
pub fn discover_files(folder: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(folder).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = walker
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| file_type(path).is_some())
        .collect::<Vec<_>>();

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Loads a single file or every supported file of a directory.
///
/// Unreadable files inside a directory are skipped and reported; the call
/// fails only when the path is missing or nothing could be read.
pub fn load_documents(path: &Path, options: LoadOptions) -> Result<LoadReport, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound {
            path: path.to_path_buf(),
        });
    }

    if path.is_file() {
        let document = load_file(path)?;
        return Ok(LoadReport {
            documents: vec![document],
            skipped: Vec::new(),
        });
    }

    let files = discover_files(path, options.recursive);
    debug!(folder = %path.display(), files = files.len(), "discovered documents");

    let mut documents = Vec::new();
    let mut skipped = Vec::new();

    for file in files {
        match load_file(&file) {
            Ok(document) => documents.push(document),
            Err(error) => {
                warn!(path = %file.display(), reason = %error, "skipping unreadable document");
                skipped.push(SkippedFile {
                    path: file,
                    reason: error.to_string(),
                });
            }
        }
    }

    if documents.is_empty() {
        return Err(LoadError::NoDocuments {
            path: path.to_path_buf(),
        });
    }

    Ok(LoadReport { documents, skipped })
}

pub fn load_file(path: &Path) -> Result<Document, LoadError> {
    let kind = file_type(path).ok_or_else(|| LoadError::Unsupported {
        path: path.to_path_buf(),
    })?;

    let (text, page_count) = match kind {
        FileType::Pdf => {
            let pdf = LopdfExtractor.extract(path)?;
            if !pdf.unreadable.is_empty() {
                warn!(
                    path = %path.display(),
                    pages = ?pdf.unreadable,
                    "skipped pdf pages without decodable text"
                );
            }
            (pdf.text(), Some(pdf.page_count))
        }
        FileType::Text | FileType::Markdown => {
            let bytes = fs::read(path).map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            (String::from_utf8_lossy(&bytes).into_owned(), None)
        }
    };

    if text.trim().is_empty() {
        return Err(LoadError::NoDocuments {
            path: path.to_path_buf(),
        });
    }

    Ok(Document {
        text,
        metadata: build_metadata(path, kind, page_count)?,
    })
}

fn build_metadata(
    path: &Path,
    kind: FileType,
    page_count: Option<u32>,
) -> Result<DocumentMetadata, LoadError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| LoadError::MissingFileName {
            path: path.to_path_buf(),
        })?;

    Ok(DocumentMetadata {
        source_path: path.to_string_lossy().to_string(),
        file_name: file_name.to_string(),
        file_type: kind,
        page_count,
        checksum: digest_file(path)?,
        cleaned: false,
        extra: BTreeMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discovery_is_flat_unless_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        fs::write(base.join("a.txt"), "alpha")?;
        fs::write(base.join("ignored.csv"), "x,y")?;
        File::create(nested.join("b.md")).and_then(|mut file| file.write_all(b"# beta"))?;

        assert_eq!(discover_files(base, false).len(), 1);
        assert_eq!(discover_files(base, true).len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.txt");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn missing_path_is_reported() {
        let result = load_documents(Path::new("/definitely/not/here"), LoadOptions::default());
        assert!(matches!(result, Err(LoadError::NotFound { .. })));
    }

    #[test]
    fn empty_folder_has_no_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = load_documents(dir.path(), LoadOptions::default());
        assert!(matches!(result, Err(LoadError::NoDocuments { .. })));
        Ok(())
    }

    #[test]
    fn loads_single_file_with_citation_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("insuline.txt");
        fs::write(&path, "L'insuline régule la glycémie.")?;

        let report = load_documents(&path, LoadOptions::default())?;
        assert_eq!(report.documents.len(), 1);
        let document = &report.documents[0];
        assert_eq!(document.file_name(), "insuline.txt");
        assert_eq!(document.metadata.file_type, FileType::Text);
        assert!(!document.metadata.cleaned);
        assert_eq!(document.text, "L'insuline régule la glycémie.");
        Ok(())
    }

    #[test]
    fn unreadable_files_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("broken.pdf"), b"%PDF-1.4\n%broken")?;
        fs::write(dir.path().join("notes.md"), "Activité physique et DT2")?;

        let report = load_documents(dir.path(), LoadOptions::default())?;

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].file_name(), "notes.md");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].path.file_name().and_then(|name| name.to_str()),
            Some("broken.pdf")
        );
        Ok(())
    }

    #[test]
    fn only_broken_files_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("broken.pdf"), b"%PDF-1.4\n%broken")?;

        let result = load_documents(dir.path(), LoadOptions::default());
        assert!(matches!(result, Err(LoadError::NoDocuments { .. })));
        Ok(())
    }
}
