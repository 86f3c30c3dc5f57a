use crate::error::BuildError;
use crate::extractor::PdfExtractor;
use crate::models::{Document, Page, SkippedPdf};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, BuildError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub struct CorpusLoad {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedPdf>,
}

pub fn load_documents(
    folder: &Path,
    extractor: &dyn PdfExtractor,
) -> Result<CorpusLoad, BuildError> {
    let files = discover_pdf_files(folder);

    if files.is_empty() {
        return Err(BuildError::NoDocuments(folder.display().to_string()));
    }

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match load_document(&path, extractor) {
            Ok(document) => documents.push(document),
            Err(error) => skipped_files.push(SkippedPdf {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(CorpusLoad {
        documents,
        skipped_files,
    })
}

fn load_document(path: &Path, extractor: &dyn PdfExtractor) -> Result<Document, BuildError> {
    let checksum = digest_file(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            BuildError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    let pages = extractor
        .extract_pages(path)?
        .into_iter()
        .map(|page| Page {
            number: page.number,
            text: page.text,
        })
        .collect();

    Ok(Document {
        document_id: generate_document_id(path),
        title: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum,
        loaded_at: Utc::now(),
        pages,
    })
}

fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::{digest_file, discover_pdf_files, load_documents};
    use crate::error::BuildError;
    use crate::extractor::{LopdfExtractor, PageText, PdfExtractor};
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;

    struct FixedTextExtractor;

    impl PdfExtractor for FixedTextExtractor {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, BuildError> {
            Ok(vec![PageText {
                number: 1,
                text: "extracted page text".to_string(),
            }])
        }
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.pdf"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"skip me"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn loading_fails_without_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = load_documents(dir.path(), &FixedTextExtractor);
        assert!(matches!(result, Err(BuildError::NoDocuments(_))));
        Ok(())
    }

    #[test]
    fn unreadable_pdfs_are_skipped_with_a_reason() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;

        let load = load_documents(dir.path(), &LopdfExtractor)?;

        assert_eq!(load.documents.len(), 0);
        assert_eq!(load.skipped_files.len(), 1);
        assert_eq!(
            load.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        Ok(())
    }

    #[test]
    fn loaded_documents_carry_provenance() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("manual.pdf"), b"%PDF-1.4\n%fake")?;

        let load = load_documents(dir.path(), &FixedTextExtractor)?;

        assert_eq!(load.documents.len(), 1);
        let document = &load.documents[0];
        assert_eq!(document.title, "manual.pdf");
        assert!(!document.document_id.is_empty());
        assert!(!document.checksum.is_empty());
        assert_eq!(document.pages.len(), 1);
        Ok(())
    }
}
