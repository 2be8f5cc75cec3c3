use crate::error::IngestError;
use lopdf::Document;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One page of raw text, 1-indexed as shown to readers.
#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Anything that can turn a source file into an ordered page sequence.
pub trait DocumentSource {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfSource;

impl DocumentSource for LopdfSource {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

/// Plain-text sources: form-feed separated blocks become pages, a file
/// without form feeds is a single page.
#[derive(Default)]
pub struct PlainTextSource;

impl DocumentSource for PlainTextSource {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let raw = std::fs::read_to_string(path)?;
        let pages: Vec<PageText> = raw
            .split('\u{000c}')
            .enumerate()
            .filter_map(|(index, block)| {
                let text = block.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(PageText {
                        number: (index + 1) as u32,
                        text: text.to_string(),
                    })
                }
            })
            .collect();

        if pages.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "text file is empty: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

/// Picks a page extractor by file extension.
pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => LopdfSource.extract_pages(path),
        "txt" | "md" => PlainTextSource.extract_pages(path),
        other => Err(IngestError::InvalidArgument(format!(
            "unsupported source extension {other:?}: {}",
            path.display()
        ))),
    }
}

/// Recursively lists ingestable files under a folder, sorted for
/// reproducible ingestion order.
pub fn discover_source_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                ext.eq_ignore_ascii_case("pdf")
                    || ext.eq_ignore_ascii_case("txt")
                    || ext.eq_ignore_ascii_case("md")
            });

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}
