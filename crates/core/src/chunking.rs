use crate::config::ChunkingConfig;
use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{Chunk, DocumentFingerprint};
use sha2::{Digest, Sha256};

/// Splits page-tagged text into overlapping word windows.
///
/// Pages are concatenated into one word stream so a window may straddle a
/// page boundary; each chunk records the distinct pages its words came from.
/// The final partial window is always emitted. Same input and config always
/// produce the same chunk sequence.
pub fn chunk_pages(
    document: &DocumentFingerprint,
    pages: &[PageText],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let mut words: Vec<(&str, u32)> = Vec::new();
    for page in pages {
        for word in page.text.split_whitespace() {
            words.push((word, page.number));
        }
    }

    if words.is_empty() {
        return Ok(Vec::new());
    }

    let step = config.target_words - config.overlap_words;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0u64;

    loop {
        let end = (start + config.target_words).min(words.len());
        let window = &words[start..end];

        let text = window
            .iter()
            .map(|(word, _)| *word)
            .collect::<Vec<_>>()
            .join(" ");

        let mut page_numbers: Vec<u32> = window.iter().map(|(_, page)| *page).collect();
        page_numbers.sort_unstable();
        page_numbers.dedup();

        chunks.push(Chunk {
            chunk_id: make_chunk_id(&document.document_id, index, &text),
            document_id: document.document_id.clone(),
            source_file: document.source_file.clone(),
            chunk_index: index,
            text,
            page_numbers,
        });

        if end == words.len() {
            break;
        }
        start += step;
        index += 1;
    }

    Ok(chunks)
}

fn make_chunk_id(document_id: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
