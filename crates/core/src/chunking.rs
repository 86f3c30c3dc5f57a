use crate::error::BuildError;
use crate::models::{Chunk, Document};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 2_000,
            overlap_chars: 500,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.chunk_chars == 0 {
            return Err(BuildError::InvalidChunkConfig(
                "chunk_chars must be greater than zero".to_string(),
            ));
        }

        if self.overlap_chars >= self.chunk_chars {
            return Err(BuildError::InvalidChunkConfig(format!(
                "overlap_chars {} must be strictly less than chunk_chars {}",
                self.overlap_chars, self.chunk_chars
            )));
        }

        Ok(())
    }

    pub fn stride(&self) -> usize {
        self.chunk_chars - self.overlap_chars
    }
}

pub fn split<'a>(
    document: &'a Document,
    config: ChunkingConfig,
) -> Result<impl Iterator<Item = Chunk> + 'a, BuildError> {
    config.validate()?;

    Ok(document
        .pages
        .iter()
        .flat_map(move |page| PageWindows::new(document, page.number, &page.text, config)))
}

// Fixed-size character windows over one page, stepped by `stride`. Offsets are
// character offsets into the page text; the last window ends at the page end.
struct PageWindows<'a> {
    document: &'a Document,
    page: u32,
    chars: Vec<char>,
    config: ChunkingConfig,
    start: usize,
    done: bool,
}

impl<'a> PageWindows<'a> {
    fn new(document: &'a Document, page: u32, text: &str, config: ChunkingConfig) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let done = chars.is_empty();

        Self {
            document,
            page,
            chars,
            config,
            start: 0,
            done,
        }
    }
}

impl Iterator for PageWindows<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let end = (self.start + self.config.chunk_chars).min(self.chars.len());
        let text: String = self.chars[self.start..end].iter().collect();

        let chunk = Chunk {
            chunk_id: make_chunk_id(&self.document.document_id, self.page, self.start, &text),
            document_id: self.document.document_id.clone(),
            source_path: self.document.source_path.clone(),
            title: self.document.title.clone(),
            page: self.page,
            start_offset: self.start,
            end_offset: end,
            text,
        };

        if end == self.chars.len() {
            self.done = true;
        } else {
            self.start += self.config.stride();
        }

        Some(chunk)
    }
}

fn make_chunk_id(document_id: &str, page: u32, start: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update((start as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
