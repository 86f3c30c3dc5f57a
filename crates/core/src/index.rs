use crate::error::IndexError;
use crate::models::Chunk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub format_version: u32,
    pub dimensions: usize,
    pub embedding_model: String,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    metadata: IndexMetadata,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn build(
        entries: Vec<IndexEntry>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, IndexError> {
        let dimensions = entries
            .first()
            .map(|entry| entry.embedding.len())
            .unwrap_or(0);

        for entry in &entries {
            if entry.embedding.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    actual: entry.embedding.len(),
                });
            }
        }

        Ok(Self {
            metadata: IndexMetadata {
                format_version: INDEX_FORMAT_VERSION,
                dimensions,
                embedding_model: embedding_model.into(),
                built_at: Utc::now(),
            },
            entries,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidInput(
                "k must be greater than zero".to_string(),
            ));
        }

        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        if query.len() != self.metadata.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.metadata.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(query, &entry.embedding)))
            .collect();

        // Stable sort keeps insertion order on tied scores.
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| (self.entries[position].chunk.clone(), score))
            .collect())
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        // Written to a temp file in the destination directory and renamed over
        // the target, so readers only ever observe the old or the new index.
        let mut staged = NamedTempFile::new_in(parent)?;
        serde_json::to_writer(&mut staged, self)?;
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|error| error.error)?;

        info!(
            path = %path.display(),
            entries = self.entries.len(),
            dimensions = self.metadata.dimensions,
            "index persisted"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = fs::read(path).map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                IndexError::NotFound(path.to_path_buf())
            } else {
                IndexError::Io(error)
            }
        })?;

        let index: Self = serde_json::from_slice(&bytes).map_err(|error| IndexError::Corrupt {
            path: path.to_path_buf(),
            details: error.to_string(),
        })?;

        if index.metadata.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                details: format!(
                    "unsupported format version {}",
                    index.metadata.format_version
                ),
            });
        }

        for entry in &index.entries {
            if entry.embedding.len() != index.metadata.dimensions {
                return Err(IndexError::Corrupt {
                    path: path.to_path_buf(),
                    details: format!(
                        "entry dimension {} does not match recorded {}",
                        entry.embedding.len(),
                        index.metadata.dimensions
                    ),
                });
            }
        }

        Ok(index)
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut left_norm = 0.0f32;
    let mut right_norm = 0.0f32;

    for (a, b) in left.iter().zip(right.iter()) {
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    let magnitude = left_norm.sqrt() * right_norm.sqrt();
    if magnitude == 0.0 {
        0.0
    } else {
        dot / magnitude
    }
}
