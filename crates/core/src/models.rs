use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub checksum: String,
    pub loaded_at: DateTime<Utc>,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_path: String,
    pub title: String,
    pub page: u32,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Citation {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct BuildReport {
    pub documents: usize,
    pub pages: usize,
    pub chunks: usize,
    pub dimensions: usize,
    pub skipped_files: Vec<SkippedPdf>,
}
