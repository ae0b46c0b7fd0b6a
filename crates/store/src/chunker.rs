//! Sliding-window chunker.
//!
//! Splits policy text into overlapping fixed-size windows measured in
//! characters. There is no sentence or section awareness; a window may cut
//! a word in half.

use policygate_core::IngestError;

/// A validated `(size, overlap)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// `overlap` must be strictly smaller than `size`.
    pub fn new(size: usize, overlap: usize) -> Result<Self, IngestError> {
        if size == 0 || overlap >= size {
            return Err(IngestError::InvalidChunking { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of consecutive windows.
    pub fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Number of chunks `chunk` produces for a text of `len` characters.
    pub fn expected_chunks(&self, len: usize) -> usize {
        match len {
            0 => 0,
            n if n <= self.size => 1,
            n => (n - self.overlap).div_ceil(self.step()),
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::with_capacity(self.expected_chunks(chars.len()));
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += self.step();
        }

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: 900,
            overlap: 150,
        }
    }
}

/// One-shot form of [`Chunker::chunk`].
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, IngestError> {
    Ok(Chunker::new(size, overlap)?.chunk(text))
}
