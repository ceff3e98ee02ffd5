//! Byte buffer with a synchronized big-endian word view.
//!
//! Every section type in an overlay, as well as plain ROM files, sits on
//! top of a [`BinaryContainer`]: a byte sequence plus a big-endian 32-bit
//! word projection of it. Normalization passes mutate the word view and
//! re-derive the bytes; hashing and byte-level diffing read the byte view.

use byteorder::{BigEndian, ByteOrder};
use sha2::{Digest, Sha256};

use crate::error::{CompareError, Result};

/// Byte buffer with a synchronized big-endian 32-bit word view.
///
/// Invariant after [`sync_bytes_from_words`](Self::sync_bytes_from_words):
/// `byte_len() == 4 * word_count()`. Until then a freshly constructed
/// container may carry a trailing partial word in its byte view that the
/// word view does not see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryContainer {
    bytes: Vec<u8>,
    words: Vec<u32>,
}

impl BinaryContainer {
    /// Build a container over a byte blob.
    ///
    /// The word view covers every whole 4-byte big-endian word; a trailing
    /// partial word stays in the byte view only.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let words = bytes
            .chunks_exact(4)
            .map(BigEndian::read_u32)
            .collect();
        Self { bytes, words }
    }

    /// Build a container directly from words.
    pub fn from_words(words: Vec<u32>) -> Self {
        let mut bytes = vec![0u8; words.len() * 4];
        BigEndian::write_u32_into(&words, &mut bytes);
        Self { bytes, words }
    }

    /// Length of the byte view.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of whole words in the word view.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Whether the container holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The byte view.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The word view.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Mutable access to the word view.
    ///
    /// Callers that mutate words must finish with
    /// [`sync_bytes_from_words`](Self::sync_bytes_from_words).
    pub fn words_mut(&mut self) -> &mut Vec<u32> {
        &mut self.words
    }

    /// Read one word, bounds-checked.
    pub fn word(&self, index: usize) -> Result<u32> {
        self.words
            .get(index)
            .copied()
            .ok_or(CompareError::WordOutOfBounds {
                index,
                count: self.words.len(),
            })
    }

    /// Write one word, bounds-checked.
    ///
    /// Only the word view is touched; call
    /// [`sync_bytes_from_words`](Self::sync_bytes_from_words) when done.
    pub fn set_word(&mut self, index: usize, value: u32) -> Result<()> {
        let count = self.words.len();
        match self.words.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CompareError::WordOutOfBounds { index, count }),
        }
    }

    /// Regenerate the byte view from the word view.
    ///
    /// Truncates the byte view to `4 * word_count()`, discarding any
    /// trailing partial word the original input carried.
    pub fn sync_bytes_from_words(&mut self) {
        self.bytes.resize(self.words.len() * 4, 0);
        BigEndian::write_u32_into(&self.words, &mut self.bytes);
    }

    /// Hex-encoded SHA-256 digest of the byte view.
    ///
    /// Used as the equality/identity key throughout the diff engine.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}
