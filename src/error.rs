//! Error types for overlay comparison.
//!
//! This module defines all error types used throughout the crate,
//! providing detailed error information for diagnosing malformed
//! overlays and relocation tables.

use thiserror::Error;

/// Primary error type for overlay comparison operations.
#[derive(Debug, Error)]
pub enum CompareError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Expected input file is absent for a given version.
    ///
    /// Not fatal for a batch: the caller renders a placeholder result
    /// and continues.
    #[error("Missing input: {name} has no data for version {version}")]
    MissingInput {
        /// Build version the file was expected in.
        version: String,
        /// File name within the version tree.
        name: String,
    },

    /// Word index past the end of the word view.
    #[error("Word index {index} out of bounds: container holds {count} words")]
    WordOutOfBounds {
        /// Requested word index.
        index: usize,
        /// Number of words in the container.
        count: usize,
    },

    /// Truncated data when reading a fixed-size structure.
    #[error("Truncated data at offset {offset}: expected {expected} bytes, got {actual}")]
    TruncatedData {
        /// Byte offset of the read.
        offset: usize,
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// The trailer's seek-up word does not land on a plausible header.
    #[error("Bad overlay trailer in {name}: seek-up {seek_up} vs file size {size}")]
    BadTrailer {
        /// Name of the offending blob.
        name: String,
        /// Seek-up distance read from the final word.
        seek_up: u32,
        /// Total file size.
        size: usize,
    },

    /// Section sizes from the header do not add up to the file layout.
    #[error(
        "Section layout of {name} inconsistent: sections + header + reloc table \
         span {claimed} bytes but header sits at {header_pos} in a {size}-byte file"
    )]
    SectionOverrun {
        /// Name of the offending blob.
        name: String,
        /// Bytes claimed by sections, header, and relocation table.
        claimed: usize,
        /// Header position derived from the trailer.
        header_pos: usize,
        /// Total file size.
        size: usize,
    },

    /// Relocation entry with an unsupported section id or type.
    #[error(
        "Unknown relocation in {name} (version {version}), entry {index}: \
         section id {section_id}, type {reloc_type}"
    )]
    UnknownRelocation {
        /// Build version being processed.
        version: String,
        /// Name of the offending blob.
        name: String,
        /// Index of the entry in the relocation table.
        index: usize,
        /// Raw 2-bit section id.
        section_id: u8,
        /// Raw 6-bit relocation type.
        reloc_type: u8,
    },

    /// Relocation offset past the end of the addressed section.
    #[error(
        "Relocation offset out of bounds in {name} (version {version}), entry {index}: \
         offset {offset:#08X} into a {section_len}-byte section"
    )]
    RelocationOutOfBounds {
        /// Build version being processed.
        version: String,
        /// Name of the offending blob.
        name: String,
        /// Index of the entry in the relocation table.
        index: usize,
        /// Byte offset the entry addresses.
        offset: u32,
        /// Length of the addressed section.
        section_len: usize,
    },

    /// Configuration error (worker pool, pass selection).
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

/// Result type alias for overlay comparison operations.
pub type Result<T> = std::result::Result<T, CompareError>;
