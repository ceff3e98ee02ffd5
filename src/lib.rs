//! Overlay Compare - Version-Invariant MIPS Overlay Diffing
//!
//! This library decodes compiled MIPS code overlays, erases their
//! address-dependent bits, and produces comparison artifacts (content
//! hashes and difference counts) that recognize the same overlay
//! compiled under many ROM build variants as semantically identical
//! despite different linked addresses.
//!
//! # Features
//!
//! - **Section splitting**: parses the trailer-relative header and
//!   slices an overlay into text/data/rodata/bss/reloc plus tail
//! - **Instruction decoding**: total big-endian MIPS word decoding with
//!   bit-exact re-encoding
//! - **Relocation-driven erasure**: masks relocated words down to their
//!   address-independent bits
//! - **Heuristic erasure**: LUI/consumer pair tracking, jump-target
//!   clearing, and data segment-marker collapse when no relocation
//!   table is trusted
//! - **Diffing**: hash equality, byte/word/opcode-level counts, nested
//!   per-section results, and symmetric ignore-class blanking
//! - **Batch dispatch** (feature `batch`): rayon-parallel comparison
//!   across version-namespaced directory trees
//!
//! # Quick Start
//!
//! ```rust
//! use overlay_compare::compare_plain_blobs;
//!
//! let result = compare_plain_blobs(vec![0, 0, 0, 1], vec![0, 0, 0, 2]);
//! assert!(!result.equal);
//! assert_eq!(result.diff_words, 1);
//! ```
//!
//! # Pipeline
//!
//! Overlay comparison runs split -> erase -> diff. Both erasure paths
//! are available: [`AddressErasure::Relocations`] consumes the
//! overlay's own relocation table, [`AddressErasure::Heuristic`]
//! approximates the same erasure from instruction patterns alone. Each
//! (version, filename) unit owns its buffers, so units parallelize
//! freely.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]

#[cfg(feature = "batch")]
pub mod batch;
pub mod container;
pub mod diff;
pub mod error;
pub mod mips;
pub mod normalize;
pub mod overlay;
pub mod reloc;

pub use container::BinaryContainer;
pub use diff::{
    blank_out_differences, compare_containers, compare_files, compare_overlays, compare_text,
    ComparisonResult, IgnoreClasses, OpcodeDiff, SectionComparisons,
};
pub use error::{CompareError, Result};
pub use mips::{InstrKind, Instruction};
pub use normalize::{
    normalize_data_words, normalize_overlay, normalize_text, AddressErasure, LuiTracker,
    NormalizePasses, NormalizerConfig, DEFAULT_LUI_WINDOW,
};
pub use overlay::{FileKind, Overlay, OverlayHeader, RomFile, SectionKind, TextSection};
pub use reloc::{resolve_overlay, RelocKind, RelocSection, RelocationEntry};

/// Compare two flat blobs by content hash.
///
/// The primary entry point for non-overlay files; no address erasure is
/// applied (use [`blank_out_differences`] for ignore-class blanking
/// first if needed).
pub fn compare_plain_blobs(one: Vec<u8>, two: Vec<u8>) -> ComparisonResult {
    compare_containers(
        &BinaryContainer::from_bytes(one),
        &BinaryContainer::from_bytes(two),
    )
}

/// Split, erase, and compare two overlay blobs.
///
/// `name` feeds diagnostics for both sides; `version_one`/`version_two`
/// name the build variants being compared. Fails on a malformed overlay
/// or an unsupported relocation entry before any hash is computed.
pub fn compare_overlay_blobs(
    one: Vec<u8>,
    two: Vec<u8>,
    name: &str,
    version_one: &str,
    version_two: &str,
    erasure: &AddressErasure,
) -> Result<ComparisonResult> {
    let mut one = RomFile::parse(one, FileKind::Overlay, name)?;
    let mut two = RomFile::parse(two, FileKind::Overlay, name)?;
    one.normalize(erasure, version_one)?;
    two.normalize(erasure, version_two)?;
    Ok(one.compare_to(&two))
}

/// Get version information for this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
