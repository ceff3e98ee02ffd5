//! Relocation table decoding and relocation-driven address erasure.
//!
//! Each relocation entry is one big-endian word: bits [31:30] name a
//! section, bits [29:24] a relocation type, bits [23:0] a byte offset
//! into that section. Resolving an entry masks the addressed word down
//! to its address-independent bits, producing a template that is
//! invariant to linker-assigned absolute addresses while preserving
//! opcode identity.

use tracing::debug;

use crate::container::BinaryContainer;
use crate::error::{CompareError, Result};
use crate::overlay::{Overlay, SectionKind};

/// A decoded relocation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    /// 2-bit section id (1 = text, 2 = data, 3 = rodata).
    pub section_id: u8,
    /// 6-bit relocation type.
    pub reloc_type: u8,
    /// 24-bit byte offset into the named section.
    pub offset: u32,
}

impl RelocationEntry {
    /// Decode a relocation word.
    pub fn decode(word: u32) -> Self {
        Self {
            section_id: ((word >> 30) & 0x3) as u8,
            reloc_type: ((word >> 24) & 0x3F) as u8,
            offset: word & 0x00FF_FFFF,
        }
    }

    /// Re-encode to the one-word wire form.
    pub fn encode(&self) -> u32 {
        (u32::from(self.section_id) << 30) | (u32::from(self.reloc_type) << 24) | self.offset
    }
}

/// Supported relocation types and the address-independent bits each
/// retains.
///
/// The masks are deliberately asymmetric: full 32-bit pointers keep only
/// the top byte, half-word relocations keep the top 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// R_MIPS_32: a full pointer; retain the top byte only.
    FullPointer,
    /// R_MIPS_26: a J/JAL target; retain the top 6 bits.
    JumpTarget,
    /// R_MIPS_HI16: upper half of a split pointer; retain bits [31:16].
    UpperHalf,
    /// R_MIPS_LO16: lower half of a split pointer; retain bits [31:16].
    LowerHalf,
}

impl RelocKind {
    /// Map a raw 6-bit relocation type, if supported.
    pub fn from_raw(reloc_type: u8) -> Option<Self> {
        match reloc_type {
            2 => Some(RelocKind::FullPointer),
            4 => Some(RelocKind::JumpTarget),
            5 => Some(RelocKind::UpperHalf),
            6 => Some(RelocKind::LowerHalf),
            _ => None,
        }
    }

    /// Bits retained by this relocation type.
    pub fn mask(self) -> u32 {
        match self {
            RelocKind::FullPointer => 0xFF00_0000,
            RelocKind::JumpTarget => 0xFC00_0000,
            RelocKind::UpperHalf | RelocKind::LowerHalf => 0xFFFF_0000,
        }
    }
}

/// Relocation table: a container plus its decoded entries.
#[derive(Debug, Clone)]
pub struct RelocSection {
    container: BinaryContainer,
    entries: Vec<RelocationEntry>,
}

impl RelocSection {
    /// Decode every word of `container` into an entry.
    pub fn from_container(container: BinaryContainer) -> Self {
        let entries = container
            .words()
            .iter()
            .map(|&w| RelocationEntry::decode(w))
            .collect();
        Self { container, entries }
    }

    /// The underlying container.
    pub fn container(&self) -> &BinaryContainer {
        &self.container
    }

    /// The decoded entries, padding included.
    pub fn entries(&self) -> &[RelocationEntry] {
        &self.entries
    }
}

/// Apply every non-zero relocation entry of `overlay`'s table, masking
/// the addressed words down to their address-independent bits.
///
/// Text-section targets are re-decoded after masking so opcode-level
/// diffing still works. `version` only feeds diagnostics. Fatal for the
/// overlay on the first unsupported or out-of-bounds entry.
pub fn resolve_overlay(overlay: &mut Overlay, version: &str) -> Result<()> {
    let entries: Vec<RelocationEntry> = overlay.reloc.entries().to_vec();
    let mut skipped = 0usize;

    for (index, entry) in entries.into_iter().enumerate() {
        if entry.encode() == 0 {
            skipped += 1;
            continue;
        }

        let section = match entry.section_id {
            1 => SectionKind::Text,
            2 => SectionKind::Data,
            3 => SectionKind::Rodata,
            _ => {
                return Err(unknown(overlay, version, index, &entry));
            }
        };
        let Some(kind) = RelocKind::from_raw(entry.reloc_type) else {
            return Err(unknown(overlay, version, index, &entry));
        };

        let word_index = (entry.offset / 4) as usize;
        let section_len = overlay.section(section).byte_len();
        if word_index >= overlay.section(section).word_count() {
            return Err(CompareError::RelocationOutOfBounds {
                version: version.to_string(),
                name: overlay.name.clone(),
                index,
                offset: entry.offset,
                section_len,
            });
        }

        match section {
            SectionKind::Text => overlay.text.mask_word(word_index, kind.mask())?,
            SectionKind::Data => mask_container_word(&mut overlay.data, word_index, kind.mask())?,
            SectionKind::Rodata => {
                mask_container_word(&mut overlay.rodata, word_index, kind.mask())?;
            }
            SectionKind::Bss => unreachable!("bss is not addressable by a 2-bit section id"),
        }
    }

    if skipped > 0 {
        debug!(
            overlay = %overlay.name,
            skipped,
            "skipped zero padding entries in relocation table"
        );
    }

    overlay.text.sync();
    overlay.data.sync_bytes_from_words();
    overlay.rodata.sync_bytes_from_words();
    Ok(())
}

fn mask_container_word(container: &mut BinaryContainer, index: usize, mask: u32) -> Result<()> {
    let masked = container.word(index)? & mask;
    container.set_word(index, masked)
}

fn unknown(
    overlay: &Overlay,
    version: &str,
    index: usize,
    entry: &RelocationEntry,
) -> CompareError {
    CompareError::UnknownRelocation {
        version: version.to_string(),
        name: overlay.name.clone(),
        index,
        section_id: entry.section_id,
        reloc_type: entry.reloc_type,
    }
}
