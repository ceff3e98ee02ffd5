//! Overlay section splitting.
//!
//! A relocatable overlay stores its section layout in a trailer-relative
//! header: the final word of the file is a "seek-up" distance from
//! end-of-file back to a 20-byte header of five big-endian words,
//! `[text_size, data_size, rodata_size, bss_size, reloc_count]`. The file
//! is sliced consecutively as text / data / rodata / bss / header /
//! relocation table, with any remaining bytes kept as an opaque tail.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::container::BinaryContainer;
use crate::error::{CompareError, Result};
use crate::mips::Instruction;
use crate::reloc::RelocSection;

/// Size of the section-table header in bytes (five words).
pub const HEADER_SIZE: usize = 20;

/// The five-word overlay header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayHeader {
    /// Byte length of the text section.
    pub text_size: u32,
    /// Byte length of the data section.
    pub data_size: u32,
    /// Byte length of the rodata section.
    pub rodata_size: u32,
    /// Byte length of the bss section.
    pub bss_size: u32,
    /// Number of one-word relocation entries.
    pub reloc_count: u32,
}

impl OverlayHeader {
    /// Read the header at `offset`, bounds-checked.
    pub fn parse(bytes: &[u8], offset: usize) -> Result<Self> {
        if offset + HEADER_SIZE > bytes.len() {
            return Err(CompareError::TruncatedData {
                offset,
                expected: HEADER_SIZE,
                actual: bytes.len().saturating_sub(offset),
            });
        }
        let at = |i: usize| BigEndian::read_u32(&bytes[offset + 4 * i..]);
        Ok(Self {
            text_size: at(0),
            data_size: at(1),
            rodata_size: at(2),
            bss_size: at(3),
            reloc_count: at(4),
        })
    }

    /// Serialize back to the five-word wire form.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for value in [
            self.text_size,
            self.data_size,
            self.rodata_size,
            self.bss_size,
            self.reloc_count,
        ] {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
}

/// The four named overlay sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Executable code.
    Text,
    /// Initialized data.
    Data,
    /// Read-only data.
    Rodata,
    /// Zero-initialized data.
    Bss,
}

impl SectionKind {
    /// Section name as used in nested comparison maps.
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Text => "text",
            SectionKind::Data => "data",
            SectionKind::Rodata => "rodata",
            SectionKind::Bss => "bss",
        }
    }
}

/// Text section: a container plus its decoded instruction sequence.
///
/// The instruction sequence is kept in lockstep with the word view; every
/// mutation goes through a method that updates both.
#[derive(Debug, Clone)]
pub struct TextSection {
    container: BinaryContainer,
    instructions: Vec<Instruction>,
}

impl TextSection {
    /// Decode every word of `container` into an instruction.
    pub fn from_container(container: BinaryContainer) -> Self {
        let instructions = container.words().iter().map(|&w| Instruction::decode(w)).collect();
        Self {
            container,
            instructions,
        }
    }

    /// The underlying container.
    pub fn container(&self) -> &BinaryContainer {
        &self.container
    }

    /// The decoded instruction sequence.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions (== word count).
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the section is empty.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Replace one instruction, re-encoding its word.
    pub fn update_instruction(&mut self, index: usize, instr: Instruction) -> Result<()> {
        self.container.set_word(index, instr.encode())?;
        self.instructions[index] = instr;
        Ok(())
    }

    /// AND a word with `mask` and re-decode the result, so opcode-level
    /// diffing still works on the masked form.
    pub fn mask_word(&mut self, index: usize, mask: u32) -> Result<()> {
        let masked = self.container.word(index)? & mask;
        self.container.set_word(index, masked)?;
        self.instructions[index] = Instruction::decode(masked);
        Ok(())
    }

    /// Drop instructions in `range`, keeping both views in lockstep.
    pub fn remove_range(&mut self, range: std::ops::Range<usize>) {
        self.instructions.drain(range.clone());
        self.container.words_mut().drain(range);
    }

    /// Shorten the section to `len` instructions.
    pub fn truncate(&mut self, len: usize) {
        self.instructions.truncate(len);
        self.container.words_mut().truncate(len);
    }

    /// Re-derive the byte view after mutation.
    pub fn sync(&mut self) {
        self.container.sync_bytes_from_words();
    }
}

/// A split overlay: typed sections, header, relocation table, and tail.
#[derive(Debug, Clone)]
pub struct Overlay {
    /// Name of the source blob, used in diagnostics.
    pub name: String,
    /// Executable code with decoded instructions.
    pub text: TextSection,
    /// Initialized data.
    pub data: BinaryContainer,
    /// Read-only data.
    pub rodata: BinaryContainer,
    /// Zero-initialized data as stored in the file.
    pub bss: BinaryContainer,
    /// The five-word section table.
    pub header: OverlayHeader,
    /// Relocation table with decoded entries.
    pub reloc: RelocSection,
    /// Bytes after the relocation table, up to end-of-file.
    pub tail: Vec<u8>,
}

impl Overlay {
    /// Split a raw overlay blob into sections.
    ///
    /// Fails with [`CompareError::BadTrailer`] or
    /// [`CompareError::SectionOverrun`] when the trailer/header are
    /// inconsistent with the file size; the caller must not attempt to
    /// proceed with such a blob.
    pub fn parse(bytes: Vec<u8>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let size = bytes.len();
        if size < HEADER_SIZE + 4 {
            return Err(CompareError::TruncatedData {
                offset: 0,
                expected: HEADER_SIZE + 4,
                actual: size,
            });
        }

        let full = BinaryContainer::from_bytes(bytes);
        let seek_up = full.word(full.word_count() - 1)?;

        let header_pos = size
            .checked_sub(seek_up as usize)
            .filter(|pos| pos % 4 == 0 && pos + HEADER_SIZE <= size)
            .ok_or(CompareError::BadTrailer {
                name: name.clone(),
                seek_up,
                size,
            })?;

        let header = OverlayHeader::parse(full.bytes(), header_pos)?;

        let text_size = header.text_size as usize;
        let data_size = header.data_size as usize;
        let rodata_size = header.rodata_size as usize;
        let bss_size = header.bss_size as usize;
        let reloc_size = 4 * header.reloc_count as usize;

        let sections_end = text_size + data_size + rodata_size + bss_size;
        let claimed = sections_end + HEADER_SIZE + reloc_size;
        if sections_end != header_pos || claimed > size {
            return Err(CompareError::SectionOverrun {
                name,
                claimed,
                header_pos,
                size,
            });
        }

        let bytes = full.bytes();
        let slice = |start: usize, len: usize| bytes[start..start + len].to_vec();

        let text = TextSection::from_container(BinaryContainer::from_bytes(slice(0, text_size)));
        let data = BinaryContainer::from_bytes(slice(text_size, data_size));
        let rodata = BinaryContainer::from_bytes(slice(text_size + data_size, rodata_size));
        let bss =
            BinaryContainer::from_bytes(slice(text_size + data_size + rodata_size, bss_size));
        let reloc = RelocSection::from_container(BinaryContainer::from_bytes(slice(
            sections_end + HEADER_SIZE,
            reloc_size,
        )));
        let tail = bytes[claimed..].to_vec();

        debug_assert_eq!(
            text_size + data_size + rodata_size + bss_size + HEADER_SIZE + reloc_size + tail.len(),
            size
        );

        Ok(Self {
            name,
            text,
            data,
            rodata,
            bss,
            header,
            reloc,
            tail,
        })
    }

    /// Container for a data-carrying section.
    pub fn section(&self, kind: SectionKind) -> &BinaryContainer {
        match kind {
            SectionKind::Text => self.text.container(),
            SectionKind::Data => &self.data,
            SectionKind::Rodata => &self.rodata,
            SectionKind::Bss => &self.bss,
        }
    }

    /// Reassemble the byte image: sections, header, relocation table, tail.
    ///
    /// Byte-identical to the parsed input until a normalization pass
    /// mutates a section; the overlay-level hash is computed over this.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.text.container().byte_len()
                + self.data.byte_len()
                + self.rodata.byte_len()
                + self.bss.byte_len()
                + HEADER_SIZE
                + self.reloc.container().byte_len()
                + self.tail.len(),
        );
        out.extend_from_slice(self.text.container().bytes());
        out.extend_from_slice(self.data.bytes());
        out.extend_from_slice(self.rodata.bytes());
        out.extend_from_slice(self.bss.bytes());
        self.header.write_to(&mut out);
        out.extend_from_slice(self.reloc.container().bytes());
        out.extend_from_slice(&self.tail);
        out
    }
}

/// How a blob should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Flat file: one container, no internal structure.
    Plain,
    /// Overlay with a trailer-relative section table.
    Overlay,
}

/// A parsed input blob: flat file or split overlay.
///
/// Closed union over the file kinds; normalize/compare/hash are selected
/// by match, keeping the kind set exhaustive.
#[derive(Debug, Clone)]
pub enum RomFile {
    /// Flat file.
    Plain(BinaryContainer),
    /// Split overlay.
    Overlay(Box<Overlay>),
}

impl RomFile {
    /// Parse a blob according to `kind`.
    pub fn parse(bytes: Vec<u8>, kind: FileKind, name: impl Into<String>) -> Result<Self> {
        match kind {
            FileKind::Plain => Ok(RomFile::Plain(BinaryContainer::from_bytes(bytes))),
            FileKind::Overlay => Ok(RomFile::Overlay(Box::new(Overlay::parse(bytes, name)?))),
        }
    }

    /// Content hash of the (possibly normalized) image.
    pub fn content_hash(&self) -> String {
        match self {
            RomFile::Plain(container) => container.content_hash(),
            RomFile::Overlay(overlay) => {
                BinaryContainer::from_bytes(overlay.to_bytes()).content_hash()
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::make_overlay_bytes;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_well_formed_overlay() {
        let bytes = make_overlay_bytes(
            &[0x3C08_8012, 0x2509_3456, 0x03E0_0008, 0x0000_0000],
            &[0x8012_AB00, 0x0000_0001],
            &[0x4049_0FDB],
            &[],
            &[0x4500_0008],
            &[],
        );
        let total = bytes.len();
        let ovl = Overlay::parse(bytes, "ovl_test").unwrap();

        assert_eq!(ovl.text.len(), 4);
        assert_eq!(ovl.data.word_count(), 2);
        assert_eq!(ovl.rodata.word_count(), 1);
        assert_eq!(ovl.bss.word_count(), 0);
        assert_eq!(ovl.header.reloc_count, 1);
        assert_eq!(ovl.tail.len(), 4); // the seek-up word itself

        // Split invariant: every slice plus tail adds back up to the file.
        let sum = ovl.text.container().byte_len()
            + ovl.data.byte_len()
            + ovl.rodata.byte_len()
            + ovl.bss.byte_len()
            + HEADER_SIZE
            + ovl.reloc.container().byte_len()
            + ovl.tail.len();
        assert_eq!(sum, total);
    }

    #[test]
    fn test_text_instructions_in_lockstep() {
        let bytes = make_overlay_bytes(&[0x3C08_8012, 0x0000_0000], &[], &[], &[], &[], &[]);
        let ovl = Overlay::parse(bytes, "ovl_test").unwrap();
        assert_eq!(ovl.text.instructions()[0].mnemonic(), "lui");
        assert!(ovl.text.instructions()[1].is_nop());
    }

    #[test]
    fn test_to_bytes_round_trips() {
        let bytes = make_overlay_bytes(
            &[0x0C00_0400, 0x0000_0000],
            &[0xDEAD_BEEF],
            &[],
            &[],
            &[0x8200_0000],
            &[],
        );
        let ovl = Overlay::parse(bytes.clone(), "ovl_test").unwrap();
        assert_eq!(ovl.to_bytes(), bytes);
    }

    #[test]
    fn test_seek_up_past_start_is_rejected() {
        let mut bytes = make_overlay_bytes(&[0x0000_0000], &[], &[], &[], &[], &[]);
        let n = bytes.len();
        bytes[n - 4..].copy_from_slice(&0xFFFF_FFF0u32.to_be_bytes());
        assert!(matches!(
            Overlay::parse(bytes, "ovl_bad"),
            Err(CompareError::BadTrailer { .. })
        ));
    }

    #[test]
    fn test_oversized_sections_are_rejected() {
        let mut bytes = make_overlay_bytes(&[0x0000_0000], &[], &[], &[], &[], &[]);
        // Inflate text_size in the header; slices no longer sum to the file.
        let header_pos = bytes.len() - 4 - HEADER_SIZE;
        bytes[header_pos..header_pos + 4].copy_from_slice(&0x1000u32.to_be_bytes());
        assert!(matches!(
            Overlay::parse(bytes, "ovl_bad"),
            Err(CompareError::SectionOverrun { .. })
        ));
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        assert!(matches!(
            Overlay::parse(vec![0u8; 8], "ovl_tiny"),
            Err(CompareError::TruncatedData { .. })
        ));
    }

    #[test]
    fn test_section_names() {
        assert_eq!(SectionKind::Text.name(), "text");
        assert_eq!(SectionKind::Rodata.name(), "rodata");
    }

    #[test]
    fn test_romfile_hash_matches_container_hash() {
        let blob = vec![0x80, 0x12, 0x34, 0x56];
        let plain = RomFile::parse(blob.clone(), FileKind::Plain, "object").unwrap();
        assert_eq!(
            plain.content_hash(),
            BinaryContainer::from_bytes(blob).content_hash()
        );

        let bytes = make_overlay_bytes(&[0x0062_1821], &[], &[], &[], &[], &[]);
        let ovl = RomFile::parse(bytes.clone(), FileKind::Overlay, "ovl_test").unwrap();
        assert_eq!(
            ovl.content_hash(),
            BinaryContainer::from_bytes(bytes).content_hash()
        );
    }

    #[test]
    fn test_update_instruction_keeps_lockstep() {
        let bytes = make_overlay_bytes(&[0x3C08_8012], &[], &[], &[], &[], &[]);
        let mut ovl = Overlay::parse(bytes, "ovl_test").unwrap();
        let mut instr = ovl.text.instructions()[0];
        instr.blank_out();
        ovl.text.update_instruction(0, instr).unwrap();
        assert_eq!(ovl.text.container().word(0).unwrap(), 0);
        assert!(ovl.text.instructions()[0].is_nop());
    }
}
