//! Hashing-based comparison of containers, text sections, and overlays.
//!
//! Equality is decided by content hash; unequal inputs additionally get
//! byte/word difference counts over the shorter input, opcode-level
//! counts for text, and a nested per-section map for overlays.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::container::BinaryContainer;
use crate::overlay::{Overlay, RomFile, TextSection};

/// Outcome of comparing two byte blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Whether the content hashes matched.
    pub equal: bool,
    /// Content hash of the first input.
    pub hash_one: String,
    /// Content hash of the second input.
    pub hash_two: String,
    /// Byte length of the first input.
    pub size_one: usize,
    /// Byte length of the second input.
    pub size_two: usize,
    /// Differing byte positions over the shorter input.
    pub diff_bytes: usize,
    /// Differing word positions over the shorter input.
    pub diff_words: usize,
    /// Opcode-level counts; present for text sections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opcodes: Option<OpcodeDiff>,
    /// Per-section results; present for overlay comparisons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ovl: Option<Box<SectionComparisons>>,
}

/// Instruction-level difference counts for a text section.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OpcodeDiff {
    /// Aligned instructions whose mnemonic class differs.
    pub diff_opcodes: usize,
    /// Aligned instructions with the same mnemonic but a different
    /// full encoding.
    pub same_opcode_different_args: usize,
}

/// Nested comparison results for the named overlay sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionComparisons {
    /// Text section result, including opcode counts.
    pub text: ComparisonResult,
    /// Data section result.
    pub data: ComparisonResult,
    /// Rodata section result.
    pub rodata: ComparisonResult,
    /// Bss section result.
    pub bss: ComparisonResult,
    /// Relocation table result.
    pub reloc: ComparisonResult,
}

/// Top bytes whose words may be blanked symmetrically before hashing.
#[derive(Debug, Clone, Default)]
pub struct IgnoreClasses(BTreeSet<u8>);

impl IgnoreClasses {
    /// Empty set: nothing is ignorable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ignorable top byte (e.g. a RAM segment or mapped-I/O
    /// marker).
    pub fn with(mut self, top_byte: u8) -> Self {
        self.0.insert(top_byte);
        self
    }

    /// Whether `top_byte` is ignorable.
    pub fn contains(&self, top_byte: u8) -> bool {
        self.0.contains(&top_byte)
    }
}

impl FromIterator<u8> for IgnoreClasses {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn count_diffs<T: PartialEq>(one: &[T], two: &[T]) -> usize {
    one.iter().zip(two).filter(|(a, b)| a != b).count()
}

/// Compare two containers by hash, counting differences when unequal.
pub fn compare_containers(one: &BinaryContainer, two: &BinaryContainer) -> ComparisonResult {
    let hash_one = one.content_hash();
    let hash_two = two.content_hash();
    let equal = hash_one == hash_two;
    let mut result = ComparisonResult {
        equal,
        hash_one,
        hash_two,
        size_one: one.byte_len(),
        size_two: two.byte_len(),
        diff_bytes: 0,
        diff_words: 0,
        opcodes: None,
        ovl: None,
    };
    if !equal {
        result.diff_bytes = count_diffs(one.bytes(), two.bytes());
        result.diff_words = count_diffs(one.words(), two.words());
    }
    result
}

/// Compare two text sections, adding instruction-level counts.
pub fn compare_text(one: &TextSection, two: &TextSection) -> ComparisonResult {
    let mut result = compare_containers(one.container(), two.container());
    let mut opcodes = OpcodeDiff::default();
    if !result.equal {
        for (a, b) in one.instructions().iter().zip(two.instructions()) {
            if !a.same_mnemonic(b) {
                opcodes.diff_opcodes += 1;
            } else if a.encode() != b.encode() {
                opcodes.same_opcode_different_args += 1;
            }
        }
    }
    result.opcodes = Some(opcodes);
    result
}

/// Compare two overlays: a top-level result over the reassembled
/// images, plus nested per-section results.
pub fn compare_overlays(one: &Overlay, two: &Overlay) -> ComparisonResult {
    let image_one = BinaryContainer::from_bytes(one.to_bytes());
    let image_two = BinaryContainer::from_bytes(two.to_bytes());
    let mut result = compare_containers(&image_one, &image_two);
    result.ovl = Some(Box::new(SectionComparisons {
        text: compare_text(&one.text, &two.text),
        data: compare_containers(&one.data, &two.data),
        rodata: compare_containers(&one.rodata, &two.rodata),
        bss: compare_containers(&one.bss, &two.bss),
        reloc: compare_containers(one.reloc.container(), two.reloc.container()),
    }));
    result
}

/// Compare two parsed files. Section nesting only applies when both
/// sides are overlays; a mixed pair degrades to a whole-image compare.
pub fn compare_files(one: &RomFile, two: &RomFile) -> ComparisonResult {
    match (one, two) {
        (RomFile::Plain(a), RomFile::Plain(b)) => compare_containers(a, b),
        (RomFile::Overlay(a), RomFile::Overlay(b)) => compare_overlays(a, b),
        _ => compare_containers(
            &BinaryContainer::from_bytes(match one {
                RomFile::Plain(c) => c.bytes().to_vec(),
                RomFile::Overlay(o) => o.to_bytes(),
            }),
            &BinaryContainer::from_bytes(match two {
                RomFile::Plain(c) => c.bytes().to_vec(),
                RomFile::Overlay(o) => o.to_bytes(),
            }),
        ),
    }
}

impl RomFile {
    /// Compare against another parsed file.
    pub fn compare_to(&self, other: &RomFile) -> ComparisonResult {
        compare_files(self, other)
    }
}

/// Symmetrically blank words whose top bytes agree on an ignorable
/// class, collapsing both copies to the bare marker before any hashing.
///
/// Positions where the two words do not already agree on the ignorable
/// top byte are left untouched in both copies, so asymmetric mismatches
/// stay visible.
pub fn blank_out_differences(
    one: &mut BinaryContainer,
    two: &mut BinaryContainer,
    ignore: &IgnoreClasses,
) {
    let count = one.word_count().min(two.word_count());
    for index in 0..count {
        let a = one.words()[index];
        let b = two.words()[index];
        let top = (a >> 24) as u8;
        if top == (b >> 24) as u8 && ignore.contains(top) {
            let collapsed = u32::from(top) << 24;
            one.words_mut()[index] = collapsed;
            two.words_mut()[index] = collapsed;
        }
    }
    one.sync_bytes_from_words();
    two.sync_bytes_from_words();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::test_support::make_overlay_bytes;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reflexivity() {
        let a = BinaryContainer::from_words(vec![1, 2, 3, 4]);
        let result = compare_containers(&a, &a.clone());
        assert!(result.equal);
        assert_eq!(result.diff_bytes, 0);
        assert_eq!(result.diff_words, 0);
        assert_eq!(result.hash_one, result.hash_two);
    }

    #[test]
    fn test_diff_counts_over_shorter_input() {
        let a = BinaryContainer::from_words(vec![0x1111_1111, 0x2222_2222, 0x3333_3333]);
        let b = BinaryContainer::from_words(vec![0x1111_1111, 0x2222_FFFF]);
        let result = compare_containers(&a, &b);
        assert!(!result.equal);
        assert_eq!(result.size_one, 12);
        assert_eq!(result.size_two, 8);
        assert_eq!(result.diff_words, 1);
        assert_eq!(result.diff_bytes, 2);
    }

    #[test]
    fn test_text_opcode_counts() {
        let one = TextSection::from_container(BinaryContainer::from_words(vec![
            0x2509_3456, // addiu $t1, $t0, 0x3456
            0x8D09_0010, // lw
            0x0062_1821, // addu
        ]));
        let two = TextSection::from_container(BinaryContainer::from_words(vec![
            0x2509_1234, // addiu, same mnemonic, other immediate
            0xAD09_0010, // sw: different mnemonic
            0x0062_1821, // addu, identical
        ]));
        let result = compare_text(&one, &two);
        let opcodes = result.opcodes.unwrap();
        assert_eq!(opcodes.diff_opcodes, 1);
        assert_eq!(opcodes.same_opcode_different_args, 1);
    }

    #[test]
    fn test_overlay_nesting() {
        let one = make_overlay_bytes(
            &[0x0062_1821, 0x03E0_0008],
            &[0x0000_0001, 0x0000_0002],
            &[],
            &[],
            &[],
            &[],
        );
        let two = make_overlay_bytes(
            &[0x0062_1821, 0x03E0_0008],
            &[0x0000_0001, 0x0000_00FF],
            &[],
            &[],
            &[],
            &[],
        );
        let a = Overlay::parse(one, "ovl_a").unwrap();
        let b = Overlay::parse(two, "ovl_b").unwrap();
        let result = compare_overlays(&a, &b);

        assert!(!result.equal);
        let sections = result.ovl.as_ref().unwrap();
        assert!(sections.text.equal);
        assert!(!sections.data.equal);
        assert_eq!(sections.data.diff_words, 1);
        assert!(sections.rodata.equal);
        assert!(sections.reloc.equal);
    }

    #[test]
    fn test_result_serializes_as_section_map() {
        let bytes = make_overlay_bytes(&[0x0062_1821], &[1], &[], &[], &[], &[]);
        let a = Overlay::parse(bytes.clone(), "ovl_a").unwrap();
        let b = Overlay::parse(bytes, "ovl_b").unwrap();
        let value = serde_json::to_value(compare_overlays(&a, &b)).unwrap();
        assert_eq!(value["equal"], serde_json::json!(true));
        assert_eq!(value["ovl"]["text"]["equal"], serde_json::json!(true));
        assert_eq!(value["ovl"]["data"]["diff_words"], serde_json::json!(0));
    }

    #[test]
    fn test_blanking_symmetry() {
        let mut a = BinaryContainer::from_words(vec![
            0x8012_3456, // agrees on 0x80 with b
            0x8044_0000, // top bytes disagree
            0x1234_5678, // not ignorable
        ]);
        let mut b = BinaryContainer::from_words(vec![
            0x80FF_FFFF,
            0x7F44_0000,
            0x1234_5678,
        ]);
        let ignore = IgnoreClasses::new().with(0x80);
        blank_out_differences(&mut a, &mut b, &ignore);

        assert_eq!(a.words()[0], 0x8000_0000);
        assert_eq!(b.words()[0], 0x8000_0000);
        // Asymmetric mismatch stays visible.
        assert_eq!(a.words()[1], 0x8044_0000);
        assert_eq!(b.words()[1], 0x7F44_0000);
        assert_eq!(a.words()[2], 0x1234_5678);

        let result = compare_containers(&a, &b);
        assert!(!result.equal);
        assert_eq!(result.diff_words, 1);
    }

    #[test]
    fn test_blanking_makes_address_noise_hash_away() {
        let mut a = BinaryContainer::from_words(vec![0x8012_3456, 7]);
        let mut b = BinaryContainer::from_words(vec![0x80AB_CDEF, 7]);
        let ignore = IgnoreClasses::new().with(0x80);
        blank_out_differences(&mut a, &mut b, &ignore);
        assert!(compare_containers(&a, &b).equal);
    }
}
