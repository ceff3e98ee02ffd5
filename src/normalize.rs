//! Heuristic address erasure for overlays without a trusted relocation
//! table.
//!
//! Compilers materialize a 32-bit address as a LUI/consumer pair: LUI
//! loads the upper half into a register, and a nearby ADDIU/load/ORI
//! consumes that register to supply the lower half. Both halves are
//! linker-assigned, so the pair is erased as a unit. Absolute jump
//! targets and data words carrying segment-marked addresses are erased
//! independently. The whole pass is idempotent.

use bitflags::bitflags;
use tracing::debug;

use crate::container::BinaryContainer;
use crate::error::Result;
use crate::mips::{opcode, InstrKind, Instruction};
use crate::overlay::{Overlay, TextSection};

/// Top byte marking a RAM-segment address in data words.
pub const RAM_SEGMENT_MARKER: u8 = 0x80;

/// Default LUI tracking window, in instructions.
pub const DEFAULT_LUI_WINDOW: u8 = 8;

bitflags! {
    /// Selects which erasure passes run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NormalizePasses: u8 {
        /// Erase LUI/consumer split-pointer pairs in text.
        const LUI_PAIRS = 1 << 0;
        /// Clear the 26-bit target of J/JAL instructions.
        const JUMP_TARGETS = 1 << 1;
        /// Remove trailing all-NOP padding from text.
        const TRIM_NOPS = 1 << 2;
        /// Collapse segment-marked data/rodata words to their marker byte.
        const DATA_SEGMENTS = 1 << 3;
        /// Delete functions calling the configured wrapper target.
        const STRIP_WRAPPERS = 1 << 4;
    }
}

/// Configuration for the heuristic normalizer.
///
/// The wrapper call target is per build version and supplied by the
/// caller at call time.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// LUI tracking window (ttl), in instructions.
    pub lui_window: u8,
    /// Which passes run.
    pub passes: NormalizePasses,
    /// 26-bit jump index of a known wrapper callee to strip, if any.
    pub wrapper_call_target: Option<u32>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            lui_window: DEFAULT_LUI_WINDOW,
            passes: NormalizePasses::LUI_PAIRS
                | NormalizePasses::JUMP_TARGETS
                | NormalizePasses::TRIM_NOPS
                | NormalizePasses::DATA_SEGMENTS,
            wrapper_call_target: None,
        }
    }
}

/// How an overlay's addresses are erased before comparison.
#[derive(Debug, Clone)]
pub enum AddressErasure {
    /// Leave addresses in place.
    None,
    /// Apply the relocation table (see [`crate::reloc::resolve_overlay`]).
    Relocations,
    /// Run the heuristic normalizer with the given configuration.
    Heuristic(NormalizerConfig),
}

/// Register tracker for the LUI-pairing scan.
///
/// `Idle --LUI--> Tracking`; `Tracking --consumer with matching base-->
/// Idle` (yielding the tracked LUI's position so the pair can be
/// erased); `Tracking --ttl exhausted--> Idle`. A new LUI always
/// re-tracks. Any live tracking at end of stream is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuiTracker {
    /// No LUI under watch.
    Idle,
    /// Watching the destination register of the LUI at `position`.
    Tracking {
        /// Destination register of the tracked LUI.
        register: u8,
        /// Instruction index of the tracked LUI.
        position: usize,
        /// Instructions left before tracking is dropped.
        ttl: u8,
    },
}

impl LuiTracker {
    /// Advance over one instruction. Returns the next state and, on a
    /// pair match, the tracked LUI's position.
    pub fn step(self, index: usize, instr: &Instruction, window: u8) -> (Self, Option<usize>) {
        if instr.is_load_upper() {
            // A new LUI replaces whatever was tracked.
            return (
                LuiTracker::Tracking {
                    register: instr.rt,
                    position: index,
                    ttl: window,
                },
                None,
            );
        }
        match self {
            LuiTracker::Idle => (LuiTracker::Idle, None),
            LuiTracker::Tracking {
                register,
                position,
                ttl,
            } => {
                if instr.is_address_forming() && instr.base_register() == register {
                    return (LuiTracker::Idle, Some(position));
                }
                if ttl <= 1 {
                    (LuiTracker::Idle, None)
                } else {
                    (
                        LuiTracker::Tracking {
                            register,
                            position,
                            ttl: ttl - 1,
                        },
                        None,
                    )
                }
            }
        }
    }
}

/// Run the configured text passes over a text section.
pub fn normalize_text(text: &mut TextSection, config: &NormalizerConfig) -> Result<()> {
    if config.passes.contains(NormalizePasses::LUI_PAIRS) {
        erase_lui_pairs(text, config.lui_window)?;
    }
    if config.passes.contains(NormalizePasses::STRIP_WRAPPERS) {
        if let Some(target) = config.wrapper_call_target {
            let stripped = strip_wrapper_functions(text, target);
            if stripped > 0 {
                debug!(stripped, target, "stripped wrapper functions");
            }
        }
    }
    if config.passes.contains(NormalizePasses::JUMP_TARGETS) {
        clear_jump_targets(text)?;
    }
    if config.passes.contains(NormalizePasses::TRIM_NOPS) {
        trim_trailing_nops(text);
    }
    text.sync();
    Ok(())
}

/// Erase address-carrying words in a data or rodata section: a word
/// whose top byte is the RAM-segment marker, or whose top byte has a
/// zero high nibble and non-zero low nibble (ROM/virtual-address
/// class), collapses to its marker byte.
pub fn normalize_data_words(container: &mut BinaryContainer) {
    for word in container.words_mut().iter_mut() {
        let top = (*word >> 24) as u8;
        if top == RAM_SEGMENT_MARKER || (top >> 4 == 0 && top & 0x0F != 0) {
            *word = u32::from(top) << 24;
        }
    }
    container.sync_bytes_from_words();
}

/// Run the heuristic normalizer over every section of an overlay.
pub fn normalize_overlay(overlay: &mut Overlay, config: &NormalizerConfig) -> Result<()> {
    normalize_text(&mut overlay.text, config)?;
    if config.passes.contains(NormalizePasses::DATA_SEGMENTS) {
        normalize_data_words(&mut overlay.data);
        normalize_data_words(&mut overlay.rodata);
    }
    Ok(())
}

impl crate::overlay::RomFile {
    /// Apply the selected address erasure in place.
    ///
    /// Plain files carry no section structure and are compared raw (the
    /// diff engine's symmetric blanking is their erasure path); only
    /// overlays are touched. `version` feeds relocation diagnostics.
    pub fn normalize(&mut self, erasure: &AddressErasure, version: &str) -> Result<()> {
        match self {
            crate::overlay::RomFile::Plain(_) => Ok(()),
            crate::overlay::RomFile::Overlay(overlay) => match erasure {
                AddressErasure::None => Ok(()),
                AddressErasure::Relocations => crate::reloc::resolve_overlay(overlay, version),
                AddressErasure::Heuristic(config) => normalize_overlay(overlay, config),
            },
        }
    }
}

fn erase_lui_pairs(text: &mut TextSection, window: u8) -> Result<()> {
    let mut state = LuiTracker::Idle;
    for index in 0..text.len() {
        let instr = text.instructions()[index];
        let (next, matched) = state.step(index, &instr, window);
        state = next;
        if let Some(lui_position) = matched {
            // The pair encoded a single split pointer; erase it as a unit.
            for position in [lui_position, index] {
                let mut blanked = text.instructions()[position];
                blanked.blank_out();
                text.update_instruction(position, blanked)?;
            }
        }
    }
    Ok(())
}

fn clear_jump_targets(text: &mut TextSection) -> Result<()> {
    for index in 0..text.len() {
        let mut instr = text.instructions()[index];
        if instr.is_jump_absolute() {
            instr.clear_jump_target();
            text.update_instruction(index, instr)?;
        }
    }
    Ok(())
}

fn trim_trailing_nops(text: &mut TextSection) {
    let keep = text
        .instructions()
        .iter()
        .rposition(|instr| !instr.is_nop())
        .map_or(0, |last| last + 1);
    text.truncate(keep);
}

/// Delete every function (delimited by `jr $ra` plus its delay slot)
/// containing a JAL to `target`. Returns the number of functions
/// removed.
fn strip_wrapper_functions(text: &mut TextSection, target: u32) -> usize {
    let mut ranges = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;
    let len = text.len();
    while index < len {
        if text.instructions()[index].is_return() {
            let end = (index + 2).min(len); // epilogue + delay slot
            let calls_target = text.instructions()[start..end].iter().any(|instr| {
                instr.kind == InstrKind::Normal
                    && instr.opcode == opcode::JAL
                    && instr.jump_target() == target
            });
            if calls_target {
                ranges.push(start..end);
            }
            start = end;
            index = end;
        } else {
            index += 1;
        }
    }
    let removed = ranges.len();
    for range in ranges.into_iter().rev() {
        text.remove_range(range);
    }
    removed
}
