//! Centralized constants for the sau-engine runtime.

/// Generator default sample rate, per spec.md §6 ("default 96000").
pub const DEFAULT_SAMPLE_RATE: u32 = 96_000;

/// Internal DSP block size: all inner generation proceeds in chunks of at
/// most this many samples (spec.md §4.10 "Block size").
pub const BLOCK_SIZE: usize = 256;

/// Hard ceiling on nested modulator depth (spec.md §3 invariants).
pub const MAX_OP_NEST_DEPTH: u8 = 255;

/// Hard ceiling on voice count (spec.md §3 invariants).
pub const MAX_VOICE_COUNT: u32 = 65_535;

/// Hard ceiling on operator count (spec.md §3 invariants).
pub const MAX_OPERATOR_COUNT: u32 = (1u32 << 31) - 1;

/// Buffers needed per nesting level in the recursive modulation evaluator
/// (spec.md §4.10 "Scratch-buffer discipline"): freq, freq2, fm, pm, amp,
/// amp2, am. `Generator` no longer preallocates a static scratch-buffer
/// stack from this (see DESIGN.md); it's kept as the documented basis for
/// `generator::MAX_SUPPORTED_NEST_DEPTH`.
pub const SCRATCH_BUFFERS_PER_LEVEL: usize = 7;
