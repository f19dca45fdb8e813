//! The built program's data model (spec.md §3 "Program (built)").
//!
//! This is the protocol boundary between `sau-lang`'s program builder (C6)
//! and this crate's generator (C10) — the equivalent of the teacher's
//! `bubo_engine::types::EngineMessage` wire format that `sova_core` builds
//! and `bubo_engine::engine::AudioEngine` consumes.

use std::rc::Rc;

use crate::memory::IdArr;

/// Oscillator waveform selection (spec.md §6 "Wave and ramp names").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WaveId {
    Sin,
    Tri,
    Sqr,
    Saw,
    Ahs,
    Hrs,
    Srs,
    Szh,
    Shh,
    Ssr,
    Noise,
}

impl WaveId {
    pub const ALL: [WaveId; 11] = [
        WaveId::Sin,
        WaveId::Tri,
        WaveId::Sqr,
        WaveId::Saw,
        WaveId::Ahs,
        WaveId::Hrs,
        WaveId::Srs,
        WaveId::Szh,
        WaveId::Shh,
        WaveId::Ssr,
        WaveId::Noise,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WaveId::Sin => "sin",
            WaveId::Tri => "tri",
            WaveId::Sqr => "sqr",
            WaveId::Saw => "saw",
            WaveId::Ahs => "ahs",
            WaveId::Hrs => "hrs",
            WaveId::Srs => "srs",
            WaveId::Szh => "szh",
            WaveId::Shh => "shh",
            WaveId::Ssr => "ssr",
            WaveId::Noise => "noise",
        }
    }

    pub fn from_name(name: &str) -> Option<WaveId> {
        WaveId::ALL.into_iter().find(|w| w.name() == name)
    }
}

impl Default for WaveId {
    fn default() -> Self {
        WaveId::Sin
    }
}

/// Ramp fill curve (spec.md §4.7 "Fill curves").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RampShape {
    Hold,
    Lin,
    Sin,
    Exp,
    Log,
    Xpe,
    Lge,
}

impl RampShape {
    pub const ALL: [RampShape; 7] = [
        RampShape::Hold,
        RampShape::Lin,
        RampShape::Sin,
        RampShape::Exp,
        RampShape::Log,
        RampShape::Xpe,
        RampShape::Lge,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RampShape::Hold => "hold",
            RampShape::Lin => "lin",
            RampShape::Sin => "sin",
            RampShape::Exp => "exp",
            RampShape::Log => "log",
            RampShape::Xpe => "xpe",
            RampShape::Lge => "lge",
        }
    }

    pub fn from_name(name: &str) -> Option<RampShape> {
        RampShape::ALL.into_iter().find(|r| r.name() == name)
    }
}

impl Default for RampShape {
    fn default() -> Self {
        RampShape::Lin
    }
}

/// Role an operator plays when reached through a modulator edge or a voice's
/// carrier list (spec.md §3 "VoiceGraph reference list").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Use {
    Carr,
    Fm,
    Pm,
    Am,
}

/// Bits of `TimeSpec::flags` (spec.md §3 "ParseOperator ... time (value +
/// flags {SET, IMPLICIT, DEFAULT})").
pub mod time_flags {
    pub const SET: u8 = 1 << 0;
    pub const IMPLICIT: u8 = 1 << 1;
    pub const DEFAULT: u8 = 1 << 2;
}

/// A time-in-milliseconds value together with the flags tracking how it was
/// derived.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSpec {
    pub ms: u32,
    pub flags: u8,
}

impl TimeSpec {
    pub fn new(ms: u32) -> TimeSpec {
        TimeSpec {
            ms,
            flags: time_flags::SET,
        }
    }

    pub fn is_set(&self) -> bool {
        self.flags & time_flags::SET != 0
    }

    pub fn is_implicit(&self) -> bool {
        self.flags & time_flags::IMPLICIT != 0
    }

    pub fn is_default(&self) -> bool {
        self.flags & time_flags::DEFAULT != 0
    }
}

/// A scalar ramp's program-level parameters: start value, optional goal,
/// optional explicit duration, fill curve, and whether the value is a ratio
/// of some parent signal (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RampSpec {
    pub value: f64,
    pub goal: Option<f64>,
    pub time_ms: Option<u32>,
    pub shape: RampShape,
    pub ratio: bool,
}

impl RampSpec {
    pub fn constant(value: f64) -> RampSpec {
        RampSpec {
            value,
            goal: None,
            time_ms: None,
            shape: RampShape::default(),
            ratio: false,
        }
    }
}

/// Bits of `OperatorData::changed` (spec.md §3 "a bitmask of which
/// parameters changed at this event").
pub mod param_mask {
    pub const WAVE: u32 = 1 << 0;
    pub const TIME: u32 = 1 << 1;
    pub const SILENCE: u32 = 1 << 2;
    pub const FREQ: u32 = 1 << 3;
    pub const FREQ2: u32 = 1 << 4;
    pub const AMP: u32 = 1 << 5;
    pub const AMP2: u32 = 1 << 6;
    pub const PHASE: u32 = 1 << 7;
    pub const FMODS: u32 = 1 << 8;
    pub const PMODS: u32 = 1 << 9;
    pub const AMODS: u32 = 1 << 10;
}

/// One operator's published state change at a given event (spec.md §3
/// "OperatorData").
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperatorData {
    pub id: u32,
    pub changed: u32,
    pub time: TimeSpec,
    pub silence_ms: u32,
    pub wave: WaveId,
    pub freq: RampSpec,
    pub freq2: RampSpec,
    pub amp: RampSpec,
    pub amp2: RampSpec,
    pub phase: f32,
    pub fmods: IdArr,
    pub pmods: IdArr,
    pub amods: IdArr,
}

impl OperatorData {
    pub fn changed(&self, mask: u32) -> bool {
        self.changed & mask != 0
    }
}

/// A voice's published panning ramp and carrier list at a given event
/// (spec.md §3 "VoiceData").
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoiceData {
    pub pan: RampSpec,
    pub carriers: IdArr,
}

/// One entry of a voice's depth-first, modulator-before-carrier traversal
/// order (spec.md §3 "VoiceGraph reference list").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoiceGraphRef {
    pub op_id: u32,
    pub use_: Use,
    pub depth: u8,
}

/// A shared, immutable voice-graph traversal order. Rebuilt (and
/// re-published) only by the event that changes a voice's carrier/modulator
/// topology; inherited by reference otherwise, just like `IdArr`.
pub type VoiceGraph = Rc<[VoiceGraphRef]>;

/// One delta-encoded step of the program (spec.md §3 "ProgramEvent").
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgramEvent {
    pub wait_ms: u32,
    pub voice_id: u32,
    pub voice_data: Option<VoiceData>,
    pub operators: Vec<OperatorData>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub voice_graph: Option<VoiceGraph>,
}

/// Bits of `Program::mode` (spec.md §3 "Amplitude scaling").
pub mod mode_flags {
    pub const AMP_DIV_VOICES: u8 = 1 << 0;
}

/// The fully built, immutable program a `Generator` is constructed from
/// (spec.md §3 "Program (built)" and §4.6 "Output").
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    pub events: Vec<ProgramEvent>,
    pub voice_count: u32,
    pub operator_count: u32,
    pub op_nest_depth: u8,
    pub duration_ms: u64,
    pub mode: u8,
    pub name: String,
}

impl Program {
    pub fn amp_div_voices(&self) -> bool {
        self.mode & mode_flags::AMP_DIV_VOICES != 0
    }
}
