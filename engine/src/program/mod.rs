pub mod types;

pub use types::{
    mode_flags, param_mask, time_flags, OperatorData, Program, ProgramEvent, RampShape, RampSpec,
    TimeSpec, Use, VoiceData, VoiceGraph, VoiceGraphRef, WaveId,
};
