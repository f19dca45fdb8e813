//! Sample-accurate voice/operator runtime and PCM generator for programs
//! built by `sau-lang` (spec.md §2, components C1, C7-C10).

pub mod constants;
pub mod dsp;
pub mod error;
pub mod generator;
pub mod memory;
pub mod mixer;
pub mod program;

pub use error::AllocError;
pub use generator::Generator;
pub use memory::{IdArr, MemoryPool};
pub use program::{OperatorData, Program, ProgramEvent, RampSpec, Use, VoiceData, WaveId};
