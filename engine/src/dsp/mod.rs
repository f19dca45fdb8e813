pub mod math;
pub mod oscillator;
pub mod ramp;
pub mod tables;

pub use math::*;
pub use oscillator::{Oscillator, Phasor};
pub use ramp::{mulbuf, Ramp};
