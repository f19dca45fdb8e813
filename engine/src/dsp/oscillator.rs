//! Phase accumulator and band-limited oscillator (spec.md §4.8 "Oscillator").

use crate::dsp::math::{freq_to_pinc, phase_coeff, wrap_phase};
use crate::dsp::tables::{wave_table, TABLE_SIZE};
use crate::program::WaveId;

/// A free-running 32-bit wrapping phase accumulator.
///
/// Phase is represented as a `u32` that wraps naturally on overflow, giving
/// exact, platform-independent wraparound (spec.md §4.8 "coeff = 2^32 /
/// srate"; §8 determinism).
#[derive(Debug, Clone, Copy, Default)]
pub struct Phasor {
    phase: u32,
}

impl Phasor {
    pub fn new(initial_phase: f32) -> Phasor {
        Phasor {
            phase: (wrap_phase(initial_phase) as f64 * (1u64 << 32) as f64) as u32,
        }
    }

    #[inline]
    pub fn phase_unit(self) -> f32 {
        self.phase as f64 as f32 / (1u64 << 32) as f32
    }

    #[inline]
    pub fn advance(&mut self, pinc: u32) -> u32 {
        let before = self.phase;
        self.phase = self.phase.wrapping_add(pinc);
        before
    }
}

/// A splitmix64-style hash used by the `noise` wave so its output is a pure
/// function of the phase accumulator, not an RNG (spec.md §8 determinism:
/// "same program + same sample rate => bit-identical output on every
/// generator/run"; §9 "noise ... extension point").
#[inline]
fn splitmix_noise(phase: u32) -> f32 {
    let mut z = phase as u64 ^ 0x9E3779B97F4A7C15;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^= z >> 31;
    // top 24 bits -> [-1.0, 1.0)
    let bits = (z >> 40) as u32 & 0x00FF_FFFF;
    (bits as f32 / 0x0080_0000 as f32) - 1.0
}

/// A band-limited, phase-accumulator-driven oscillator for one wave shape.
#[derive(Debug, Clone, Copy)]
pub struct Oscillator {
    wave: WaveId,
    phasor: Phasor,
    /// Table position (in table-index units) at which the previous PILUT
    /// differentiation ended; seeded one table length behind on reset so
    /// the first sample is well-defined even at 0 Hz (spec.md §4.8).
    prev_table_pos: f64,
    prev_integral: f64,
    prev_output: f32,
}

impl Oscillator {
    pub fn new(wave: WaveId, initial_phase: f32) -> Oscillator {
        let phasor = Phasor::new(initial_phase);
        let table_pos = phasor.phase_unit() as f64 * TABLE_SIZE as f64;
        let prev_table_pos = table_pos - TABLE_SIZE as f64;
        let prev_integral = wave_table(wave)
            .map(|t| t.integral_at(prev_table_pos))
            .unwrap_or(0.0);
        Oscillator {
            wave,
            phasor,
            prev_table_pos,
            prev_integral,
            prev_output: 0.0,
        }
    }

    pub fn set_wave(&mut self, wave: WaveId) {
        self.wave = wave;
    }

    /// Resets the phase accumulator and PILUT history to `phase` (spec.md
    /// §3 "phase (normalized [0,1))"), as when a `ProgramEvent` republishes
    /// an operator's `PHASE` parameter.
    pub fn set_phase(&mut self, phase: f32) {
        *self = Oscillator::new(self.wave, phase);
    }

    /// Renders `out.len()` samples at per-sample frequencies `freq_hz`,
    /// using the PILUT (differentiated-integral) path for every wave except
    /// `noise`, which has no table and is sampled directly from the phase.
    pub fn run(&mut self, out: &mut [f32], freq_hz: &[f32], sample_rate: u32) {
        self.run_modulated(out, freq_hz, None, sample_rate);
    }

    /// As [`Oscillator::run`], but adds `phase_offset` (normalized turns, PM
    /// depth) to the lookup position before each sample without disturbing
    /// the free-running phase accumulator itself (spec.md §4.8 "pofs", C10
    /// step 5 "pmods").
    pub fn run_modulated(
        &mut self,
        out: &mut [f32],
        freq_hz: &[f32],
        phase_offset: Option<&[f32]>,
        sample_rate: u32,
    ) {
        debug_assert_eq!(out.len(), freq_hz.len());
        let coeff = phase_coeff(sample_rate);

        if self.wave == WaveId::Noise {
            for (slot, &f) in out.iter_mut().zip(freq_hz.iter()) {
                let pinc = freq_to_pinc(f as f64, coeff);
                let before = self.phasor.advance(pinc);
                *slot = splitmix_noise(before);
            }
            return;
        }

        let table = wave_table(self.wave).expect("non-noise wave always has a table");

        for (i, (slot, &f)) in out.iter_mut().zip(freq_hz.iter()).enumerate() {
            let pinc = freq_to_pinc(f as f64, coeff);
            self.phasor.advance(pinc);
            let pofs = phase_offset.map(|p| p[i] as f64).unwrap_or(0.0);
            let table_pos = (self.phasor.phase_unit() as f64 + pofs) * TABLE_SIZE as f64;

            let delta = table_pos - self.prev_table_pos;
            let output = if delta.abs() < 1e-9 {
                self.prev_output
            } else {
                let integral = table.integral_at(table_pos);
                ((integral - self.prev_integral) / delta) as f32
            };

            *slot = output;
            self.prev_output = output;
            self.prev_table_pos = table_pos;
            self.prev_integral = table.integral_at(table_pos);
        }
    }

    /// Naive (non-band-limited) linear-interpolated lookup, used when the
    /// caller has already determined band-limiting is unnecessary (spec.md
    /// §4.8 "Naive LUT" path — reserved for low/DC-rate modulators).
    pub fn run_naive(&mut self, out: &mut [f32], freq_hz: &[f32], sample_rate: u32) {
        debug_assert_eq!(out.len(), freq_hz.len());
        let coeff = phase_coeff(sample_rate);

        if self.wave == WaveId::Noise {
            self.run(out, freq_hz, sample_rate);
            return;
        }

        let table = wave_table(self.wave).expect("non-noise wave always has a table");
        for (slot, &f) in out.iter_mut().zip(freq_hz.iter()) {
            let pinc = freq_to_pinc(f as f64, coeff);
            self.phasor.advance(pinc);
            *slot = table.naive_lookup(self.phasor.phase_unit());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_oscillator_settles_to_expected_amplitude() {
        let mut osc = Oscillator::new(WaveId::Sin, 0.0);
        let freq = [440.0f32; 4096];
        let mut out = [0.0f32; 4096];
        osc.run(&mut out, &freq, 48_000);
        let peak = out.iter().cloned().fold(0.0f32, f32::max);
        assert!(peak > 0.8 && peak < 1.2);
    }

    #[test]
    fn noise_is_deterministic_given_same_phase_sequence() {
        let mut a = Oscillator::new(WaveId::Noise, 0.0);
        let mut b = Oscillator::new(WaveId::Noise, 0.0);
        let freq = [220.0f32; 64];
        let mut out_a = [0.0f32; 64];
        let mut out_b = [0.0f32; 64];
        a.run(&mut out_a, &freq, 48_000);
        b.run(&mut out_b, &freq, 48_000);
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn noise_samples_stay_in_range() {
        let mut osc = Oscillator::new(WaveId::Noise, 0.0);
        let freq = [110.0f32; 1024];
        let mut out = [0.0f32; 1024];
        osc.run(&mut out, &freq, 48_000);
        assert!(out.iter().all(|s| *s >= -1.0 && *s < 1.0));
    }
}
