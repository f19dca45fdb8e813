//! Wave lookup tables: a naive table for linear-interpolated lookup, and a
//! pre-integrated table (PILUT) for band-limited lookup by differentiation
//! (spec.md §4.8).
//!
//! Every table is built DC-free (the mean of one cycle is subtracted before
//! the table is stored). That makes the PILUT's running integral exactly
//! periodic — `integral(phase + TABLE_SIZE) == integral(phase)` — so a
//! differentiated lookup only ever needs the two endpoints modulo
//! `TABLE_SIZE`, however many table periods the phase advanced by in one
//! step. That lets every wave share one `diff_scale = 1.0, diff_offset =
//! 0.0` pair instead of the per-wave tuned constants spec.md §4.8 mentions;
//! see DESIGN.md for why that's a faithful simplification rather than a
//! silent behavior change.
//!
//! The exact shape of `ahs`/`hrs`/`srs`/`szh`/`shh`/`ssr` is left to the
//! implementer by spec.md §4.8 ("a family such as ..."); this crate defines
//! them as rectified-sine variants with a shared "sharpen" transform for the
//! `sz/sh/ss`-prefixed members, rather than reproducing undocumented
//! historical constants (spec.md §9 Open Questions).

use std::f64::consts::PI;
use std::sync::OnceLock;

use crate::dsp::math::lerp;
use crate::program::WaveId;

/// Table length; a power of two for cheap masking.
pub const TABLE_SIZE: usize = 2048;
const TABLE_MASK: usize = TABLE_SIZE - 1;

pub struct WaveTable {
    /// One period of the waveform, linearly interpolated for naive lookup.
    pub naive: [f32; TABLE_SIZE],
    /// Running integral of `naive`, one extra sample so wraparound
    /// interpolation doesn't need a modular branch.
    pub pilut: [f32; TABLE_SIZE + 1],
}

fn sin_fn(p: f64) -> f32 {
    (2.0 * PI * p).sin() as f32
}

fn tri_fn(p: f64) -> f32 {
    (1.0 - 4.0 * (p - 0.5).abs()) as f32
}

fn sqr_fn(p: f64) -> f32 {
    if p < 0.5 {
        1.0
    } else {
        -1.0
    }
}

fn saw_fn(p: f64) -> f32 {
    (2.0 * p - 1.0) as f32
}

fn ahs_fn(p: f64) -> f32 {
    sin_fn(p).abs() * 2.0 - 1.0
}

fn hrs_fn(p: f64) -> f32 {
    let s = sin_fn(p);
    if s >= 0.0 {
        s * 2.0 - 1.0
    } else {
        -1.0
    }
}

fn srs_fn(p: f64) -> f32 {
    let s = sin_fn(p);
    s.signum() * s.abs().sqrt()
}

/// Pushes a shape's zero crossings and extrema closer to instantaneous,
/// producing the `sz/sh/ss`-prefixed "sharp" counterpart of a base shape.
fn sharpen(x: f32) -> f32 {
    x.signum() * x.abs().sqrt()
}

fn wave_fn(wave: WaveId, p: f64) -> f32 {
    match wave {
        WaveId::Sin => sin_fn(p),
        WaveId::Tri => tri_fn(p),
        WaveId::Sqr => sqr_fn(p),
        WaveId::Saw => saw_fn(p),
        WaveId::Ahs => ahs_fn(p),
        WaveId::Hrs => hrs_fn(p),
        WaveId::Srs => srs_fn(p),
        WaveId::Szh => sharpen(ahs_fn(p)),
        WaveId::Shh => sharpen(hrs_fn(p)),
        WaveId::Ssr => sharpen(srs_fn(p)),
        WaveId::Noise => 0.0, // noise never consults the table, see dsp::oscillator
    }
}

fn build_table(wave: WaveId) -> WaveTable {
    let mut naive = [0.0f32; TABLE_SIZE];
    for (i, slot) in naive.iter_mut().enumerate() {
        *slot = wave_fn(wave, i as f64 / TABLE_SIZE as f64);
    }

    // Remove DC so the integral table is exactly periodic.
    let mean: f32 = naive.iter().sum::<f32>() / TABLE_SIZE as f32;
    for s in naive.iter_mut() {
        *s -= mean;
    }

    let mut pilut = [0.0f32; TABLE_SIZE + 1];
    let mut acc = 0.0f32;
    for i in 0..TABLE_SIZE {
        pilut[i] = acc;
        acc += naive[i];
    }
    pilut[TABLE_SIZE] = acc; // ~0.0 by construction (zero-mean wave)

    WaveTable { naive, pilut }
}

impl WaveTable {
    /// Linearly interpolated naive lookup; `phase` in `[0, 1)`.
    #[inline]
    pub fn naive_lookup(&self, phase: f32) -> f32 {
        let pos = phase as f64 * TABLE_SIZE as f64;
        let idx = pos as usize & TABLE_MASK;
        let frac = (pos - pos.floor()) as f32;
        lerp(self.naive[idx], self.naive[(idx + 1) & TABLE_MASK], frac)
    }

    /// Continuous (non-wrapped) integral lookup used by the PILUT path.
    /// `table_pos` is in table-index units and may be arbitrarily large or
    /// negative; only `table_pos mod TABLE_SIZE` matters because the table
    /// is exactly periodic.
    #[inline]
    pub fn integral_at(&self, table_pos: f64) -> f64 {
        let size = TABLE_SIZE as f64;
        let wrapped = table_pos - (table_pos / size).floor() * size;
        let idx = (wrapped as usize).min(TABLE_SIZE - 1);
        let frac = wrapped - idx as f64;
        let a = self.pilut[idx] as f64;
        let b = self.pilut[idx + 1] as f64;
        a + frac * (b - a)
    }
}

struct TableSet {
    tables: [WaveTable; 10],
}

fn non_noise_waves() -> [WaveId; 10] {
    [
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
    ]
}

fn table_index(wave: WaveId) -> Option<usize> {
    non_noise_waves().iter().position(|w| *w == wave)
}

static TABLES: OnceLock<TableSet> = OnceLock::new();

fn tables() -> &'static TableSet {
    TABLES.get_or_init(|| TableSet {
        tables: non_noise_waves().map(build_table),
    })
}

/// Returns the wave table for `wave`, or `None` for `WaveId::Noise`, which
/// has no lookup table (spec.md §4.8, §9 "noise generator ... extension
/// point").
pub fn wave_table(wave: WaveId) -> Option<&'static WaveTable> {
    table_index(wave).map(|i| &tables().tables[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pilut_is_periodic() {
        let t = wave_table(WaveId::Sin).unwrap();
        assert!((t.pilut[0]).abs() < 1e-4);
        assert!((t.pilut[TABLE_SIZE]).abs() < 1e-3);
    }

    #[test]
    fn naive_sin_matches_reference_within_tolerance() {
        let t = wave_table(WaveId::Sin).unwrap();
        for i in 0..100 {
            let phase = i as f32 / 100.0;
            let expected = (2.0 * PI as f32 * phase).sin();
            approx::assert_abs_diff_eq!(t.naive_lookup(phase), expected, epsilon = 0.01);
        }
    }
}
