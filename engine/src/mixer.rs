//! Stereo accumulation and 16-bit PCM conversion (spec.md §4.9 "Mixer").

/// Accumulates one voice's mono signal into a stereo buffer using the
/// linear pan law `L += s*(1-p); R += s*p`, `pan` in `[0.0, 1.0]` (`0` full
/// left, `0.5` center, `1` full right), sampled per-frame from the voice's
/// pan ramp (spec.md §4.9 "per-sample pan").
pub fn accumulate_voice(stereo: &mut [(f32, f32)], mono: &[f32], pan: &[f32]) {
    debug_assert_eq!(stereo.len(), mono.len());
    debug_assert_eq!(stereo.len(), pan.len());
    for ((out, &m), &p) in stereo.iter_mut().zip(mono.iter()).zip(pan.iter()) {
        let p = p.clamp(0.0, 1.0);
        out.0 += m * (1.0 - p);
        out.1 += m * p;
    }
}

/// Scales a whole stereo block by a constant factor, used to apply
/// `mode_flags::AMP_DIV_VOICES` (spec.md §3 "Amplitude scaling": divide the
/// mix by the voice count so concurrent voices don't clip by default).
pub fn scale(stereo: &mut [(f32, f32)], factor: f32) {
    for (l, r) in stereo.iter_mut() {
        *l *= factor;
        *r *= factor;
    }
}

/// Converts a stereo float block to interleaved 16-bit PCM, saturating
/// rather than wrapping on overflow (spec.md §4.9 "Output").
pub fn to_pcm16(stereo: &[(f32, f32)]) -> Vec<i16> {
    let mut out = Vec::with_capacity(stereo.len() * 2);
    for &(l, r) in stereo {
        out.push(f32_to_i16(l));
        out.push(f32_to_i16(r));
    }
    out
}

#[inline]
fn f32_to_i16(sample: f32) -> i16 {
    let scaled = sample * i16::MAX as f32;
    scaled.clamp(i16::MIN as f32, i16::MAX as f32).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pan_splits_equally() {
        let mut stereo = vec![(0.0, 0.0)];
        accumulate_voice(&mut stereo, &[1.0], &[0.5]);
        assert!((stereo[0].0 - stereo[0].1).abs() < 1e-6);
    }

    #[test]
    fn full_left_silences_right_channel() {
        let mut stereo = vec![(0.0, 0.0)];
        accumulate_voice(&mut stereo, &[1.0], &[0.0]);
        assert!(stereo[0].1.abs() < 1e-6);
        assert!((stereo[0].0 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pcm_conversion_saturates() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), i16::MIN);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn voice_div_scales_whole_block() {
        let mut stereo = vec![(1.0, 1.0), (0.5, -0.5)];
        scale(&mut stereo, 0.5);
        assert_eq!(stereo, vec![(0.5, 0.5), (0.25, -0.25)]);
    }
}
