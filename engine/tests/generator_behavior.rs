//! End-to-end `Generator` behavior over hand-built `Program` values,
//! exercising spec.md §4.9-§4.10's sample-level contracts without going
//! through the parser/builder (that round trip is covered in
//! `sau_lang`'s own integration tests).

use sau_engine::program::{
    mode_flags, param_mask, OperatorData, ProgramEvent, RampShape, RampSpec, TimeSpec, Use,
    VoiceData, VoiceGraphRef,
};
use sau_engine::{Generator, IdArr, Program};
use std::rc::Rc;

fn carrier(id: u32, wave: sau_engine::WaveId, freq: f64, fmods: IdArr, duration_ms: u32) -> OperatorData {
    OperatorData {
        id,
        changed: param_mask::WAVE | param_mask::TIME | param_mask::FREQ | param_mask::AMP | param_mask::PHASE,
        time: TimeSpec::new(duration_ms),
        silence_ms: 0,
        wave,
        freq: RampSpec::constant(freq),
        freq2: RampSpec::default(),
        amp: RampSpec::constant(1.0),
        amp2: RampSpec::default(),
        phase: 0.0,
        fmods,
        pmods: IdArr::empty(),
        amods: IdArr::empty(),
    }
}

fn single_voice_event(pan: f64, ops: Vec<OperatorData>, graph: Vec<VoiceGraphRef>, duration_ms: u32) -> Program {
    let carrier_id = ops[0].id;
    let event = ProgramEvent {
        wait_ms: 0,
        voice_id: 0,
        voice_data: Some(VoiceData {
            pan: RampSpec::constant(pan),
            carriers: IdArr::new(vec![carrier_id]),
        }),
        operators: ops,
        voice_graph: Some(Rc::from(graph)),
    };
    Program {
        events: vec![event],
        voice_count: 1,
        operator_count: 1,
        op_nest_depth: 0,
        duration_ms: duration_ms as u64,
        mode: mode_flags::AMP_DIV_VOICES,
        name: "test".to_string(),
    }
}

/// A carrier frequency-modulated by a single operator renders a different
/// waveform than an unmodulated carrier at the same nominal frequency
/// (spec.md §4.10 "FM: carrier phase-independent frequency offset").
#[test]
fn fm_modulated_carrier_diverges_from_plain_carrier() {
    let plain = {
        let op = carrier(0, sau_engine::WaveId::Sin, 440.0, IdArr::empty(), 20);
        let graph = vec![VoiceGraphRef { op_id: 0, use_: Use::Carr, depth: 0 }];
        single_voice_event(0.5, vec![op], graph, 20)
    };

    let modulated = {
        let mut carrier_op = carrier(1, sau_engine::WaveId::Sin, 440.0, IdArr::new(vec![0]), 20);
        carrier_op.changed |= param_mask::FMODS;
        let mut modulator = carrier(0, sau_engine::WaveId::Sin, 80.0, IdArr::empty(), 20);
        modulator.amp = RampSpec::constant(200.0);
        let graph = vec![
            VoiceGraphRef { op_id: 0, use_: Use::Fm, depth: 1 },
            VoiceGraphRef { op_id: 1, use_: Use::Carr, depth: 0 },
        ];
        let mut prog = single_voice_event(0.5, vec![carrier_op, modulator], graph, 20);
        prog.operator_count = 2;
        prog
    };

    let mut gen_plain = Generator::create(plain, 48_000).unwrap();
    let mut gen_mod = Generator::create(modulated, 48_000).unwrap();
    let mut buf_plain = vec![0i16; 4096];
    let mut buf_mod = vec![0i16; 4096];
    gen_plain.run(&mut buf_plain);
    gen_mod.run(&mut buf_mod);

    assert_ne!(buf_plain, buf_mod);
}

/// Hard-left and hard-right pan settings put all energy on the opposite
/// channel (spec.md §4.9 "linear pan law").
#[test]
fn pan_extremes_isolate_energy_to_one_channel() {
    fn rendered(pan: f64) -> Vec<i16> {
        let op = carrier(0, sau_engine::WaveId::Sin, 300.0, IdArr::empty(), 10);
        let graph = vec![VoiceGraphRef { op_id: 0, use_: Use::Carr, depth: 0 }];
        let program = single_voice_event(pan, vec![op], graph, 10);
        let mut gen = Generator::create(program, 48_000).unwrap();
        let mut buf = vec![0i16; 2048];
        gen.run(&mut buf);
        buf
    }

    let left = rendered(0.0);
    let right = rendered(1.0);

    let left_energy: i64 = left.iter().step_by(2).map(|&s| (s as i64).abs()).sum();
    let right_energy_of_left: i64 = left.iter().skip(1).step_by(2).map(|&s| (s as i64).abs()).sum();
    assert!(left_energy > 0);
    assert_eq!(right_energy_of_left, 0);

    let right_energy: i64 = right.iter().skip(1).step_by(2).map(|&s| (s as i64).abs()).sum();
    let left_energy_of_right: i64 = right.iter().step_by(2).map(|&s| (s as i64).abs()).sum();
    assert!(right_energy > 0);
    assert_eq!(left_energy_of_right, 0);
}

/// A linear frequency ramp changes the oscillator's output period over the
/// course of an event rather than jumping discontinuously (spec.md §4.7
/// "ramps fill for goal/time/shape").
#[test]
fn frequency_ramp_shifts_output_over_its_span() {
    let mut op = carrier(0, sau_engine::WaveId::Saw, 100.0, IdArr::empty(), 50);
    op.freq = RampSpec {
        value: 100.0,
        goal: Some(1000.0),
        time_ms: Some(50),
        shape: RampShape::Lin,
        ratio: false,
    };
    let graph = vec![VoiceGraphRef { op_id: 0, use_: Use::Carr, depth: 0 }];
    let program = single_voice_event(0.5, vec![op], graph, 50);

    let mut gen = Generator::create(program, 48_000).unwrap();
    let mut buf = vec![0i16; 48_000 / 10];
    gen.run(&mut buf);

    let first_half_zero_crossings = count_zero_crossings(&buf[..buf.len() / 2]);
    let second_half_zero_crossings = count_zero_crossings(&buf[buf.len() / 2..]);
    // a higher frequency in the back half of the ramp crosses zero more often.
    assert!(second_half_zero_crossings > first_half_zero_crossings);
}

fn count_zero_crossings(samples: &[i16]) -> usize {
    samples
        .chunks(2)
        .map(|pair| pair[0])
        .collect::<Vec<_>>()
        .windows(2)
        .filter(|w| (w[0] >= 0) != (w[1] >= 0))
        .count()
}

/// An explicit `Sa` ampmult (mode bit cleared) leaves voice amplitude
/// unscaled, while the default (bit set) divides it by the voice count
/// (spec.md §3 "Amplitude scaling"). `voice_count` is set to 2 so the
/// division (1/2) is actually observable; the second voice is left silent.
#[test]
fn amp_div_voices_flag_changes_output_amplitude() {
    fn peak_amplitude(mode: u8) -> i16 {
        let op = carrier(0, sau_engine::WaveId::Sin, 300.0, IdArr::empty(), 10);
        let graph = vec![VoiceGraphRef { op_id: 0, use_: Use::Carr, depth: 0 }];
        let mut program = single_voice_event(0.5, vec![op], graph, 10);
        program.mode = mode;
        program.voice_count = 2;
        let mut gen = Generator::create(program, 48_000).unwrap();
        let mut buf = vec![0i16; 2048];
        gen.run(&mut buf);
        buf.iter().map(|&s| s.unsigned_abs()).max().unwrap() as i16
    }

    let divided = peak_amplitude(mode_flags::AMP_DIV_VOICES);
    let undivided = peak_amplitude(0);
    assert!(undivided > divided);
}
