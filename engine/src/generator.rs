//! Sample-accurate event scheduler and PCM renderer (spec.md §4.10
//! "Generator (runtime)").

use crate::constants::BLOCK_SIZE;
use crate::dsp::ramp::mulbuf;
use crate::dsp::{Oscillator, Ramp};
use crate::error::AllocError;
use crate::memory::IdArr;
use crate::mixer;
use crate::program::{mode_flags, param_mask, Program, ProgramEvent, RampSpec, Use};

/// A ceiling on `Program::op_nest_depth` distinct from the hard protocol
/// limit of 255 (spec.md §3): each level of nesting costs
/// `SCRATCH_BUFFERS_PER_LEVEL` scratch buffers, and depths beyond this are
/// rejected up front rather than accepted and left to exhaust memory.
const MAX_SUPPORTED_NEST_DEPTH: u8 = 64;

fn ms_to_samples(ms: u32, sample_rate: u32) -> u64 {
    (ms as u64 * sample_rate as u64) / 1000
}

#[derive(Debug, Clone)]
struct OperatorState {
    wave: crate::program::WaveId,
    osc: Oscillator,
    freq: Ramp,
    freq2: Ramp,
    amp: Ramp,
    amp2: Ramp,
    freq_ratio: bool,
    freq2_ratio: bool,
    fmods: IdArr,
    pmods: IdArr,
    amods: IdArr,
    /// Total samples of silence to emit before the oscillator starts
    /// producing non-zero output (spec.md §3 "silence_ms").
    silence_remaining: u64,
    /// Samples of active (post-silence) runtime left for this operator.
    time_remaining: u64,
    /// Cycle-cut guard for the recursive modulation evaluator (spec.md
    /// §4.10 step 1 / §9 "Graph cycles and cycle cutting").
    visited: bool,
}

impl OperatorState {
    fn new() -> OperatorState {
        OperatorState {
            wave: crate::program::WaveId::default(),
            osc: Oscillator::new(crate::program::WaveId::default(), 0.0),
            freq: Ramp::new(0.0),
            freq2: Ramp::new(0.0),
            amp: Ramp::new(0.0),
            amp2: Ramp::new(0.0),
            freq_ratio: false,
            freq2_ratio: false,
            fmods: IdArr::empty(),
            pmods: IdArr::empty(),
            amods: IdArr::empty(),
            silence_remaining: 0,
            time_remaining: 0,
            visited: false,
        }
    }

    fn apply_ramp(target: &mut Ramp, spec: &RampSpec, sample_rate: u32, default_duration_samples: u64) {
        target.set_value(spec.value as f32);
        if let Some(goal) = spec.goal {
            let duration = spec
                .time_ms
                .map(|ms| ms_to_samples(ms, sample_rate))
                .unwrap_or(default_duration_samples);
            target.set_goal(goal as f32, duration.min(u32::MAX as u64) as u32, spec.shape);
        }
    }

    fn apply(&mut self, data: &crate::program::OperatorData, sample_rate: u32) {
        let time_samples = ms_to_samples(data.time.ms, sample_rate);

        if data.changed(param_mask::WAVE) {
            self.wave = data.wave;
            self.osc.set_wave(data.wave);
        }
        if data.changed(param_mask::PHASE) {
            self.osc.set_phase(data.phase);
        }
        if data.changed(param_mask::TIME) || data.changed(param_mask::SILENCE) {
            let silence_samples = ms_to_samples(data.silence_ms, sample_rate);
            self.silence_remaining = silence_samples;
            self.time_remaining = time_samples.saturating_sub(silence_samples);
        }

        let default_ramp_duration = time_samples;
        if data.changed(param_mask::FREQ) {
            self.freq_ratio = data.freq.ratio;
            Self::apply_ramp(&mut self.freq, &data.freq, sample_rate, default_ramp_duration);
        }
        if data.changed(param_mask::FREQ2) {
            self.freq2_ratio = data.freq2.ratio;
            Self::apply_ramp(&mut self.freq2, &data.freq2, sample_rate, default_ramp_duration);
        }
        if data.changed(param_mask::AMP) {
            Self::apply_ramp(&mut self.amp, &data.amp, sample_rate, default_ramp_duration);
        }
        if data.changed(param_mask::AMP2) {
            Self::apply_ramp(&mut self.amp2, &data.amp2, sample_rate, default_ramp_duration);
        }
        if data.changed(param_mask::FMODS) {
            self.fmods = data.fmods.clone();
        }
        if data.changed(param_mask::PMODS) {
            self.pmods = data.pmods.clone();
        }
        if data.changed(param_mask::AMODS) {
            self.amods = data.amods.clone();
        }
    }
}

#[derive(Debug, Clone)]
struct VoiceState {
    pan: Ramp,
    carriers: IdArr,
    voice_graph: Option<crate::program::VoiceGraph>,
    duration_remaining: u64,
}

impl VoiceState {
    fn new() -> VoiceState {
        VoiceState {
            pan: Ramp::new(0.5),
            carriers: IdArr::empty(),
            voice_graph: None,
            duration_remaining: 0,
        }
    }
}

/// A fully instantiated runtime for one `Program` (spec.md §4.10).
///
/// Owns all per-voice and per-operator mutable state; borrows nothing from
/// the program after construction (every field it needs is copied out of
/// `Program` up front), so the program may be dropped once the generator is
/// created if the caller doesn't need it for anything else.
pub struct Generator {
    sample_rate: u32,
    operators: Vec<OperatorState>,
    voices: Vec<VoiceState>,
    events: Vec<ProgramEvent>,
    next_event: usize,
    /// Samples into the wait of `events[next_event]` already consumed.
    event_sample_pos: u64,
    amp_div_voices: bool,
    voice_count: u32,
    samples_rendered: u64,
    duration_samples: u64,
}

impl Generator {
    /// Builds runtime state for `program` (spec.md §6 "create_generator").
    pub fn create(program: Program, sample_rate: u32) -> Result<Generator, AllocError> {
        if sample_rate == 0 {
            return Err(AllocError::ZeroSampleRate);
        }
        if program.op_nest_depth > MAX_SUPPORTED_NEST_DEPTH {
            return Err(AllocError::NestTooDeep(program.op_nest_depth));
        }

        let operators = vec![OperatorState::new(); program.operator_count as usize];
        let voices = vec![VoiceState::new(); program.voice_count as usize];
        let duration_samples = ms_to_samples(program.duration_ms as u32, sample_rate);

        Ok(Generator {
            sample_rate,
            operators,
            voices,
            events: program.events,
            next_event: 0,
            event_sample_pos: 0,
            amp_div_voices: program.amp_div_voices(),
            voice_count: program.voice_count,
            samples_rendered: 0,
            duration_samples,
        })
    }

    fn apply_event(&mut self, index: usize) {
        let event = self.events[index].clone();
        let voice_id = event.voice_id as usize;

        for op_data in &event.operators {
            self.operators[op_data.id as usize].apply(op_data, self.sample_rate);
        }

        if let Some(voice_data) = &event.voice_data {
            let voice = &mut self.voices[voice_id];
            voice.pan.set_value(voice_data.pan.value as f32);
            if let Some(goal) = voice_data.pan.goal {
                let duration = voice_data
                    .pan
                    .time_ms
                    .map(|ms| ms_to_samples(ms, self.sample_rate))
                    .unwrap_or(0);
                voice
                    .pan
                    .set_goal(goal as f32, duration.min(u32::MAX as u64) as u32, voice_data.pan.shape);
            }
            voice.carriers = voice_data.carriers.clone();
        }

        if let Some(graph) = &event.voice_graph {
            self.voices[voice_id].voice_graph = Some(graph.clone());
            let max_time = graph
                .iter()
                .filter(|r| r.use_ == Use::Carr)
                .map(|r| {
                    let op = &self.operators[r.op_id as usize];
                    op.silence_remaining + op.time_remaining
                })
                .max()
                .unwrap_or(0);
            self.voices[voice_id].duration_remaining = max_time;
        }
    }

    /// Sums the output of every operator in `ids`, each rendered in
    /// `env_mode` (true for FM/AM modulators, false for PM modulators and
    /// carriers), modulated in frequency by `parent_freq` (spec.md §4.10
    /// steps 4-6).
    fn sum_children(&mut self, ids: &IdArr, len: usize, parent_freq: &[f32], env_mode: bool) -> Vec<f32> {
        let mut sum = vec![0.0f32; len];
        for &id in ids.ids() {
            let child = self.run_block(id, len, Some(parent_freq), env_mode);
            for (s, c) in sum.iter_mut().zip(child.iter()) {
                *s += c;
            }
        }
        sum
    }

    /// Produces up to `len` samples for operator `op_id` (spec.md §4.10
    /// "run_block"). `env_mode` selects envelope-style output (unipolar,
    /// scaled into `[0, amp]`) for AM/FM modulators versus full bipolar
    /// output for carriers and PM modulators.
    fn run_block(
        &mut self,
        op_id: u32,
        len: usize,
        parent_freq: Option<&[f32]>,
        env_mode: bool,
    ) -> Vec<f32> {
        let idx = op_id as usize;
        if self.operators[idx].visited {
            return vec![0.0; len]; // cycle cut (spec.md §4.10 step 1, §9)
        }
        self.operators[idx].visited = true;

        let available = self.operators[idx].silence_remaining + self.operators[idx].time_remaining;
        let len = len.min(available as usize);
        if len == 0 {
            self.operators[idx].visited = false;
            return Vec::new();
        }

        let silence_here = self.operators[idx].silence_remaining.min(len as u64) as usize;
        let active_len = len - silence_here;

        let mut freq_buf = vec![0.0f32; active_len];
        self.operators[idx].freq.run(&mut freq_buf);
        if self.operators[idx].freq_ratio {
            if let Some(pf) = parent_freq {
                mulbuf(&mut freq_buf, &pf[..active_len]);
            }
        }

        let fmods = self.operators[idx].fmods.clone();
        if !fmods.is_empty() && active_len > 0 {
            let mut freq2_buf = vec![0.0f32; active_len];
            self.operators[idx].freq2.run(&mut freq2_buf);
            if self.operators[idx].freq2_ratio {
                if let Some(pf) = parent_freq {
                    mulbuf(&mut freq2_buf, &pf[..active_len]);
                }
            }
            let fm_buf = self.sum_children(&fmods, active_len, &freq_buf, true);
            for i in 0..active_len {
                freq_buf[i] += (freq2_buf[i] - freq_buf[i]) * fm_buf[i];
            }
        }

        let pmods = self.operators[idx].pmods.clone();
        let pm_buf = if !pmods.is_empty() && active_len > 0 {
            Some(self.sum_children(&pmods, active_len, &freq_buf, false))
        } else {
            None
        };

        let mut amp_buf = vec![0.0f32; active_len];
        self.operators[idx].amp.run(&mut amp_buf);

        let amods = self.operators[idx].amods.clone();
        if !amods.is_empty() && active_len > 0 {
            let mut amp2_buf = vec![0.0f32; active_len];
            self.operators[idx].amp2.run(&mut amp2_buf);
            let am_buf = self.sum_children(&amods, active_len, &freq_buf, true);
            for i in 0..active_len {
                amp_buf[i] += (amp2_buf[i] - amp_buf[i]) * am_buf[i];
            }
        }

        let mut out = vec![0.0f32; len];
        if active_len > 0 {
            let mut osc_buf = vec![0.0f32; active_len];
            self.operators[idx].osc.run_modulated(
                &mut osc_buf,
                &freq_buf,
                pm_buf.as_deref(),
                self.sample_rate,
            );
            for i in 0..active_len {
                let sample = if env_mode {
                    (osc_buf[i] * 0.5 + 0.5) * amp_buf[i]
                } else {
                    osc_buf[i] * amp_buf[i]
                };
                out[silence_here + i] = sample;
            }
        }

        self.operators[idx].silence_remaining =
            self.operators[idx].silence_remaining.saturating_sub(silence_here as u64);
        self.operators[idx].time_remaining =
            self.operators[idx].time_remaining.saturating_sub(active_len as u64);
        self.operators[idx].visited = false;
        out
    }

    fn run_voice(&mut self, voice_id: u32, len: usize, stereo: &mut [(f32, f32)]) {
        let idx = voice_id as usize;
        let graph = match self.voices[idx].voice_graph.clone() {
            Some(g) => g,
            None => return,
        };

        let len = len.min(self.voices[idx].duration_remaining as usize);
        if len == 0 {
            return;
        }

        let mut mono = vec![0.0f32; len];
        for r in graph.iter().filter(|r| r.use_ == Use::Carr) {
            let carrier_out = self.run_block(r.op_id, len, None, false);
            for (m, c) in mono.iter_mut().zip(carrier_out.iter()) {
                *m += c;
            }
        }

        let mut pan_buf = vec![0.0f32; len];
        self.voices[idx].pan.run(&mut pan_buf);

        mixer::accumulate_voice(&mut stereo[..len], &mono, &pan_buf);

        self.voices[idx].duration_remaining = self.voices[idx].duration_remaining.saturating_sub(len as u64);
    }

    /// Fills `buf` (interleaved 16-bit stereo PCM) with up to `buf.len()/2`
    /// frames. Returns `(frames_filled, more)`; when `more` is `false`, the
    /// trailing unfilled part of `buf` is zeroed (spec.md §6
    /// "generator_run").
    pub fn run(&mut self, buf: &mut [i16]) -> (usize, bool) {
        let requested_frames = buf.len() / 2;
        let mut frames_filled = 0;

        while frames_filled < requested_frames {
            if !self.is_running() {
                break;
            }

            // Drain events whose wait has fully elapsed, splitting the
            // block at event boundaries (spec.md §4.10 "Ordering
            // guarantees": event processing precedes voice rendering up to
            // the next event boundary within a run call).
            while self.next_event < self.events.len() {
                let wait_samples = ms_to_samples(self.events[self.next_event].wait_ms, self.sample_rate);
                if self.event_sample_pos >= wait_samples {
                    let idx = self.next_event;
                    self.apply_event(idx);
                    self.next_event += 1;
                    self.event_sample_pos = 0;
                } else {
                    break;
                }
            }

            let block_cap = BLOCK_SIZE.min(requested_frames - frames_filled);
            let block_len = if self.next_event < self.events.len() {
                let wait_samples = ms_to_samples(self.events[self.next_event].wait_ms, self.sample_rate);
                let remaining_wait = wait_samples.saturating_sub(self.event_sample_pos);
                block_cap.min(remaining_wait.max(1) as usize)
            } else {
                block_cap
            };
            let block_len = block_len.max(1).min(block_cap);

            let mut stereo = vec![(0.0f32, 0.0f32); block_len];
            for voice_id in 0..self.voices.len() as u32 {
                self.run_voice(voice_id, block_len, &mut stereo);
            }

            if self.amp_div_voices && self.voice_count > 0 {
                mixer::scale(&mut stereo, 1.0 / self.voice_count as f32);
            }

            let pcm = mixer::to_pcm16(&stereo);
            let dst = &mut buf[frames_filled * 2..(frames_filled + block_len) * 2];
            dst.copy_from_slice(&pcm);

            frames_filled += block_len;
            self.event_sample_pos += block_len as u64;
            self.samples_rendered += block_len as u64;
        }

        let more = self.is_running();
        if !more {
            for slot in &mut buf[frames_filled * 2..] {
                *slot = 0;
            }
        }
        (frames_filled, more)
    }

    /// `true` while there is still an unapplied event or an active voice
    /// (spec.md §4.10 "Error handling": end-of-signal condition).
    pub fn is_running(&self) -> bool {
        if self.next_event < self.events.len() {
            return true;
        }
        self.voices.iter().any(|v| v.duration_remaining > 0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_samples(&self) -> u64 {
        self.duration_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{OperatorData, RampSpec, TimeSpec, VoiceData, VoiceGraphRef, WaveId};
    use std::rc::Rc;

    fn sine_program(duration_ms: u32) -> Program {
        let op = OperatorData {
            id: 0,
            changed: param_mask::WAVE
                | param_mask::TIME
                | param_mask::FREQ
                | param_mask::AMP
                | param_mask::PHASE,
            time: TimeSpec::new(duration_ms),
            silence_ms: 0,
            wave: WaveId::Sin,
            freq: RampSpec::constant(440.0),
            freq2: RampSpec::default(),
            amp: RampSpec::constant(1.0),
            amp2: RampSpec::default(),
            phase: 0.0,
            fmods: IdArr::empty(),
            pmods: IdArr::empty(),
            amods: IdArr::empty(),
        };
        let voice_data = VoiceData {
            pan: RampSpec::constant(0.5),
            carriers: IdArr::new(vec![0]),
        };
        let graph: crate::program::VoiceGraph = Rc::from(vec![VoiceGraphRef {
            op_id: 0,
            use_: Use::Carr,
            depth: 0,
        }]);
        let event = ProgramEvent {
            wait_ms: 0,
            voice_id: 0,
            voice_data: Some(voice_data),
            operators: vec![op],
            voice_graph: Some(graph),
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

    #[test]
    fn renders_requested_frame_count_and_reports_end_of_stream() {
        let program = sine_program(10);
        let mut gen = Generator::create(program, 48_000).unwrap();
        let frames = ms_to_samples(10, 48_000) as usize;
        let mut buf = vec![0i16; frames * 2 + 200];
        let (filled, more) = gen.run(&mut buf);
        assert_eq!(filled, frames);
        assert!(!more);
        assert!(buf[frames * 2..].iter().all(|&s| s == 0));
    }

    #[test]
    fn determinism_same_program_same_output() {
        let mut gen_a = Generator::create(sine_program(20), 48_000).unwrap();
        let mut gen_b = Generator::create(sine_program(20), 48_000).unwrap();
        let mut buf_a = vec![0i16; 4096];
        let mut buf_b = vec![0i16; 4096];
        gen_a.run(&mut buf_a);
        gen_b.run(&mut buf_b);
        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let err = Generator::create(sine_program(10), 0).unwrap_err();
        assert_eq!(err, AllocError::ZeroSampleRate);
    }

    #[test]
    fn excessive_nest_depth_is_rejected() {
        let mut program = sine_program(10);
        program.op_nest_depth = 255;
        let err = Generator::create(program, 48_000).unwrap_err();
        assert_eq!(err, AllocError::NestTooDeep(255));
    }
}
