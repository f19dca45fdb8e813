//! `sauc`: the C11 top-level orchestrator (spec.md §2 "opens script -> parse
//! tree -> program -> generator -> consumer loop").
//!
//! This crate is a thin shell: all the actual language and DSP work lives in
//! `sau_lang` and `sau_engine`. What's here is argument handling, wiring
//! `Diagnostics` to stderr, and the pull loop that drains the `Generator`
//! into an output sink.

pub mod config;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use sau_engine::{Generator, Program};
use sau_lang::diagnostics::Diagnostics;

use config::Config;

/// Reads and builds `script_path` into a finished [`Program`] (spec.md §6
/// "Script input contract"). The path itself labels diagnostics.
pub fn build_from_file(script_path: &Path, diag: &Diagnostics) -> anyhow::Result<Program> {
    let name = script_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("script")
        .to_string();
    let program = sau_lang::build_program_from_path(script_path, &name, diag)?;
    Ok(program)
}

/// One-line `--check-only` summary (spec.md §7 / SPEC_FULL.md "Supplemental
/// features"): build the program, print its shape, never render.
pub fn print_check_summary(program: &Program) {
    println!(
        "{}: {} voice(s), {} operator(s), nest depth {}, duration {} ms{}",
        program.name,
        program.voice_count,
        program.operator_count,
        program.op_nest_depth,
        program.duration_ms,
        if program.amp_div_voices() {
            ", amp-div-voices"
        } else {
            ""
        },
    );
}

/// Serializes the built program to JSON (the `--dump-program` debugging aid;
/// purely additive, no effect on rendering).
pub fn dump_program_json(program: &Program) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(program)?)
}

/// Runs the generator to completion, writing raw interleaved 16-bit PCM
/// (native endian, left-then-right per frame) to `sink` one block at a time
/// (spec.md §4.9 "Audio output contract"). No WAV/AU header is written —
/// file-format framing is explicitly out of scope for the core, and this
/// orchestrator only ever emits the raw pull-interface output spec.md §6
/// describes.
pub fn render_to(program: Program, cfg: &Config, mut sink: impl Write) -> anyhow::Result<()> {
    let mut generator = Generator::create(program, cfg.sample_rate)?;
    let mut buf = vec![0i16; sau_engine::constants::BLOCK_SIZE * 2];
    let mut bytes = Vec::with_capacity(buf.len() * 2);
    loop {
        let (frames, more) = generator.run(&mut buf);
        bytes.clear();
        for &sample in &buf[..frames * 2] {
            bytes.extend_from_slice(&sample.to_ne_bytes());
        }
        sink.write_all(&bytes)?;
        if !more {
            break;
        }
    }
    sink.flush()?;
    Ok(())
}

/// Opens `path` for writing, or wraps stdout when `path` is `None` (spec.md
/// §6 "output path").
pub fn open_sink(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    match path {
        Some(p) => Ok(Box::new(io::BufWriter::new(fs::File::create(p)?))),
        None => Ok(Box::new(io::BufWriter::new(io::stdout()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn render_to_writes_the_expected_byte_count() {
        let diag = Diagnostics::standalone();
        let program = sau_lang::build_program("Wsin Q", "t", "<test>", &diag).unwrap();
        let cfg = Config {
            sample_rate: 8000,
            ..Config::default()
        };
        let mut out = Cursor::new(Vec::new());
        render_to(program, &cfg, &mut out).unwrap();
        // interleaved stereo i16: 4 bytes per frame, and at least one block
        // should have been rendered for a 1-second sine script.
        assert_eq!(out.get_ref().len() % 4, 0);
        assert!(!out.get_ref().is_empty());
    }
}
