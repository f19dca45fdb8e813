//! `sauc` — a deterministic command-line synthesizer for the SAU scripting
//! language (spec.md §2 "C11 Top-level orchestrator").

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use sau_engine::constants::DEFAULT_SAMPLE_RATE;
use sau_lang::diagnostics::Diagnostics;
use sauc::config::Config;

/// Compile and render a SAU script to raw 16-bit stereo PCM.
#[derive(Parser, Debug)]
#[command(name = "sauc", version, about)]
struct Cli {
    /// Path to the `.sau` script to render.
    script: PathBuf,

    /// Output path for raw interleaved 16-bit stereo PCM; defaults to
    /// stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Sample rate in Hz.
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Build the program and print a one-line summary without rendering.
    #[arg(long)]
    check_only: bool,

    /// Dump the built program as JSON to stdout instead of rendering.
    #[arg(long)]
    dump_program: bool,
}

impl Cli {
    /// Layers CLI flags over a loaded [`Config`]: only flags the user
    /// actually passed override the config file's values.
    fn apply_to(&self, mut cfg: Config) -> Config {
        if let Some(rate) = self.sample_rate {
            cfg.sample_rate = rate;
        }
        if self.check_only {
            cfg.check_only = true;
        }
        if self.dump_program {
            cfg.dump_program = true;
        }
        if self.output.is_some() {
            cfg.output = self.output.clone();
        }
        cfg
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sauc: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = cli.apply_to(Config::load_near(&cli.script)?);
    let sample_rate = if cfg.sample_rate == 0 {
        DEFAULT_SAMPLE_RATE
    } else {
        cfg.sample_rate
    };
    let cfg = Config {
        sample_rate,
        ..cfg
    };

    let diag = Diagnostics::standalone();
    let program = sauc::build_from_file(&cli.script, &diag)?;

    if cfg.dump_program {
        println!("{}", sauc::dump_program_json(&program)?);
        return Ok(());
    }

    if cfg.check_only {
        sauc::print_check_summary(&program);
        return Ok(());
    }

    let sink = sauc::open_sink(cfg.output.as_deref())?;
    sauc::render_to(program, &cfg, sink)
}
