//! Root-binary configuration (spec.md §6/§7 ambient concerns the library
//! crates deliberately don't own).
//!
//! Loaded from an optional `sauc.toml` beside the script and then
//! overridden field-by-field by CLI flags (`Cli::apply_to`); `sau_lang` and
//! `sau_engine` never read files or environment themselves, they only ever
//! take explicit constructor parameters.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use sau_engine::constants::DEFAULT_SAMPLE_RATE;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sample_rate: u32,
    pub check_only: bool,
    pub output: Option<PathBuf>,
    pub dump_program: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            sample_rate: DEFAULT_SAMPLE_RATE,
            check_only: false,
            output: None,
            dump_program: false,
        }
    }
}

impl Config {
    /// Loads `sauc.toml` next to `script_path` if present; a missing config
    /// file is not an error, it just means "all defaults" (spec.md's config
    /// layer is additive, never required).
    pub fn load_near(script_path: &Path) -> anyhow::Result<Config> {
        let candidate = script_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("sauc.toml");
        if !candidate.exists() {
            return Ok(Config::default());
        }
        let text = fs::read_to_string(&candidate)?;
        let cfg: Config = toml::from_str(&text)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let cfg = Config::load_near(Path::new("/nonexistent/dir/script.sau")).unwrap();
        assert_eq!(cfg.sample_rate, DEFAULT_SAMPLE_RATE);
        assert!(!cfg.check_only);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let cfg: Config = toml::from_str("sample_rate = 44100\n").unwrap();
        assert_eq!(cfg.sample_rate, 44_100);
        assert!(!cfg.check_only);
        assert!(cfg.output.is_none());
    }
}
