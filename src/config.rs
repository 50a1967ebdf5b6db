//! Configuration for the analysis pipeline.
//!
//! Stores settings in ~/.config/codescout/config.json. Every numeric
//! knob is range-validated at the boundary; the analyzers themselves
//! assume a valid config. The tuned values (confidence floors, output
//! cap, TTL) are deliberately knobs, not constants — they were tuned
//! by hand and are not semantically load-bearing.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Master toggle; disabled means every analysis returns empty.
    #[serde(default = "default_true")]
    pub enable_error_detection: bool,
    /// Diagnostics below this confidence are dropped from the output.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    /// Advisor findings below this confidence are discarded at parse.
    #[serde(default = "default_advisor_threshold")]
    pub advisor_confidence_threshold: f64,
    /// Upper bound on the returned diagnostic list.
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "default_advisor_timeout_secs")]
    pub advisor_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_advisor")]
    pub max_concurrent_advisor: usize,
    /// Fragments outside [min, max] bytes skip the advisor; fragments
    /// above max skip analysis entirely.
    #[serde(default = "default_min_fragment_len")]
    pub min_fragment_len: usize,
    #[serde(default = "default_max_fragment_len")]
    pub max_fragment_len: usize,
    /// Skip the advisor when the cheap stages already found this many.
    #[serde(default = "default_max_existing_for_advisor")]
    pub max_existing_for_advisor: usize,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_advisor_max_tokens")]
    pub advisor_max_tokens: u32,
    #[serde(default = "default_advisor_temperature")]
    pub advisor_temperature: f32,
}

fn default_true() -> bool {
    true
}
fn default_confidence_floor() -> f64 {
    0.5
}
fn default_advisor_threshold() -> f64 {
    0.98
}
fn default_max_diagnostics() -> usize {
    3
}
fn default_cache_ttl_secs() -> u64 {
    600
}
fn default_cache_max_entries() -> usize {
    200
}
fn default_advisor_timeout_secs() -> u64 {
    15
}
fn default_max_concurrent_advisor() -> usize {
    3
}
fn default_min_fragment_len() -> usize {
    50
}
fn default_max_fragment_len() -> usize {
    100_000
}
fn default_max_existing_for_advisor() -> usize {
    5
}
fn default_model() -> String {
    "deepseek/deepseek-chat".to_string()
}
fn default_advisor_max_tokens() -> u32 {
    1024
}
fn default_advisor_temperature() -> f32 {
    0.1
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enable_error_detection: default_true(),
            confidence_floor: default_confidence_floor(),
            advisor_confidence_threshold: default_advisor_threshold(),
            max_diagnostics: default_max_diagnostics(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            advisor_timeout_secs: default_advisor_timeout_secs(),
            max_concurrent_advisor: default_max_concurrent_advisor(),
            min_fragment_len: default_min_fragment_len(),
            max_fragment_len: default_max_fragment_len(),
            max_existing_for_advisor: default_max_existing_for_advisor(),
            model: default_model(),
            advisor_max_tokens: default_advisor_max_tokens(),
            advisor_temperature: default_advisor_temperature(),
        }
    }
}

impl AnalysisConfig {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("codescout"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return defaults. A corrupt file is
    /// preserved alongside for inspection, never silently clobbered.
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        eprintln!(
                            "  Warning: Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                            err
                        );
                    }
                }
            }
        }
        Self::default()
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        fs::create_dir_all(&dir)?;
        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Range-check every knob. Called at the boundary so the pipeline
    /// never has to re-validate.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            bail!("confidence_floor must be in [0, 1], got {}", self.confidence_floor);
        }
        if !(0.0..=1.0).contains(&self.advisor_confidence_threshold) {
            bail!(
                "advisor_confidence_threshold must be in [0, 1], got {}",
                self.advisor_confidence_threshold
            );
        }
        if self.max_diagnostics == 0 {
            bail!("max_diagnostics must be at least 1");
        }
        if self.cache_ttl_secs == 0 {
            bail!("cache_ttl_secs must be positive");
        }
        if self.cache_max_entries == 0 {
            bail!("cache_max_entries must be positive");
        }
        if !(1..=300).contains(&self.advisor_timeout_secs) {
            bail!(
                "advisor_timeout_secs must be in [1, 300], got {}",
                self.advisor_timeout_secs
            );
        }
        if self.max_concurrent_advisor == 0 {
            bail!("max_concurrent_advisor must be at least 1");
        }
        if self.min_fragment_len >= self.max_fragment_len {
            bail!(
                "min_fragment_len ({}) must be below max_fragment_len ({})",
                self.min_fragment_len,
                self.max_fragment_len
            );
        }
        if !(0.0..=2.0).contains(&self.advisor_temperature) {
            bail!(
                "advisor_temperature must be in [0, 2], got {}",
                self.advisor_temperature
            );
        }
        Ok(())
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
