use crate::engine::EngineError;
use crate::hotkey::{parse_hotkey, HotkeyBindings};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_record_hotkey() -> String {
    "F1".into()
}

fn default_play_hotkey() -> String {
    "F2".into()
}

fn default_cancel_hotkey() -> String {
    "Esc".into()
}

fn default_click_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Toggle recording. Defaults to `F1`.
    #[serde(default = "default_record_hotkey")]
    pub record_hotkey: String,
    /// Toggle playback. Defaults to `F2`.
    #[serde(default = "default_play_hotkey")]
    pub play_hotkey: String,
    /// Stop everything. Defaults to `Esc`.
    #[serde(default = "default_cancel_hotkey")]
    pub cancel_hotkey: String,
    /// Animation delay stamped onto newly recorded clicks.
    #[serde(default = "default_click_delay_ms")]
    pub click_delay_ms: u64,
    #[serde(default)]
    pub loop_playback: bool,
    /// When enabled the application initialises the logger at debug level.
    #[serde(default)]
    pub debug_logging: bool,
    /// Optional log file; logs go to stderr when absent.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            record_hotkey: default_record_hotkey(),
            play_hotkey: default_play_hotkey(),
            cancel_hotkey: default_cancel_hotkey(),
            click_delay_ms: default_click_delay_ms(),
            loop_playback: false,
            debug_logging: false,
            log_file: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing or empty file yields defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the configured hotkey strings into bindings, naming the
    /// offending field on failure.
    pub fn bindings(&self) -> anyhow::Result<HotkeyBindings> {
        let record = parse_hotkey(&self.record_hotkey)
            .ok_or_else(|| anyhow!("invalid record hotkey: '{}'", self.record_hotkey))?;
        let play = parse_hotkey(&self.play_hotkey)
            .ok_or_else(|| anyhow!("invalid play hotkey: '{}'", self.play_hotkey))?;
        let cancel = parse_hotkey(&self.cancel_hotkey)
            .ok_or_else(|| anyhow!("invalid cancel hotkey: '{}'", self.cancel_hotkey))?;
        Ok(HotkeyBindings {
            record,
            play,
            cancel,
        })
    }
}

/// Validate free-form delay text from the shell. Negative and non-numeric
/// input is rejected here so the engine never observes it.
pub fn parse_delay_input(input: &str) -> Result<u64, EngineError> {
    input
        .trim()
        .parse::<u64>()
        .map_err(|_| EngineError::InvalidDelay(input.to_string()))
}
