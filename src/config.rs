//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::interpreter::{ServiceSettings, DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::speech::VoiceSettings;
use crate::state::PipelineSettings;

/// Where transcripts come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerBackend {
    /// Lines typed on stdin
    Console,
    /// No speech capability; the pipeline stays idle
    None,
}

impl FromStr for RecognizerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "none" | "off" => Ok(Self::None),
            other => bail!("unknown recognizer backend: {other}"),
        }
    }
}

/// Where reminders are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderBackend {
    File,
    /// Offline/demo mode, nothing survives a restart
    Memory,
}

impl FromStr for ReminderBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" | "demo" => Ok(Self::Memory),
            other => bail!("unknown reminder backend: {other}"),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    pub reminders_path: PathBuf,
    pub reminder_backend: ReminderBackend,

    pub language: String,
    pub wake_phrases: Vec<String>,
    pub acknowledgment: String,
    pub capture_delay: Duration,
    pub speech_rate: f32,

    pub recognizer: RecognizerBackend,
    /// External TTS program; `None` logs utterances instead
    pub tts_command: Option<String>,

    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = match var("SMART_HOME_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = var("HOME").ok_or_else(|| anyhow!("HOME is not set"))?;
                PathBuf::from(home).join(".local").join("share").join("smart-home")
            }
        };

        let wake_phrases: Vec<String> = var("SMART_HOME_WAKE_PHRASES")
            .unwrap_or_else(|| "smart home,ok smart".to_string())
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if wake_phrases.is_empty() {
            bail!("SMART_HOME_WAKE_PHRASES has no usable phrase");
        }

        let capture_delay_ms: u64 = parse_or(&var, "SMART_HOME_CAPTURE_DELAY_MS", 1000)?;
        let speech_rate: f32 = parse_or(&var, "SMART_HOME_SPEECH_RATE", 1.1)?;
        let timeout_secs: u64 = parse_or(&var, "SMART_HOME_HTTP_TIMEOUT_SECS", 30)?;

        let tts_command = match var("SMART_HOME_TTS_COMMAND") {
            Some(cmd) if cmd.eq_ignore_ascii_case("none") => None,
            Some(cmd) => Some(cmd),
            None => Some("espeak-ng".to_string()),
        };

        Ok(Self {
            socket_path: data_dir.join("daemon.sock"),
            reminders_path: data_dir.join("reminders.json"),
            data_dir,
            reminder_backend: parse_or(&var, "SMART_HOME_REMINDERS", ReminderBackend::File)?,
            language: var("SMART_HOME_LANGUAGE").unwrap_or_else(|| "pt-BR".to_string()),
            wake_phrases,
            acknowledgment: var("SMART_HOME_ACK_PHRASE").unwrap_or_else(|| "Sim?".to_string()),
            capture_delay: Duration::from_millis(capture_delay_ms),
            speech_rate,
            recognizer: parse_or(&var, "SMART_HOME_RECOGNIZER", RecognizerBackend::Console)?,
            tts_command,
            api_key: var("GEMINI_API_KEY").or_else(|| var("API_KEY")),
            model: var("SMART_HOME_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: var("SMART_HOME_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            language: self.language.clone(),
            wake_phrases: self.wake_phrases.clone(),
            acknowledgment: self.acknowledgment.clone(),
            capture_delay: self.capture_delay,
            ..Default::default()
        }
    }

    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            language: self.language.clone(),
            rate: self.speech_rate,
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            base_url: self.api_base.clone(),
            timeout: self.http_timeout,
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("invalid value for {key} ({raw:?}): {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("HOME", "/home/display")]).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/home/display/.local/share/smart-home"));
        assert!(config.socket_path.ends_with("daemon.sock"));
        assert!(config.reminders_path.ends_with("reminders.json"));
        assert_eq!(config.wake_phrases, ["smart home", "ok smart"]);
        assert_eq!(config.acknowledgment, "Sim?");
        assert_eq!(config.capture_delay, Duration::from_millis(1000));
        assert_eq!(config.language, "pt-BR");
        assert_eq!(config.recognizer, RecognizerBackend::Console);
        assert_eq!(config.reminder_backend, ReminderBackend::File);
        assert_eq!(config.tts_command.as_deref(), Some("espeak-ng"));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("SMART_HOME_DATA_DIR", "/var/lib/display"),
            ("SMART_HOME_WAKE_PHRASES", " Hey Casa , , ok casa"),
            ("SMART_HOME_CAPTURE_DELAY_MS", "250"),
            ("SMART_HOME_TTS_COMMAND", "none"),
            ("SMART_HOME_RECOGNIZER", "none"),
            ("SMART_HOME_REMINDERS", "memory"),
            ("API_KEY", "fallback-key"),
        ])
        .unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/var/lib/display/daemon.sock"));
        assert_eq!(config.wake_phrases, ["Hey Casa", "ok casa"]);
        assert_eq!(config.capture_delay, Duration::from_millis(250));
        assert!(config.tts_command.is_none());
        assert_eq!(config.recognizer, RecognizerBackend::None);
        assert_eq!(config.reminder_backend, ReminderBackend::Memory);
        assert_eq!(config.api_key.as_deref(), Some("fallback-key"));
    }

    #[test]
    fn test_gemini_key_preferred() {
        let config = load(&[
            ("HOME", "/root"),
            ("GEMINI_API_KEY", "primary"),
            ("API_KEY", "fallback"),
        ])
        .unwrap();
        assert_eq!(config.service_settings().api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_invalid_values() {
        assert_err!(load(&[("HOME", "/root"), ("SMART_HOME_CAPTURE_DELAY_MS", "soon")]));
        assert_err!(load(&[("HOME", "/root"), ("SMART_HOME_RECOGNIZER", "cloud")]));
        assert_err!(load(&[("HOME", "/root"), ("SMART_HOME_WAKE_PHRASES", " , ")]));
        assert_err!(load(&[]));
        assert_ok!(load(&[("SMART_HOME_DATA_DIR", "/srv/display")]));
    }

    #[test]
    fn test_pipeline_settings() {
        let config = load(&[("HOME", "/root"), ("SMART_HOME_SPEECH_RATE", "1.5")]).unwrap();
        let settings = config.pipeline_settings();
        assert_eq!(settings.acknowledgment, "Sim?");
        assert_eq!(settings.wake_phrases.len(), 2);
        assert_eq!(config.voice_settings().rate, 1.5);
    }
}
