//! Speech synthesizer adapters
//!
//! Speaking is fire-and-forget: a new utterance cancels whatever is still
//! being spoken.

use std::process::Stdio;

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// espeak-ng's default speaking speed, scaled by the configured rate
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Text-to-speech output
pub trait SpeechSynthesizer: Send + Sync {
    fn speak(&self, text: &str);

    /// Silence any utterance still playing
    fn cancel(&self);
}

/// Voice parameters shared by all adapters
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub language: String,
    pub rate: f32,
}

impl VoiceSettings {
    /// espeak voice name for the locale (`pt-BR` -> `pt-br`)
    pub fn voice(&self) -> String {
        self.language.to_lowercase()
    }

    pub fn words_per_minute(&self) -> u32 {
        (BASE_WORDS_PER_MINUTE * self.rate.max(0.1)).round() as u32
    }
}

/// Speaks through an external TTS program such as `espeak-ng`
pub struct CommandSynthesizer {
    program: String,
    settings: VoiceSettings,
    current: Mutex<Option<Child>>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, settings: VoiceSettings) -> Self {
        Self {
            program: program.into(),
            settings,
            current: Mutex::new(None),
        }
    }

    fn command(&self, text: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-v")
            .arg(self.settings.voice())
            .arg("-s")
            .arg(self.settings.words_per_minute().to_string())
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn speak(&self, text: &str) {
        let mut current = self.current.lock();
        if let Some(mut child) = current.take() {
            if let Err(e) = child.start_kill() {
                debug!(?e, "previous utterance already finished");
            }
        }

        match self.command(text).spawn() {
            Ok(child) => {
                debug!(program = %self.program, text, "speaking");
                *current = Some(child);
            }
            Err(e) => warn!(?e, program = %self.program, "failed to start speech synthesizer"),
        }
    }

    fn cancel(&self) {
        if let Some(mut child) = self.current.lock().take() {
            let _ = child.start_kill();
        }
    }
}

/// Writes utterances to the log instead of an audio device
#[derive(Debug)]
pub struct LogSynthesizer {
    settings: VoiceSettings,
}

impl LogSynthesizer {
    pub fn new(settings: VoiceSettings) -> Self {
        Self { settings }
    }
}

impl SpeechSynthesizer for LogSynthesizer {
    fn speak(&self, text: &str) {
        info!(language = %self.settings.language, rate = self.settings.rate, text, "speak");
    }

    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> VoiceSettings {
        VoiceSettings {
            language: "pt-BR".to_string(),
            rate: 1.1,
        }
    }

    #[test]
    fn test_voice_settings() {
        let settings = settings();
        assert_eq!(settings.voice(), "pt-br");
        assert_eq!(settings.words_per_minute(), 193);
    }

    #[test]
    fn test_command_arguments() {
        let synth = CommandSynthesizer::new("espeak-ng", settings());
        let command = synth.command("Sim?");
        let args: Vec<_> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["-v", "pt-br", "-s", "193", "Sim?"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_not_fatal() {
        let synth = CommandSynthesizer::new("definitely-not-a-tts-binary", settings());
        synth.speak("Olá");
        synth.speak("Olá de novo");
        synth.cancel();
        assert!(synth.current.lock().is_none());
    }
}
