//! Audio renderer that shells out to an external player.
//!
//! `(category, key)` is resolved through the cue catalogue to a sound file
//! stem; the first of `<stem>.wav`, `.mp3`, `.ogg` found under `sounds_dir`
//! is played with `<player> <file>`, retrying a few times on failure.

use crate::error::{HwError, Result};
use medibox_traits::{AudioCue, AudioSink};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

const EXTENSIONS: [&str; 3] = ["wav", "mp3", "ogg"];

#[derive(Debug, Clone)]
pub struct CommandPlayer {
    sounds_dir: PathBuf,
    player: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl CommandPlayer {
    pub fn new(sounds_dir: impl Into<PathBuf>, player: impl Into<String>) -> Self {
        Self {
            sounds_dir: sounds_dir.into(),
            player: player.into(),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn from_config(cfg: &medibox_config::Audio) -> Self {
        Self::new(&cfg.sounds_dir, &cfg.player)
            .with_retries(cfg.retry_attempts, Duration::from_millis(cfg.retry_delay_ms))
    }

    pub fn sounds_dir(&self) -> &Path {
        &self.sounds_dir
    }

    /// Sound file for a cue address.
    pub fn resolve(&self, category: &str, key: &str) -> Result<PathBuf> {
        let not_found = || HwError::SoundNotFound {
            category: category.to_owned(),
            key: key.to_owned(),
        };
        let cue = AudioCue::parse(category, key).ok_or_else(not_found)?;
        EXTENSIONS
            .iter()
            .map(|ext| self.sounds_dir.join(format!("{}.{ext}", cue.sound_name())))
            .find(|p| p.is_file())
            .ok_or_else(not_found)
    }

    /// Cue addresses whose sound file is missing.
    pub fn missing_sounds(&self) -> Vec<AudioCue> {
        AudioCue::ALL
            .into_iter()
            .filter(|c| self.resolve(c.category().as_str(), c.key()).is_err())
            .collect()
    }

    fn play_file(&self, file: &Path) -> Result<()> {
        let status = Command::new(&self.player)
            .arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(HwError::Player(status.to_string()))
        }
    }

    pub fn play(&self, category: &str, key: &str) -> Result<()> {
        let file = self.resolve(category, key)?;
        let mut last = None;
        for attempt in 1..=self.retry_attempts {
            match self.play_file(&file) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(attempt, file = %file.display(), error = %e, "playback attempt failed");
                    last = Some(e);
                    if attempt < self.retry_attempts {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        Err(last.unwrap_or_else(|| HwError::Player("no attempts".into())))
    }
}

impl AudioSink for CommandPlayer {
    fn play_alert(&self, category: &str, key: &str) -> bool {
        match self.play(category, key) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(category, key, error = %e, "audio alert not played");
                false
            }
        }
    }
}

/// Renderer for runs without speakers: logs the cue and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyAudio;

impl AudioSink for LogOnlyAudio {
    fn play_alert(&self, category: &str, key: &str) -> bool {
        tracing::info!(category, key, "audio cue (not played)");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_by_extension_priority() {
        let dir = tempfile::tempdir().expect("tmp");
        let stem = AudioCue::parse("medication", "dispensing")
            .expect("cue")
            .sound_name();
        std::fs::write(dir.path().join(format!("{stem}.ogg")), b"").expect("ogg");
        let p = CommandPlayer::new(dir.path(), "true");
        let got = p.resolve("medication", "dispensing").expect("found");
        assert!(got.ends_with(format!("{stem}.ogg")));
        std::fs::write(dir.path().join(format!("{stem}.wav")), b"").expect("wav");
        let got = p.resolve("medication", "dispensing").expect("found");
        assert!(got.ends_with(format!("{stem}.wav")));
    }

    #[test]
    fn unknown_cue_and_missing_file() {
        let dir = tempfile::tempdir().expect("tmp");
        let p = CommandPlayer::new(dir.path(), "true");
        assert!(matches!(
            p.resolve("health", "sneeze"),
            Err(HwError::SoundNotFound { .. })
        ));
        assert!(matches!(
            p.resolve("health", "high_temp"),
            Err(HwError::SoundNotFound { .. })
        ));
        assert_eq!(p.missing_sounds().len(), AudioCue::ALL.len());
        assert!(!p.play_alert("health", "high_temp"));
    }
}
