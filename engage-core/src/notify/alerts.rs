//! Alert capabilities and their recording implementation
//!
//! The dispatcher never touches a real screen or speaker; it talks to a
//! [`Toaster`], a [`SoundPlayer`] and an [`Announcer`].

use std::sync::Mutex;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

impl ToastLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToastLevel::Info => "info",
            ToastLevel::Success => "success",
            ToastLevel::Error => "error",
        }
    }
}

/// A button on a toast that navigates within the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastAction {
    pub label: String,
    pub target: String,
}

/// An ephemeral message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: String,
    pub description: Option<String>,
    pub action: Option<ToastAction>,
}

impl Toast {
    fn new(level: ToastLevel, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: None,
            action: None,
        }
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(ToastLevel::Info, title)
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(ToastLevel::Success, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(ToastLevel::Error, title)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_action(mut self, label: impl Into<String>, target: impl Into<String>) -> Self {
        self.action = Some(ToastAction {
            label: label.into(),
            target: target.into(),
        });
        self
    }
}

/// A speech request.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Voice name; `None` means the platform default
    pub voice: Option<String>,
}

impl Utterance {
    /// Announcement with the dashboard's speech settings
    pub fn announcement(text: impl Into<String>, voice: Option<String>) -> Self {
        Self {
            text: text.into(),
            lang: "en-US".to_string(),
            rate: 0.9,
            pitch: 0.8,
            volume: 0.8,
            voice,
        }
    }
}

/// Shows toasts.
pub trait Toaster: Send + Sync {
    fn toast(&self, toast: Toast);
}

/// Plays the alert sound.
pub trait SoundPlayer: Send + Sync {
    /// Prepare the sound at `volume` (0.0 - 1.0)
    fn load(&self, volume: f32) -> Result<()>;

    /// Play from the start
    fn play(&self) -> Result<()>;
}

/// Speaks announcements.
pub trait Announcer: Send + Sync {
    /// Names of the available voices
    fn voices(&self) -> Vec<String>;

    fn speak(&self, utterance: &Utterance) -> Result<()>;
}

#[derive(Debug, Default)]
struct Recorded {
    toasts: Vec<Toast>,
    loads: Vec<f32>,
    plays: usize,
    utterances: Vec<Utterance>,
    voice_queries: usize,
}

/// Implements every capability by recording what was asked of it.
///
/// Playback and speech can be made to fail to exercise blocked-audio paths.
#[derive(Debug, Default)]
pub struct RecordingAlerts {
    voices: Vec<String>,
    fail_playback: bool,
    recorded: Mutex<Recorded>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report these voices as available
    pub fn with_voices<I, S>(mut self, voices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.voices = voices.into_iter().map(Into::into).collect();
        self
    }

    /// Make `play` and `speak` fail as if blocked by the platform
    pub fn failing_playback(mut self) -> Self {
        self.fail_playback = true;
        self
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.recorded().toasts.clone()
    }

    pub fn toast_titles(&self) -> Vec<String> {
        self.recorded().toasts.iter().map(|t| t.title.clone()).collect()
    }

    /// Successful `play` calls
    pub fn plays(&self) -> usize {
        self.recorded().plays
    }

    /// Volumes passed to `load`
    pub fn loads(&self) -> Vec<f32> {
        self.recorded().loads.clone()
    }

    /// Successful `speak` calls
    pub fn utterances(&self) -> Vec<Utterance> {
        self.recorded().utterances.clone()
    }

    /// How many times the voice list was read
    pub fn voice_queries(&self) -> usize {
        self.recorded().voice_queries
    }
}

impl Toaster for RecordingAlerts {
    fn toast(&self, toast: Toast) {
        self.recorded().toasts.push(toast);
    }
}

impl SoundPlayer for RecordingAlerts {
    fn load(&self, volume: f32) -> Result<()> {
        self.recorded().loads.push(volume);
        Ok(())
    }

    fn play(&self) -> Result<()> {
        if self.fail_playback {
            return Err(Error::Playback("autoplay blocked".to_string()));
        }
        self.recorded().plays += 1;
        Ok(())
    }
}

impl Announcer for RecordingAlerts {
    fn voices(&self) -> Vec<String> {
        self.recorded().voice_queries += 1;
        self.voices.clone()
    }

    fn speak(&self, utterance: &Utterance) -> Result<()> {
        if self.fail_playback {
            return Err(Error::Playback("speech synthesis unavailable".to_string()));
        }
        self.recorded().utterances.push(utterance.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toast_builders() {
        let toast = Toast::info("New WhatsApp message received")
            .with_description("From: +100")
            .with_action("View", "/admin/chats/whatsapp");
        assert_eq!(toast.level, ToastLevel::Info);
        assert_eq!(toast.description.as_deref(), Some("From: +100"));
        assert_eq!(toast.action.unwrap().target, "/admin/chats/whatsapp");
    }

    #[test]
    fn test_failing_playback() {
        let alerts = RecordingAlerts::new().failing_playback();
        assert!(alerts.play().is_err());
        assert!(alerts
            .speak(&Utterance::announcement("hi", None))
            .is_err());
        assert_eq!(alerts.plays(), 0);
    }
}
