//! Audio unlock gate and voice selection
//!
//! Platforms refuse to play sound or speech until the user has interacted
//! with the page. Nothing audible happens until [`AudioGate::on_user_gesture`]
//! has run once.

use tracing::{debug, info, warn};

use super::alerts::{Announcer, SoundPlayer};

/// One-way latch from locked to unlocked.
#[derive(Debug, Clone)]
pub struct AudioGate {
    volume: f32,
    unlocked: bool,
}

impl AudioGate {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
            unlocked: false,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Handle a user gesture. Returns `true` only for the gesture that unlocked.
    ///
    /// Loads the alert sound and primes the voice list. A load failure is
    /// logged; the gate still opens so speech keeps working.
    pub fn on_user_gesture(&mut self, sound: &dyn SoundPlayer, announcer: &dyn Announcer) -> bool {
        if self.unlocked {
            return false;
        }
        self.unlocked = true;

        if let Err(e) = sound.load(self.volume) {
            warn!(error = %e, "Failed to load alert sound");
        }
        let voices = announcer.voices();
        info!(voices = voices.len(), "Audio and speech unlocked");
        true
    }

    /// Play the alert sound if unlocked; failures are logged and swallowed
    pub fn play(&self, sound: &dyn SoundPlayer) -> bool {
        if !self.unlocked {
            debug!("Audio locked, skipping sound");
            return false;
        }
        match sound.play() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Sound play blocked");
                false
            }
        }
    }
}

/// First available voice whose name contains any preferred name.
///
/// Walks `available` in platform order, so the platform's ordering wins
/// over the order of `preferred`.
pub fn select_voice(available: &[String], preferred: &[String]) -> Option<String> {
    available
        .iter()
        .find(|voice| preferred.iter().any(|p| !p.is_empty() && voice.contains(p.as_str())))
        .cloned()
}
