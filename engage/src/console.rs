//! Alerts rendered to the terminal

use engage_core::channel::{EventSink, RealtimeEvent};
use engage_core::notify::{Announcer, SoundPlayer, Toast, ToastLevel, Toaster, Utterance};

/// Prints toasts, sounds and speech to stdout.
#[derive(Debug, Default)]
pub struct ConsoleAlerts;

impl Toaster for ConsoleAlerts {
    fn toast(&self, toast: Toast) {
        let marker = match toast.level {
            ToastLevel::Info => "i",
            ToastLevel::Success => "+",
            ToastLevel::Error => "!",
        };
        println!("[{}] {}", marker, toast.title);
        if let Some(description) = &toast.description {
            println!("    {}", description);
        }
        if let Some(action) = &toast.action {
            println!("    {} -> {}", action.label, action.target);
        }
    }
}

impl SoundPlayer for ConsoleAlerts {
    fn load(&self, volume: f32) -> engage_core::Result<()> {
        tracing::debug!(volume, "Console sound ready");
        Ok(())
    }

    fn play(&self) -> engage_core::Result<()> {
        println!("    (sound)");
        Ok(())
    }
}

impl Announcer for ConsoleAlerts {
    fn voices(&self) -> Vec<String> {
        Vec::new()
    }

    fn speak(&self, utterance: &Utterance) -> engage_core::Result<()> {
        println!("    (speech) \"{}\"", utterance.text);
        Ok(())
    }
}

/// Prints open-chat requests received on the visitor channel.
#[derive(Debug, Default)]
pub struct ConsoleOpenChat;

impl EventSink for ConsoleOpenChat {
    fn deliver(&mut self, event: RealtimeEvent) {
        if let RealtimeEvent::OpenChat(request) = event {
            println!(
                "[i] Open chat requested: {}",
                request.conversation_id.as_deref().unwrap_or("(none)")
            );
        }
    }
}
