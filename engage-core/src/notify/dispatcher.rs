//! Turns realtime events into toasts, sounds, speech and counter changes

use std::sync::{Arc, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::alerts::{Announcer, SoundPlayer, Toast, Toaster, Utterance};
use super::audio::{select_voice, AudioGate};
use super::state::{seo_progress_key, SeoProgress, SharedShellState, ShellState};
use crate::channel::{
    EventSink, PresenceChange, RealtimeEvent, SeoDomain, SeoPayload, SeoPhase, SeoTopic,
    VisitorUpdate,
};
use crate::config::NotificationConfig;
use crate::error::Error;
use crate::store::KeyValueStore;

/// The three alert capabilities the dispatcher drives.
#[derive(Clone)]
pub struct Alerts {
    pub toaster: Arc<dyn Toaster>,
    pub sound: Arc<dyn SoundPlayer>,
    pub announcer: Arc<dyn Announcer>,
}

impl Alerts {
    pub fn new(
        toaster: Arc<dyn Toaster>,
        sound: Arc<dyn SoundPlayer>,
        announcer: Arc<dyn Announcer>,
    ) -> Self {
        Self {
            toaster,
            sound,
            announcer,
        }
    }

    /// Use one value for all three capabilities
    pub fn from_single<T>(alerts: Arc<T>) -> Self
    where
        T: Toaster + SoundPlayer + Announcer + 'static,
    {
        Self {
            toaster: alerts.clone(),
            sound: alerts.clone(),
            announcer: alerts,
        }
    }
}

/// What a single dispatch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    pub toast: bool,
    pub sound: bool,
    pub speech: bool,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        !self.toast && !self.sound && !self.speech
    }
}

type RefreshHook = Box<dyn FnMut(&str) + Send>;

/// Applies realtime events to the shell state and the alert capabilities.
///
/// Events are expected to be scoped to the viewer already; the dispatcher
/// does no tenant filtering of its own.
pub struct NotificationDispatcher {
    state: SharedShellState,
    alerts: Alerts,
    gate: AudioGate,
    new_visitor_window: Duration,
    preferred_voices: Vec<String>,
    announcement_text: String,
    last_announced: Option<String>,
    markers: Option<Arc<dyn KeyValueStore>>,
    onboarding_refresh: Option<RefreshHook>,
}

impl NotificationDispatcher {
    pub fn new(state: SharedShellState, alerts: Alerts, config: &NotificationConfig) -> Self {
        let window_ms = i64::try_from(config.new_visitor_window_ms).unwrap_or(i64::MAX);
        Self {
            state,
            alerts,
            gate: AudioGate::new(config.sound_volume),
            new_visitor_window: Duration::milliseconds(window_ms),
            preferred_voices: config.preferred_voices.clone(),
            announcement_text: config.announcement_text.clone(),
            last_announced: None,
            markers: None,
            onboarding_refresh: None,
        }
    }

    /// Persist SEO progress markers in `store` as well as in the shell state
    pub fn with_marker_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.markers = Some(store);
        self
    }

    /// Called with the organization id when its onboarding changed
    pub fn on_onboarding_update<F>(mut self, refresh: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.onboarding_refresh = Some(Box::new(refresh));
        self
    }

    pub fn state(&self) -> &SharedShellState {
        &self.state
    }

    pub fn audio_unlocked(&self) -> bool {
        self.gate.is_unlocked()
    }

    /// Visitor id of the most recent announcement
    pub fn last_announced(&self) -> Option<&str> {
        self.last_announced.as_deref()
    }

    /// Unlock audio on the first user gesture; later gestures are no-ops
    pub fn on_user_gesture(&mut self) -> bool {
        self.gate
            .on_user_gesture(self.alerts.sound.as_ref(), self.alerts.announcer.as_ref())
    }

    pub fn dispatch(&mut self, event: RealtimeEvent) -> Effects {
        self.dispatch_at(event, Utc::now())
    }

    /// Dispatch with an explicit clock, used to judge visitor age
    pub fn dispatch_at(&mut self, event: RealtimeEvent, now: DateTime<Utc>) -> Effects {
        let name = event.name();
        let effects = match event {
            RealtimeEvent::VisitorUpdate(update) => self.visitor_update(update, now),
            RealtimeEvent::TicketCreated(ticket) => {
                self.shell().counters.new_ticket_count += 1;
                self.toast(Toast::info(format!("New ticket created: {}", ticket.subject)))
                    .with_sound(self.play_sound())
            }
            RealtimeEvent::TicketUpdated(ticket) => self
                .toast(Toast::info(format!("Ticket updated: {}", ticket.subject)))
                .with_sound(self.play_sound()),
            RealtimeEvent::NewConversation(_) => {
                self.shell().counters.new_chat_count += 1;
                self.toast(Toast::info("New conversation started with chatbot"))
                    .with_sound(self.play_sound())
            }
            RealtimeEvent::Message(message) => {
                if !message.is_from_user() {
                    debug!(role = ?message.role, "Ignoring message not sent by a visitor");
                    return Effects::default();
                }
                self.toast(Toast::info("New message received from chatbot"))
                    .with_sound(self.play_sound())
            }
            RealtimeEvent::WhatsAppMessage(message) => {
                let target = {
                    let mut shell = self.shell();
                    shell.counters.new_chat_count += 1;
                    format!("/{}/chats/whatsapp", shell.current_role)
                };
                let toast = Toast::info("New WhatsApp message received")
                    .with_description(format!("From: {}", message.from_number))
                    .with_action("View", target);
                self.toast(toast).with_sound(self.play_sound())
            }
            RealtimeEvent::Seo(topic, payload) => self.seo(&topic, payload),
            RealtimeEvent::OnboardingUpdated(update) => {
                let organization_id = update.organization_id.unwrap_or_default();
                match self.onboarding_refresh.as_mut() {
                    Some(refresh) => refresh(&organization_id),
                    None => {
                        debug!(organization_id = %organization_id, "No onboarding refresh hook")
                    }
                }
                Effects::default()
            }
            RealtimeEvent::OpenChat(_) => {
                debug!("open_chat is handled by the widget, not the dashboard");
                Effects::default()
            }
        };

        debug!(event = %name, ?effects, "Dispatched event");
        effects
    }

    fn visitor_update(&mut self, update: VisitorUpdate, now: DateTime<Utc>) -> Effects {
        let visitor = update.visitor;
        match update.change {
            PresenceChange::Connected if visitor.is_online == Some(true) => {
                {
                    let mut shell = self.shell();
                    shell.counters.traffic_count = shell.counters.traffic_count.saturating_add(1);
                }

                let is_new = visitor
                    .created_at()
                    .is_some_and(|created| {
                        now.signed_duration_since(created) < self.new_visitor_window
                    });

                if is_new {
                    let spoke = match visitor.visitor_id.as_deref() {
                        Some(id) => self.speak_new_user(id),
                        None => false,
                    };
                    let mut effects = self.toast(Toast::info("New visitor is browsing your site."));
                    effects.speech = spoke;
                    effects
                } else {
                    self.toast(Toast::info("Returning visitor reconnected."))
                }
            }
            PresenceChange::Disconnected if visitor.is_online == Some(false) => {
                {
                    let mut shell = self.shell();
                    shell.counters.traffic_count = shell.counters.traffic_count.saturating_sub(1);
                }
                self.toast(Toast::info("A visitor left your site."))
            }
            change => {
                debug!(?change, is_online = ?visitor.is_online, "Ignoring presence update");
                Effects::default()
            }
        }
    }

    fn seo(&mut self, topic: &SeoTopic, payload: SeoPayload) -> Effects {
        let label = match topic.domain {
            SeoDomain::Performance => "SEO Performance audit",
            SeoDomain::Compliance => "SEO Compliance check",
        };

        match topic.phase {
            SeoPhase::Started => {
                let progress = SeoProgress {
                    started_at: payload.started_at,
                    estimated_time: payload.estimated_time,
                };
                self.store_marker(topic.domain, Some(&progress));
                self.shell().set_seo_progress(topic.domain, progress);
                self.toast(Toast::success(format!("{} started.", label)))
            }
            SeoPhase::Completed => {
                self.store_marker(topic.domain, None);
                self.shell().clear_seo_progress(topic.domain);
                self.toast(Toast::success(format!("{} completed.", label)))
                    .with_sound(self.play_sound())
            }
            SeoPhase::Error => {
                self.store_marker(topic.domain, None);
                self.shell().clear_seo_progress(topic.domain);
                let title = payload
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("{} failed.", label));
                self.toast(Toast::error(title))
            }
        }
    }

    fn store_marker(&self, domain: SeoDomain, progress: Option<&SeoProgress>) {
        let Some(store) = self.markers.as_ref() else {
            return;
        };
        let key = seo_progress_key(domain);
        let result = match progress {
            Some(progress) => serde_json::to_string(progress)
                .map_err(Error::from)
                .and_then(|json| store.set(key, &json)),
            None => store.remove(key),
        };
        if let Err(e) = result {
            warn!(key, error = %e, "Failed to persist SEO progress marker");
        }
    }

    fn speak_new_user(&mut self, visitor_id: &str) -> bool {
        if self.last_announced.as_deref() == Some(visitor_id) {
            debug!(visitor_id, "Visitor already announced");
            return false;
        }
        self.last_announced = Some(visitor_id.to_string());

        if !self.gate.is_unlocked() {
            debug!(visitor_id, "Audio locked, skipping announcement");
            return false;
        }

        let voice = select_voice(&self.alerts.announcer.voices(), &self.preferred_voices);
        let utterance = Utterance::announcement(self.announcement_text.clone(), voice);
        match self.alerts.announcer.speak(&utterance) {
            Ok(()) => {
                info!(visitor_id, voice = ?utterance.voice, "Announced new visitor");
                true
            }
            Err(e) => {
                warn!(visitor_id, error = %e, "Speech failed");
                false
            }
        }
    }

    fn play_sound(&self) -> bool {
        self.gate.play(self.alerts.sound.as_ref())
    }

    fn toast(&self, toast: Toast) -> Effects {
        self.alerts.toaster.toast(toast);
        Effects {
            toast: true,
            ..Effects::default()
        }
    }

    fn shell(&self) -> MutexGuard<'_, ShellState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Effects {
    fn with_sound(mut self, played: bool) -> Self {
        self.sound = played;
        self
    }
}

impl EventSink for NotificationDispatcher {
    fn deliver(&mut self, event: RealtimeEvent) {
        self.dispatch(event);
    }
}
