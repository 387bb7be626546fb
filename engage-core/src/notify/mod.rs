//! Dashboard notifications
//!
//! [`NotificationDispatcher`] consumes scoped [`RealtimeEvent`](crate::channel::RealtimeEvent)s
//! and turns them into:
//! - toasts through a [`Toaster`]
//! - the alert sound through a [`SoundPlayer`], once audio is unlocked
//! - a spoken announcement for brand-new visitors through an [`Announcer`]
//! - changes to the shared [`UnreadCounters`]
//!
//! Playback failures never propagate; they are logged at warn.

pub mod alerts;
pub mod audio;
pub mod dispatcher;
pub mod state;

pub use alerts::{
    Announcer, RecordingAlerts, SoundPlayer, Toast, ToastAction, ToastLevel, Toaster, Utterance,
};
pub use audio::{select_voice, AudioGate};
pub use dispatcher::{Alerts, Effects, NotificationDispatcher};
pub use state::{seo_progress_key, SeoProgress, SharedShellState, ShellState, UnreadCounters};
