//! Per-page-view tracking state machine
//!
//! ```text
//!            hidden (bounce)              unload (bounce)
//!  Visible ─────────────────▶ Hidden      Visible ────────▶ Unloaded
//!     ▲                          │        Hidden  ────────▶ Unloaded
//!     └──────── visible ─────────┘
//! ```
//!
//! A bounce is emitted when leaving `Visible`, so at most once per visible
//! period. The time-on-page interval only runs while `Visible` and restarts
//! from zero whenever the page becomes visible again.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::collector::{
    now_millis, origin_of, BounceEvent, ClickEvent, ComplaintUrlEvent, PageViewEvent, Publisher,
    ScrollEvent, TimeOnPageEvent, TrackingEvent, UtmParams,
};
use crate::store::keys;

use super::context::PageInfo;

/// Referrer reported when neither the tab nor the browser knows one
pub const DIRECT_REFERRER: &str = "direct";

/// How often [`run_time_on_page`] polls [`SessionTracker::tick`]
const TICK_GRANULARITY: Duration = Duration::from_secs(1);

/// Page visibility as seen by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
    /// Terminal: the page is going away
    Unloaded,
}

/// Tracking state for one page view.
pub struct SessionTracker {
    publisher: Arc<Publisher>,
    chatbot_id: String,
    page: PageInfo,
    interval: Duration,
    visibility: Visibility,
    started: bool,
    has_scrolled: bool,
    interacted: bool,
    period_start: Instant,
}

impl SessionTracker {
    pub fn new(
        publisher: Arc<Publisher>,
        chatbot_id: impl Into<String>,
        page: PageInfo,
        interval: Duration,
        now: Instant,
    ) -> Self {
        Self {
            publisher,
            chatbot_id: chatbot_id.into(),
            page,
            interval,
            visibility: Visibility::Visible,
            started: false,
            has_scrolled: false,
            interacted: false,
            period_start: now,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Whether the visitor clicked inside the widget during this page view
    pub fn interacted_with_widget(&self) -> bool {
        self.interacted
    }

    /// Emit the page view and site origin, once per page view.
    ///
    /// Returns false if the page view was already started.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        self.period_start = now;

        let referrer = self.resolve_referrer();
        let transient = self.publisher.identity().transient_store();
        if let Err(e) = transient.set(keys::PREV_URL, &self.page.url) {
            tracing::warn!(error = %e, "Failed to remember previous URL");
        }

        self.publisher.publish(&TrackingEvent::PageView(PageViewEvent {
            chatbot_id: self.chatbot_id.clone(),
            url: self.page.url.clone(),
            referrer,
            user_agent: self.publisher.client_info().user_agent.clone(),
            timestamp: now_millis(),
            utm: UtmParams::from_url(&self.page.url),
        }));

        match origin_of(&self.page.url) {
            Some(base_url) => {
                self.publisher
                    .publish(&TrackingEvent::ComplaintUrl(ComplaintUrlEvent {
                        chatbot_id: self.chatbot_id.clone(),
                        base_url,
                        timestamp: now_millis(),
                    }));
            }
            None => tracing::debug!(url = %self.page.url, "Page has no origin, skipping base URL"),
        }

        true
    }

    /// Previous URL in this tab, then the document referrer, then `direct`
    fn resolve_referrer(&self) -> String {
        let transient = self.publisher.identity().transient_store();
        let previous = match transient.get(keys::PREV_URL) {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read previous URL");
                None
            }
        };

        previous
            .filter(|url| !url.is_empty())
            .or_else(|| Some(self.page.document_referrer.clone()).filter(|r| !r.is_empty()))
            .unwrap_or_else(|| DIRECT_REFERRER.to_string())
    }

    /// Record a scroll; only the first positive offset is reported.
    pub fn record_scroll(&mut self, scroll_y: f64) -> bool {
        if self.has_scrolled || scroll_y <= 0.0 || self.visibility == Visibility::Unloaded {
            return false;
        }
        self.has_scrolled = true;
        self.publisher.publish(&TrackingEvent::Scroll(ScrollEvent {
            chatbot_id: self.chatbot_id.clone(),
            scroll_y,
            timestamp: now_millis(),
        }))
    }

    /// Record a click; only clicks inside the widget are reported.
    pub fn record_click(&mut self, inside_widget: bool) -> bool {
        if !inside_widget || self.visibility == Visibility::Unloaded {
            return false;
        }
        self.interacted = true;
        self.publisher.publish(&TrackingEvent::Click(ClickEvent {
            chatbot_id: self.chatbot_id.clone(),
            timestamp: now_millis(),
        }))
    }

    /// Report time on page if a full interval elapsed while visible.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.visibility != Visibility::Visible {
            return false;
        }
        let elapsed = now.saturating_duration_since(self.period_start);
        if elapsed < self.interval {
            return false;
        }

        self.period_start = now;
        self.publisher
            .publish(&TrackingEvent::TimeOnPage(TimeOnPageEvent {
                chatbot_id: self.chatbot_id.clone(),
                url: self.page.url.clone(),
                time_spent_ms: duration_millis(elapsed),
            }));
        true
    }

    /// The page became hidden. Returns whether a bounce was emitted.
    pub fn visibility_hidden(&mut self, now: Instant) -> bool {
        if self.visibility != Visibility::Visible {
            return false;
        }
        self.visibility = Visibility::Hidden;
        self.bounce(now);
        true
    }

    /// The page became visible again; the interval restarts.
    pub fn visibility_visible(&mut self, now: Instant) {
        if self.visibility == Visibility::Hidden {
            self.visibility = Visibility::Visible;
            self.period_start = now;
        }
    }

    /// The page is unloading. Returns whether a bounce was emitted.
    pub fn unload(&mut self, now: Instant) -> bool {
        let was_visible = self.visibility == Visibility::Visible;
        self.visibility = Visibility::Unloaded;
        if was_visible {
            self.bounce(now);
        }
        was_visible
    }

    fn bounce(&self, now: Instant) {
        let time_on_page = now.saturating_duration_since(self.period_start);
        self.publisher.publish(&TrackingEvent::Bounce(BounceEvent {
            chatbot_id: self.chatbot_id.clone(),
            time_on_page_ms: duration_millis(time_on_page),
            interacted_with_chatbot: self.interacted,
            url: self.page.url.clone(),
        }));
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Drive [`SessionTracker::tick`] until `shutdown` flips to true or the page unloads.
pub async fn run_time_on_page(
    tracker: Arc<Mutex<SessionTracker>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(TICK_GRANULARITY);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut tracker = tracker.lock().unwrap_or_else(|e| e.into_inner());
                if tracker.visibility() == Visibility::Unloaded {
                    break;
                }
                tracker.tick(Instant::now());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Time-on-page reporter stopped");
}
