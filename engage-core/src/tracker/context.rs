//! Live visitor context for campaign targeting

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::store::{keys, KeyValueStore};
use crate::types::VisitorContext;

/// The page a tracker is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// Full URL of the page
    pub url: String,
    /// `document.referrer`, empty when the browser reports none
    pub document_referrer: String,
}

impl PageInfo {
    pub fn new(url: impl Into<String>, document_referrer: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            document_referrer: document_referrer.into(),
        }
    }
}

/// Computes [`VisitorContext`] snapshots for one page view.
///
/// A first-time visitor becomes returning once they have stayed on a page
/// for `returning_delay`; the flag is persisted so later page views start
/// out returning.
pub struct VisitorContextTracker {
    store: Arc<dyn KeyValueStore>,
    returning_delay: Duration,
    page: PageInfo,
    page_started: Instant,
    returning: bool,
}

impl VisitorContextTracker {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        returning_delay: Duration,
        page: PageInfo,
        now: Instant,
    ) -> Self {
        let returning = read_returning_flag(store.as_ref());
        Self {
            store,
            returning_delay,
            page,
            page_started: now,
            returning,
        }
    }

    /// Start a new page view
    pub fn navigate(&mut self, page: PageInfo, now: Instant) {
        self.page = page;
        self.page_started = now;
        self.returning = read_returning_flag(self.store.as_ref());
    }

    pub fn page(&self) -> &PageInfo {
        &self.page
    }

    pub fn is_returning(&self) -> bool {
        self.returning
    }

    /// Snapshot at `now`, persisting the returning flag once the dwell delay passed
    pub fn context_at(&mut self, now: Instant) -> VisitorContext {
        let elapsed = now.saturating_duration_since(self.page_started);

        if !self.returning && elapsed >= self.returning_delay {
            match self.store.set(keys::RETURNING_VISITOR, "true") {
                Ok(()) => tracing::debug!("Visitor marked as returning"),
                Err(e) => tracing::warn!(error = %e, "Failed to persist returning flag"),
            }
            self.returning = true;
        }

        VisitorContext {
            is_returning: self.returning,
            time_on_page_secs: elapsed.as_secs_f64(),
            current_url: self.page.url.clone(),
            referrer_url: self.page.document_referrer.clone(),
        }
    }

    /// Snapshot at the current instant
    pub fn context(&mut self) -> VisitorContext {
        self.context_at(Instant::now())
    }
}

fn read_returning_flag(store: &dyn KeyValueStore) -> bool {
    match store.get(keys::RETURNING_VISITOR) {
        Ok(value) => value.as_deref() == Some("true"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read returning flag");
            false
        }
    }
}
