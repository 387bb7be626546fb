//! Dashboard shell state shared between the dispatcher and the UI

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::SeoDomain;
use crate::store::keys;

/// Badge counters shown in the dashboard navigation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCounters {
    pub new_chat_count: u32,
    pub new_ticket_count: u32,
    pub traffic_count: u32,
}

/// Marker for an SEO job that has started but not finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeoProgress {
    pub started_at: Option<Value>,
    pub estimated_time: Option<Value>,
}

/// State owned by the dashboard shell.
#[derive(Debug, Clone, Default)]
pub struct ShellState {
    pub counters: UnreadCounters,
    /// Role segment of dashboard routes, e.g. `admin`
    pub current_role: String,
    seo_progress: HashMap<SeoDomain, SeoProgress>,
}

pub type SharedShellState = Arc<Mutex<ShellState>>;

impl ShellState {
    pub fn new(current_role: impl Into<String>) -> Self {
        Self {
            current_role: current_role.into(),
            ..Self::default()
        }
    }

    /// Wrap for sharing between the dispatcher and readers
    pub fn shared(self) -> SharedShellState {
        Arc::new(Mutex::new(self))
    }

    /// Replace counters and role with the values the server returned at login.
    ///
    /// SEO markers belong to the browser, not the login, and survive.
    pub fn reset_from_login(&mut self, counters: UnreadCounters, current_role: impl Into<String>) {
        self.counters = counters;
        self.current_role = current_role.into();
    }

    pub fn seo_progress(&self, domain: SeoDomain) -> Option<&SeoProgress> {
        self.seo_progress.get(&domain)
    }

    pub fn set_seo_progress(&mut self, domain: SeoDomain, progress: SeoProgress) {
        self.seo_progress.insert(domain, progress);
    }

    pub fn clear_seo_progress(&mut self, domain: SeoDomain) -> Option<SeoProgress> {
        self.seo_progress.remove(&domain)
    }
}

/// Store key of the progress marker for `domain`
pub fn seo_progress_key(domain: SeoDomain) -> &'static str {
    match domain {
        SeoDomain::Performance => keys::SEO_PERFORMANCE,
        SeoDomain::Compliance => keys::SEO_COMPLIANCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reset_from_login_keeps_seo_markers() {
        let mut state = ShellState::new("agent");
        state.counters.traffic_count = 9;
        state.set_seo_progress(
            SeoDomain::Compliance,
            SeoProgress {
                started_at: Some(json!("2026-01-01T00:00:00Z")),
                estimated_time: Some(json!(120)),
            },
        );

        state.reset_from_login(
            UnreadCounters {
                new_chat_count: 2,
                new_ticket_count: 1,
                traffic_count: 0,
            },
            "admin",
        );

        assert_eq!(state.counters.new_chat_count, 2);
        assert_eq!(state.counters.traffic_count, 0);
        assert_eq!(state.current_role, "admin");
        assert!(state.seo_progress(SeoDomain::Compliance).is_some());
    }

    #[test]
    fn test_progress_marker_wire_shape() {
        let progress = SeoProgress {
            started_at: Some(json!(1700000000000u64)),
            estimated_time: None,
        };
        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value, json!({"started_at": 1700000000000u64, "estimated_time": null}));
        assert_eq!(seo_progress_key(SeoDomain::Performance), "seo_progress:performance");
    }
}
